//! What gets written for a request, decided before any pixel work, and the shared sample packing.

use log::debug;

use crate::colorspace::{ColorSpaceId, GamutConversion, ResolvedColorSpaces, Transfer};
use crate::error::{EncodeError, ValidationError};
use crate::gainmap::GainMap;
use crate::pixel::FloatImageContent;
use crate::request::{BitDepth, ConversionRequest, ExportMode, OutputFormat};
use crate::services::EncodeJob;

/// How a format treats the requested bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepthRule {
    Forced(BitDepth),
    AtMost(BitDepth),
    Requested,
    /// Requested, but 8 bits cannot carry the transfer.
    AtLeastTen,
    Rejected,
}

/// `(format, HDR export, rule)`. Every (format, mode) pair maps to exactly one row.
const DEPTH_RULES: [(OutputFormat, bool, DepthRule); 8] = [
    (OutputFormat::Jpeg, false, DepthRule::Forced(BitDepth::Eight)),
    (OutputFormat::Jpeg, true, DepthRule::Rejected),
    (OutputFormat::Heif, false, DepthRule::AtMost(BitDepth::Ten)),
    (OutputFormat::Heif, true, DepthRule::Forced(BitDepth::Ten)),
    (OutputFormat::Png, false, DepthRule::Requested),
    (OutputFormat::Png, true, DepthRule::AtLeastTen),
    (OutputFormat::Tiff, false, DepthRule::Requested),
    (OutputFormat::Tiff, true, DepthRule::AtLeastTen),
];

/// The validated output plan of one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodePlan {
    pub format: OutputFormat,
    pub mode: ExportMode,
    pub depth: BitDepth,
    pub quality: f64,
}

impl EncodePlan {
    pub fn new(request: &ConversionRequest) -> Result<Self, ValidationError> {
        let format = request.output_format();
        let mode = request.export_mode();
        let requested = request.bit_depth();

        let rule = DEPTH_RULES
            .iter()
            .find(|(f, hdr, _)| *f == format && *hdr == mode.is_hdr())
            .map(|(_, _, rule)| *rule)
            .unwrap_or(DepthRule::Rejected);

        let incompatible = ValidationError::IncompatibleBitDepth { format, mode, requested: requested.bits() };
        let depth = match rule {
            DepthRule::Forced(depth) => depth,
            DepthRule::AtMost(limit) => if requested.bits() > limit.bits() { limit } else { requested },
            DepthRule::Requested => requested,
            DepthRule::AtLeastTen if requested == BitDepth::Eight => return Err(incompatible),
            DepthRule::AtLeastTen => requested,
            DepthRule::Rejected => return Err(incompatible),
        };

        if depth != requested {
            debug!("{} output: using {} bits instead of the requested {}", format, depth, requested);
        }

        Ok(Self {
            format,
            mode,
            depth,
            quality: request.quality().get(),
        })
    }

    pub fn carries_gain_map(&self) -> bool {
        self.mode == ExportMode::Default
    }

    /// Color space the primary image is tagged with.
    pub fn primary_color_space(&self, resolved: &ResolvedColorSpaces) -> ColorSpaceId {
        match self.mode {
            ExportMode::Default | ExportMode::SdrOnly => resolved.sdr,
            ExportMode::PqOnly => resolved.hdr_pq,
            ExportMode::HlgOnly => resolved.hdr_hlg,
        }
    }
}

/// Interleaved RGB samples ready for a container.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Eight(Vec<u8>),
    /// Full 16-bit range. Ten-bit content is scaled up so that readers ignoring `sBIT` still see the right values.
    Sixteen(Vec<u16>),
}

fn encode_rgb(content: &FloatImageContent, color_space: ColorSpaceId, job_gamut: Option<GamutConversion>) -> Vec<[f32; 3]> {
    let transfer = color_space.transfer();
    content.pixels()
        .iter()
        .map(|p| {
            let rgb = match &job_gamut {
                Some(conversion) => conversion.apply(p.rgb()),
                None => p.rgb(),
            };
            transfer.encode(rgb)
        })
        .collect()
}

fn quantize(v: f32, max: f32) -> f32 {
    let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    (v * max).round()
}

/// Transfer-encodes and quantizes the primary image of `job`.
pub fn primary_samples(job: &EncodeJob) -> Samples {
    let conversion = if job.primary.gamut.approx_eq(&job.color_space.gamut()) {
        None
    } else {
        GamutConversion::new(&job.primary.gamut, &job.color_space.gamut())
    };
    let encoded = encode_rgb(&job.primary.content, job.color_space, conversion);

    match job.depth {
        BitDepth::Eight => Samples::Eight(encoded.iter().flatten().map(|&v| quantize(v, 255.0) as u8).collect()),
        BitDepth::Ten => Samples::Sixteen(
            encoded.iter()
                .flatten()
                .map(|&v| {
                    let v10 = quantize(v, 1023.0) as u16;
                    (v10 << 6) | (v10 >> 4)
                })
                .collect(),
        ),
        BitDepth::Sixteen => Samples::Sixteen(encoded.iter().flatten().map(|&v| quantize(v, 65535.0) as u16).collect()),
    }
}

/// Ten-bit samples as HEIF stores them, in `[0, 1023]`.
pub fn primary_samples_10bit(job: &EncodeJob) -> Vec<u16> {
    match primary_samples(&EncodeJob { depth: BitDepth::Ten, ..job.clone() }) {
        Samples::Sixteen(samples) => samples.into_iter().map(|v| v >> 6).collect(),
        Samples::Eight(samples) => samples.into_iter().map(|v| (v as u16) << 2).collect(),
    }
}

/// 8-bit gain-map samples: one channel for mono maps, three for RGB maps.
pub fn gain_map_samples(gain_map: &GainMap) -> (Vec<u8>, usize) {
    let encoded = gain_map.encoded();
    if gain_map.is_single_channel() {
        let samples = encoded.pixels().iter().map(|p| quantize(p.r(), 255.0) as u8).collect();
        (samples, 1)
    } else {
        let samples = encoded.pixels().iter().flat_map(|p| p.rgb()).map(|v| quantize(v, 255.0) as u8).collect();
        (samples, 3)
    }
}

/// Serializes `job` into the bytes of one file.
pub fn encode_to_bytes(job: &EncodeJob) -> Result<Vec<u8>, EncodeError> {
    match job.format {
        OutputFormat::Jpeg => crate::outjpeg::encode(job),
        OutputFormat::Png => crate::outpng::encode(job),
        OutputFormat::Tiff => crate::outtiff::encode(job),
        #[cfg(feature = "heif")]
        OutputFormat::Heif => crate::outheif::encode(job),
        #[cfg(not(feature = "heif"))]
        OutputFormat::Heif => Err(EncodeError::Unsupported("HEIF output requires the `heif` feature")),
    }
}

/// Extra chunk of information the HDR export modes carry alongside the ICC profile.
pub fn cicp_for(color_space: ColorSpaceId) -> Option<[u8; 4]> {
    match color_space.transfer() {
        Transfer::Pq | Transfer::Hlg => color_space.cicp(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(format: OutputFormat, bits: u32, sdr: bool, pq: bool, hlg: bool) -> Result<EncodePlan, ValidationError> {
        let request = ConversionRequest::builder("a.png", "out")
            .output_format(format)
            .bit_depth(bits)
            .sdr(sdr)
            .pq(pq)
            .hlg(hlg)
            .build()
            .unwrap();
        EncodePlan::new(&request)
    }

    #[test]
    fn only_hdr_transfers_are_tagged_with_cicp() {
        assert_eq!(cicp_for(ColorSpaceId::Bt2100Pq), Some([9, 16, 0, 1]));
        assert_eq!(cicp_for(ColorSpaceId::Bt2100Hlg), Some([9, 18, 0, 1]));
        assert_eq!(cicp_for(ColorSpaceId::Bt2020Srgb), None);
    }

    #[test]
    fn jpeg_forces_eight_bits() {
        assert_eq!(plan(OutputFormat::Jpeg, 16, false, false, false).unwrap().depth, BitDepth::Eight);
        assert_eq!(plan(OutputFormat::Jpeg, 10, true, false, false).unwrap().depth, BitDepth::Eight);
    }

    #[test]
    fn jpeg_rejects_hdr_modes() {
        assert!(matches!(
            plan(OutputFormat::Jpeg, 8, false, true, false),
            Err(ValidationError::IncompatibleBitDepth { format: OutputFormat::Jpeg, mode: ExportMode::PqOnly, requested: 8 }),
        ));
    }

    #[test]
    fn heif_caps_at_ten_bits() {
        assert_eq!(plan(OutputFormat::Heif, 16, false, false, false).unwrap().depth, BitDepth::Ten);
        assert_eq!(plan(OutputFormat::Heif, 8, false, false, false).unwrap().depth, BitDepth::Eight);
        assert_eq!(plan(OutputFormat::Heif, 8, false, false, true).unwrap().depth, BitDepth::Ten);
    }

    #[test]
    fn png_and_tiff_need_ten_bits_for_hdr() {
        assert!(plan(OutputFormat::Png, 8, false, true, false).is_err());
        assert!(plan(OutputFormat::Tiff, 8, false, false, true).is_err());
        assert_eq!(plan(OutputFormat::Png, 10, false, true, false).unwrap().depth, BitDepth::Ten);
        assert_eq!(plan(OutputFormat::Tiff, 16, false, false, false).unwrap().depth, BitDepth::Sixteen);
        assert_eq!(plan(OutputFormat::Png, 8, true, false, false).unwrap().depth, BitDepth::Eight);
    }

    fn pq_job(depth: BitDepth, values: &[f32]) -> EncodeJob {
        use crate::colorspace::ColorGamut;
        use crate::pixel::FloatPixel;
        use crate::rendition::{HdrTransfer, Rendition};

        let content = FloatImageContent::from_fn(values.len(), 1, |x, _| FloatPixel::splat(values[x]));
        EncodeJob {
            format: OutputFormat::Png,
            primary: Rendition::hdr(content, ColorGamut::bt2020(), HdrTransfer::Pq),
            color_space: ColorSpaceId::Bt2100Pq,
            resolved: ResolvedColorSpaces {
                sdr: ColorSpaceId::Bt2020Srgb,
                hdr_pq: ColorSpaceId::Bt2100Pq,
                hdr_hlg: ColorSpaceId::Bt2100Hlg,
            },
            depth,
            quality: 0.85,
            gain_map: None,
        }
    }

    #[test]
    fn ten_bit_samples_fill_sixteen_bit_range() {
        // Black, SDR white and the PQ peak.
        let job = pq_job(BitDepth::Ten, &[0.0, 1.0, 10000.0 / 203.0]);
        let Samples::Sixteen(samples) = primary_samples(&job) else {
            panic!("ten-bit output must be stored in sixteen-bit samples");
        };
        assert_eq!(samples.len(), 9);
        assert_eq!(&samples[..3], &[0; 3]);
        assert_eq!(&samples[6..], &[65535; 3]);

        let v10 = (crate::transfer::relative_to_pq_signal(1.0) * 1023.0).round() as u16;
        assert_eq!(&samples[3..6], &[(v10 << 6) | (v10 >> 4); 3]);
        // The low bits repeat the high bits, so every stored value is a valid 10-bit code.
        for &v in &samples {
            assert_eq!(v & 0x3F, (v >> 10) & 0x3F);
        }

        let heif = primary_samples_10bit(&job);
        assert_eq!(heif, vec![0, 0, 0, v10, v10, v10, 1023, 1023, 1023]);
    }

    #[test]
    fn eight_and_sixteen_bit_samples() {
        let job = pq_job(BitDepth::Eight, &[0.0, 10000.0 / 203.0]);
        assert!(matches!(primary_samples(&job), Samples::Eight(samples) if samples == vec![0, 0, 0, 255, 255, 255]));

        let job = pq_job(BitDepth::Sixteen, &[0.0, 10000.0 / 203.0]);
        assert!(matches!(primary_samples(&job), Samples::Sixteen(samples) if samples == vec![0, 0, 0, 65535, 65535, 65535]));
    }
}
