//! The default [`ImageServices`]: PNG sources, an in-memory PNG proxy round trip and the crate's own writers.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use log::{debug, trace};

use crate::colorspace::{ColorGamut, ColorSpaceId, IccColorSpace};
use crate::error::{ConvertError, DecodeError, EncodeError};
use crate::outpng;
use crate::pixel::{FloatImageContent, FloatPixel};
use crate::rendition::{HdrTransfer, Rendition};
use crate::services::{DecodedImage, EncodeJob, ImageServices};
use crate::transfer;
use crate::writer;

const CICP_TRANSFER_PQ: u8 = 16;
const CICP_TRANSFER_HLG: u8 = 18;

/// Stateless, so one instance can serve any number of concurrent conversions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeServices;

impl NativeServices {
    pub fn new() -> Self {
        Self
    }
}

/// Samples of a decoded PNG, normalized to `[0, 1]`, interleaved with `channels` per pixel.
struct RawPng {
    width: usize,
    height: usize,
    channels: usize,
    samples: Vec<f32>,
}

impl RawPng {
    fn pixel(&self, index: usize) -> [f32; 3] {
        let s = &self.samples[index * self.channels..];
        match self.channels {
            // Gray and gray + alpha.
            1 | 2 => [s[0]; 3],
            _ => [s[0], s[1], s[2]],
        }
    }

    fn to_content<F: Fn([f32; 3]) -> [f32; 3]>(&self, f: F) -> Result<FloatImageContent, DecodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(DecodeError::EmptyImage);
        }

        let pixels = (0..self.width * self.height)
            .map(|i| FloatPixel::from(f(self.pixel(i))).with_alpha(1.0))
            .collect();
        FloatImageContent::from_pixels(self.width, self.height, pixels)
            .ok_or_else(|| DecodeError::UnsupportedLayout("sample count does not match the image size".to_owned()))
    }
}

fn read_png(bytes: &[u8]) -> Result<RawPng, DecodeError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info()?;

    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer)?;
    buffer.truncate(info.buffer_size());

    let channels = match info.color_type {
        png::ColorType::Grayscale => 1,
        png::ColorType::GrayscaleAlpha => 2,
        png::ColorType::Rgb => 3,
        png::ColorType::Rgba => 4,
        other => return Err(DecodeError::UnsupportedLayout(format!("{:?} pixels", other))),
    };

    let samples = match info.bit_depth {
        png::BitDepth::Eight => buffer.iter().map(|&v| v as f32 / 255.0).collect(),
        png::BitDepth::Sixteen => buffer.chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]) as f32 / 65535.0)
            .collect(),
        other => return Err(DecodeError::UnsupportedLayout(format!("{:?}-bit samples", other))),
    };

    Ok(RawPng {
        width: info.width as usize,
        height: info.height as usize,
        channels,
        samples,
    })
}

/// Which HDR transfer a PNG is encoded with: `cICP` first, then the ICC description.
fn detect_transfer(cicp: Option<&[u8]>, icc: Option<&IccColorSpace>) -> Result<HdrTransfer, DecodeError> {
    if let Some(&[_, code, ..]) = cicp {
        return match code {
            CICP_TRANSFER_PQ => Ok(HdrTransfer::Pq),
            CICP_TRANSFER_HLG => Ok(HdrTransfer::Hlg),
            _ => Err(DecodeError::NotHdr),
        };
    }

    let description = icc.and_then(|icc| icc.description.as_deref()).unwrap_or_default();
    if description.contains("PQ") {
        Ok(HdrTransfer::Pq)
    } else if description.contains("HLG") {
        Ok(HdrTransfer::Hlg)
    } else {
        Err(DecodeError::NotHdr)
    }
}

/// Decodes a PQ or HLG PNG into linear light relative to SDR white.
pub fn decode_png_source(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let cicp = outpng::find_chunk(bytes, outpng::CHUNK_CICP).filter(|data| data.len() == 4);
    let icc = outpng::find_chunk(bytes, outpng::CHUNK_ICCP)
        .and_then(outpng::icc_profile_from_iccp)
        .and_then(|profile| IccColorSpace::from_icc_profile_bytes(&profile));
    trace!("Source cICP: {:?}, ICC: {:?}", cicp, icc);

    let source_transfer = detect_transfer(cicp, icc.as_ref())?;

    let gamut = cicp
        .and_then(|cicp| ColorGamut::from_cicp_primaries(cicp[0]))
        .or_else(|| icc.as_ref().and_then(|icc| icc.color_gamut))
        .unwrap_or_else(|| {
            debug!("Source carries no usable primaries, assuming Display P3");
            ColorGamut::display_p3()
        });

    let color_space_name = icc
        .as_ref()
        .and_then(|icc| icc.description.clone())
        .or_else(|| {
            let cicp = cicp?;
            ColorSpaceId::from_cicp(cicp[0], cicp[1]).map(|id| id.to_string())
        });

    let raw = read_png(bytes)?;
    let content = match source_transfer {
        HdrTransfer::Pq => raw.to_content(|rgb| rgb.map(transfer::pq_signal_to_relative))?,
        HdrTransfer::Hlg => raw.to_content(transfer::hlg_signal_to_relative)?,
    };
    debug!("Decoded {}x{} {} source, color space {:?}", raw.width, raw.height, source_transfer, color_space_name);

    Ok(DecodedImage {
        rendition: Rendition::hdr(content, gamut, source_transfer),
        color_space_name,
    })
}

impl ImageServices for NativeServices {
    fn decode_hdr(&self, path: &Path) -> Result<DecodedImage, ConvertError> {
        let bytes = fs::read(path).map_err(|e| ConvertError::decode(path, e))?;
        decode_png_source(&bytes).map_err(|e| ConvertError::decode(path, e))
    }

    fn round_trip_sdr8(&self, rendition: &Rendition) -> Result<Rendition, EncodeError> {
        let samples: Vec<u8> = rendition.content.pixels()
            .iter()
            .flat_map(|p| p.rgb())
            .map(|v| (transfer::srgb_oetf(v.clamp(0.0, 1.0)) * 255.0).round() as u8)
            .collect();
        let png = outpng::encode_rgb8(&samples, rendition.width(), rendition.height())?;

        let raw = read_png(&png).map_err(std::io::Error::other)?;
        let content = raw.to_content(|rgb| rgb.map(transfer::srgb_eotf)).map_err(std::io::Error::other)?;
        Ok(Rendition::sdr(content, rendition.gamut))
    }

    fn encode(&self, job: &EncodeJob, destination: &Path) -> Result<(), ConvertError> {
        let bytes = writer::encode_to_bytes(job).map_err(|e| ConvertError::encode(destination, e))?;

        if let Err(e) = fs::write(destination, &bytes) {
            // Whatever made it to disk is not a valid file.
            let _ = fs::remove_file(destination);
            return Err(ConvertError::encode(destination, e));
        }
        debug!("Wrote {} bytes to {}", bytes.len(), destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_16bit(width: u32, height: u32, cicp: Option<[u8; 4]>, value: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, width, height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Sixteen);
            let mut writer = encoder.write_header().unwrap();
            if let Some(cicp) = cicp {
                writer.write_chunk(png::chunk::ChunkType(*b"cICP"), &cicp).unwrap();
            }
            let data: Vec<u8> = std::iter::repeat(value.to_be_bytes())
                .take((width * height * 3) as usize)
                .flatten()
                .collect();
            writer.write_image_data(&data).unwrap();
            writer.finish().unwrap();
        }
        bytes
    }

    #[test]
    fn pq_source_with_cicp() {
        // PQ signal of 203 nits, i.e. SDR white.
        let signal = transfer::relative_to_pq_signal(1.0);
        let png = png_16bit(4, 2, Some([9, 16, 0, 1]), (signal * 65535.0).round() as u16);

        let decoded = decode_png_source(&png).unwrap();
        assert_eq!(decoded.rendition.hdr_transfer(), Some(HdrTransfer::Pq));
        assert_eq!(decoded.color_space_name.as_deref(), Some("ITU-R BT.2100 PQ"));
        assert!(decoded.rendition.gamut.approx_eq(&ColorGamut::bt2020()));
        assert_eq!(decoded.rendition.width(), 4);

        let p = decoded.rendition.content.get_at(3, 1);
        assert!((p.r() - 1.0).abs() < 1e-2, "{:?}", p);
    }

    #[test]
    fn hlg_transfer_from_cicp() {
        let png = png_16bit(1, 1, Some([12, 18, 0, 1]), 40000);
        let decoded = decode_png_source(&png).unwrap();
        assert_eq!(decoded.rendition.hdr_transfer(), Some(HdrTransfer::Hlg));
        assert_eq!(decoded.color_space_name.as_deref(), Some("Display P3 HLG"));
    }

    #[test]
    fn sdr_sources_are_rejected() {
        let png = png_16bit(1, 1, Some([1, 13, 0, 1]), 100);
        assert!(matches!(decode_png_source(&png), Err(DecodeError::NotHdr)));

        let untagged = png_16bit(1, 1, None, 100);
        assert!(matches!(decode_png_source(&untagged), Err(DecodeError::NotHdr)));
    }

    #[test]
    fn round_trip_quantizes_to_8_bits() {
        let content = FloatImageContent::from_fn(3, 1, |x, _| FloatPixel::splat(x as f32 * 0.3));
        let rendition = Rendition::sdr(content, ColorGamut::srgb());
        let proxy = NativeServices.round_trip_sdr8(&rendition).unwrap();

        for x in 0..3 {
            let original = rendition.content.get_at(x, 0).r();
            let quantized = proxy.content.get_at(x, 0).r();
            assert!((original - quantized).abs() < 0.01, "{} vs {}", original, quantized);
        }
    }
}
