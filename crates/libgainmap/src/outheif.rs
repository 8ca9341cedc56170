#![cfg(feature = "heif")]

use libheif_rs::{
    Channel, ColorPrimaries, ColorProfileNCLX, ColorProfileRaw, ColorProfileType, ColorSpace, CompressionFormat,
    EncoderQuality, HeifContext, HeifError, Image, LibHeif, MatrixCoefficients, RgbChroma, TransferCharacteristics,
};
use log::trace;

use crate::colorspace::ColorSpaceId;
use crate::error::EncodeError;
use crate::makernote;
use crate::request::BitDepth;
use crate::services::EncodeJob;
use crate::writer::{self, Samples};
use crate::xmp;

fn heif_error(e: HeifError) -> EncodeError {
    EncodeError::Heif(e.to_string())
}

fn rgb_image(width: u32, height: u32, depth: BitDepth, job: &EncodeJob) -> Result<Image, EncodeError> {
    let (chroma, bits, bytes_per_pixel) = match depth {
        BitDepth::Eight => (RgbChroma::Rgb, 8, 3),
        _ => (RgbChroma::HdrRgbLe, 10, 6),
    };

    let mut image = Image::new(width, height, ColorSpace::Rgb(chroma)).map_err(heif_error)?;
    image.create_plane(Channel::Interleaved, width, height, bits).map_err(heif_error)?;

    let planes = image.planes_mut();
    let plane = planes.interleaved
        .ok_or(EncodeError::Unsupported("libheif did not allocate an interleaved plane"))?;
    let stride = plane.stride;
    let data = plane.data;
    let row_len = width as usize * bytes_per_pixel;

    match depth {
        BitDepth::Eight => {
            let Samples::Eight(samples) = writer::primary_samples(job) else {
                return Err(EncodeError::Unsupported("expected 8-bit samples"));
            };
            for (y, row) in samples.chunks_exact(row_len).enumerate() {
                data[stride * y..stride * y + row_len].copy_from_slice(row);
            }
        },
        _ => {
            let samples = writer::primary_samples_10bit(job);
            for (y, row) in samples.chunks_exact(width as usize * 3).enumerate() {
                let row_start = stride * y;
                for (i, value) in row.iter().enumerate() {
                    data[row_start + i * 2..row_start + i * 2 + 2].copy_from_slice(&value.to_le_bytes());
                }
            }
        },
    }

    Ok(image)
}

fn gain_map_image(samples: &[u8], channels: usize, width: u32, height: u32) -> Result<Image, EncodeError> {
    let (color_space, channel) = if channels == 1 {
        (ColorSpace::Monochrome, Channel::Y)
    } else {
        (ColorSpace::Rgb(RgbChroma::Rgb), Channel::Interleaved)
    };

    let mut image = Image::new(width, height, color_space).map_err(heif_error)?;
    image.create_plane(channel, width, height, 8).map_err(heif_error)?;

    let planes = image.planes_mut();
    let plane = match channels {
        1 => planes.y,
        _ => planes.interleaved,
    };
    let plane = plane.ok_or(EncodeError::Unsupported("libheif did not allocate a gain map plane"))?;
    let stride = plane.stride;
    let data = plane.data;
    let row_len = width as usize * channels;
    for (y, row) in samples.chunks_exact(row_len).enumerate() {
        data[stride * y..stride * y + row_len].copy_from_slice(row);
    }

    Ok(image)
}

/// The nclx box for an HDR primary, mirroring the cICP codes written to PNG.
fn nclx_profile(color_space: ColorSpaceId) -> Option<ColorProfileNCLX> {
    let [primaries, transfer, matrix, full_range] = writer::cicp_for(color_space)?;
    let primaries = match primaries {
        9 => ColorPrimaries::ITU_R_BT_2020_2_and_2100_0,
        _ => return None,
    };
    let transfer = match transfer {
        16 => TransferCharacteristics::ITU_R_BT_2100_0_PQ,
        18 => TransferCharacteristics::ITU_R_BT_2100_0_HLG,
        _ => return None,
    };
    let matrix = match matrix {
        0 => MatrixCoefficients::RGB_GBR,
        _ => return None,
    };
    let mut profile = ColorProfileNCLX::new(primaries, transfer, matrix)?;
    profile.set_full_range_flag(full_range);
    Some(profile)
}

pub fn encode(job: &EncodeJob) -> Result<Vec<u8>, EncodeError> {
    let width = job.primary.width() as u32;
    let height = job.primary.height() as u32;

    let mut image = rgb_image(width, height, job.depth, job)?;
    let icc_profile = job.color_space.icc_profile_bytes()?;
    image.set_color_profile_raw(&ColorProfileRaw::new(ColorProfileType::Prof, icc_profile))
        .map_err(heif_error)?;
    if let Some(nclx) = nclx_profile(job.color_space) {
        image.set_color_profile_nclx(&nclx).map_err(heif_error)?;
    }

    let lib_heif = LibHeif::new();
    let mut context = HeifContext::new().map_err(heif_error)?;
    let mut encoder = lib_heif.encoder_for_format(CompressionFormat::Hevc).map_err(heif_error)?;
    let quality = (job.quality * 100.0).round().clamp(1.0, 100.0) as u8;
    encoder.set_quality(EncoderQuality::Lossy(quality)).map_err(heif_error)?;

    let mut primary = context.encode_image(&image, &mut encoder, None).map_err(heif_error)?;

    if let Some(gain_map) = &job.gain_map {
        context.add_exif_metadata(&primary, &makernote::exif_block(&gain_map.headroom)).map_err(heif_error)?;
        context.add_xmp_metadata(&primary, xmp::primary_xmp(None).as_bytes()).map_err(heif_error)?;

        let (samples, channels) = writer::gain_map_samples(gain_map);
        let gain_map_image = gain_map_image(
            &samples,
            channels,
            gain_map.rendition.width() as u32,
            gain_map.rendition.height() as u32,
        )?;
        let gain_map_handle = context.encode_image(&gain_map_image, &mut encoder, None).map_err(heif_error)?;
        context.add_xmp_metadata(&gain_map_handle, xmp::gain_map_xmp(&gain_map.metadata).as_bytes())
            .map_err(heif_error)?;
        trace!("HEIF: gain map item {}x{}", gain_map.rendition.width(), gain_map.rendition.height());
    }

    context.set_primary_image(&mut primary).map_err(heif_error)?;
    context.write_to_bytes().map_err(heif_error)
}
