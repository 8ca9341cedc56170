//! Baseline JPEG output. The Default mode appends the gain map as a second JPEG indexed by MPF.

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use log::trace;

use crate::error::EncodeError;
use crate::makernote;
use crate::mpf::MpfInfo;
use crate::services::EncodeJob;
use crate::writer::{self, Samples};
use crate::xmp::{self, ContainerDirectory};

const MARKER_SOI: [u8; 2] = [0xFF, 0xD8];
const MARKER_APP1: u8 = 0xE1;
const MARKER_APP2: u8 = 0xE2;

const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";
const XMP_IDENTIFIER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_IDENTIFIER: &[u8] = b"ICC_PROFILE\0";

/// Largest payload a segment length field can describe.
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;
/// Identifier, sequence number and chunk count precede each ICC chunk.
const MAX_ICC_CHUNK: usize = MAX_SEGMENT_PAYLOAD - ICC_IDENTIFIER.len() - 2;

const MIME: &str = "image/jpeg";

fn segment(marker: u8, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(EncodeError::Unsupported("metadata does not fit in a JPEG segment"));
    }
    let length = (payload.len() + 2) as u16;

    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend_from_slice(&[0xFF, marker]);
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

fn identified_segment(marker: u8, identifier: &[u8], data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::with_capacity(identifier.len() + data.len());
    payload.extend_from_slice(identifier);
    payload.extend_from_slice(data);
    segment(marker, &payload)
}

fn icc_segments(icc_profile: &[u8]) -> Result<Vec<Vec<u8>>, EncodeError> {
    let chunks: Vec<&[u8]> = icc_profile.chunks(MAX_ICC_CHUNK).collect();
    let count = u8::try_from(chunks.len())
        .map_err(|_| EncodeError::Icc("ICC profile too large for JPEG".to_owned()))?;

    chunks.iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut data = vec![i as u8 + 1, count];
            data.extend_from_slice(chunk);
            identified_segment(MARKER_APP2, ICC_IDENTIFIER, &data)
        })
        .collect()
}

/// Position right after SOI and any APP0/APP1 segments the encoder wrote itself.
fn insert_position(jpeg: &[u8]) -> Result<usize, EncodeError> {
    if !jpeg.starts_with(&MARKER_SOI) {
        return Err(EncodeError::Unsupported("encoder did not produce a JPEG stream"));
    }

    let mut position = 2;
    while position + 4 <= jpeg.len() && jpeg[position] == 0xFF && (0xE0..=0xE1).contains(&jpeg[position + 1]) {
        let length = u16::from_be_bytes([jpeg[position + 2], jpeg[position + 3]]) as usize;
        position += 2 + length;
    }
    Ok(position.min(jpeg.len()))
}

fn splice(jpeg: &[u8], segments: &[Vec<u8>]) -> Result<Vec<u8>, EncodeError> {
    let position = insert_position(jpeg)?;
    let inserted: usize = segments.iter().map(Vec::len).sum();

    let mut bytes = Vec::with_capacity(jpeg.len() + inserted);
    bytes.extend_from_slice(&jpeg[..position]);
    for segment in segments {
        bytes.extend_from_slice(segment);
    }
    bytes.extend_from_slice(&jpeg[position..]);
    Ok(bytes)
}

fn compress(samples: &[u8], width: usize, height: usize, color_type: ExtendedColorType, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode(samples, width as u32, height as u32, color_type)?;
    Ok(bytes)
}

/// Normalized quality as the 1..=100 scale of the encoder.
fn encoder_quality(quality: f64) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

pub fn encode(job: &EncodeJob) -> Result<Vec<u8>, EncodeError> {
    let Samples::Eight(samples) = writer::primary_samples(job) else {
        return Err(EncodeError::Unsupported("JPEG only stores 8-bit samples"));
    };
    let quality = encoder_quality(job.quality);
    let (width, height) = (job.primary.width(), job.primary.height());

    let primary = compress(&samples, width, height, ExtendedColorType::Rgb8, quality)?;
    let icc_segments = icc_segments(&job.color_space.icc_profile_bytes()?)?;

    let Some(gain_map) = &job.gain_map else {
        return splice(&primary, &icc_segments);
    };

    let (gain_map_samples, channels) = writer::gain_map_samples(gain_map);
    let gain_map_color_type = if channels == 1 { ExtendedColorType::L8 } else { ExtendedColorType::Rgb8 };
    let gain_map_jpeg = compress(
        &gain_map_samples,
        gain_map.rendition.width(),
        gain_map.rendition.height(),
        gain_map_color_type,
        quality,
    )?;
    let gain_map_xmp = xmp::gain_map_xmp(&gain_map.metadata);
    let gain_map_jpeg = splice(&gain_map_jpeg, &[identified_segment(MARKER_APP1, XMP_IDENTIFIER, gain_map_xmp.as_bytes())?])?;

    let primary_xmp = xmp::primary_xmp(Some(ContainerDirectory {
        mime: MIME,
        gain_map_length: gain_map_jpeg.len(),
    }));

    let mut segments = vec![
        identified_segment(MARKER_APP1, EXIF_IDENTIFIER, &makernote::exif_block(&gain_map.headroom))?,
        identified_segment(MARKER_APP1, XMP_IDENTIFIER, primary_xmp.as_bytes())?,
    ];
    segments.extend(icc_segments);

    // The MPF segment has the same length whatever it indexes, so its position and the final
    // primary length are known before its content is.
    let leading_len: usize = segments.iter().map(Vec::len).sum();
    let mpf_position = insert_position(&primary)? + leading_len;
    let mpf_len = segment(MARKER_APP2, &MpfInfo::primary_with_secondary(0, 0, 0).to_app2_payload())?.len();
    let primary_len = primary.len() + leading_len + mpf_len;
    // Marker, length and identifier precede the MPF TIFF header.
    let tiff_header_position = mpf_position + 8;

    let mpf = MpfInfo::primary_with_secondary(primary_len as u32, gain_map_jpeg.len() as u32, tiff_header_position as u32);
    segments.push(segment(MARKER_APP2, &mpf.to_app2_payload())?);

    let mut bytes = splice(&primary, &segments)?;
    debug_assert_eq!(bytes.len(), primary_len);
    trace!("JPEG: primary {} bytes, gain map {} bytes", bytes.len(), gain_map_jpeg.len());

    bytes.extend_from_slice(&gain_map_jpeg);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_jpeg() -> Vec<u8> {
        compress(&[128; 4 * 4 * 3], 4, 4, ExtendedColorType::Rgb8, 90).unwrap()
    }

    #[test]
    fn segments_are_inserted_after_app0() {
        let jpeg = tiny_jpeg();
        let position = insert_position(&jpeg).unwrap();
        assert!(position >= 2);

        let marker = identified_segment(MARKER_APP1, XMP_IDENTIFIER, b"<x/>").unwrap();
        let spliced = splice(&jpeg, &[marker.clone()]).unwrap();
        assert_eq!(spliced.len(), jpeg.len() + marker.len());
        assert_eq!(&spliced[position..position + marker.len()], marker.as_slice());
        assert!(spliced.starts_with(&MARKER_SOI));
    }

    #[test]
    fn large_icc_profiles_are_chunked() {
        let profile = vec![7u8; MAX_ICC_CHUNK + 10];
        let segments = icc_segments(&profile).unwrap();
        assert_eq!(segments.len(), 2);
        // Marker (2) + length (2) + identifier, then sequence number and count.
        let header = 4 + ICC_IDENTIFIER.len();
        assert_eq!(&segments[0][header..header + 2], &[1, 2]);
        assert_eq!(&segments[1][header..header + 2], &[2, 2]);
    }

    #[test]
    fn quality_scale() {
        assert_eq!(encoder_quality(0.85), 85);
        assert_eq!(encoder_quality(1.0), 100);
        assert_eq!(encoder_quality(0.001), 1);
    }

    #[test]
    fn oversized_segment_is_rejected() {
        assert!(segment(MARKER_APP1, &vec![0; MAX_SEGMENT_PAYLOAD + 1]).is_err());
    }
}
