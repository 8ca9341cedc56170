//! PNG output, and the chunk-level helpers shared with the PNG source decoder.

use log::trace;
use png::chunk::ChunkType;

use crate::error::EncodeError;
use crate::makernote;
use crate::services::EncodeJob;
use crate::writer::{self, Samples};
use crate::xmp;

pub const CHUNK_ICCP: [u8; 4] = *b"iCCP";
pub const CHUNK_CICP: [u8; 4] = *b"cICP";
pub const CHUNK_SBIT: [u8; 4] = *b"sBIT";
pub const CHUNK_EXIF: [u8; 4] = *b"eXIf";
pub const CHUNK_ITXT: [u8; 4] = *b"iTXt";
/// Private, ancillary, safe-to-copy chunk holding the gain map as a complete PNG stream.
pub const CHUNK_GAIN_MAP: [u8; 4] = *b"hgMp";

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
const ICC_PROFILE_NAME: &[u8] = b"ICC Profile";
pub const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

/// Compression level of the zlib stream in `iCCP`.
const ICC_COMPRESSION_LEVEL: u8 = 7;

struct Chunk {
    kind: [u8; 4],
    data: Vec<u8>,
}

fn iccp_chunk(icc_profile: &[u8]) -> Chunk {
    let mut data = ICC_PROFILE_NAME.to_vec();
    // Name terminator, then compression method 0 (zlib).
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(&miniz_oxide::deflate::compress_to_vec_zlib(icc_profile, ICC_COMPRESSION_LEVEL));
    Chunk { kind: CHUNK_ICCP, data }
}

fn xmp_chunk(xmp: &str) -> Chunk {
    let mut data = XMP_KEYWORD.to_vec();
    // Keyword terminator, uncompressed, no language tag, no translated keyword.
    data.extend_from_slice(&[0, 0, 0, 0, 0]);
    data.extend_from_slice(xmp.as_bytes());
    Chunk { kind: CHUNK_ITXT, data }
}

fn write_png(
    width: usize,
    height: usize,
    color_type: png::ColorType,
    bit_depth: png::BitDepth,
    data: &[u8],
    leading: &[Chunk],
    trailing: &[Chunk],
) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width as u32, height as u32);
        encoder.set_color(color_type);
        encoder.set_depth(bit_depth);
        encoder.set_compression(png::Compression::Default);

        let mut writer = encoder.write_header()?;
        for chunk in leading {
            writer.write_chunk(ChunkType(chunk.kind), &chunk.data)?;
        }
        writer.write_image_data(data)?;
        for chunk in trailing {
            writer.write_chunk(ChunkType(chunk.kind), &chunk.data)?;
        }
        writer.finish()?;
    }
    Ok(bytes)
}

/// Plain 8-bit RGB PNG, used as the standard-range proxy container.
pub fn encode_rgb8(samples: &[u8], width: usize, height: usize) -> Result<Vec<u8>, EncodeError> {
    write_png(width, height, png::ColorType::Rgb, png::BitDepth::Eight, samples, &[], &[])
}

pub fn encode(job: &EncodeJob) -> Result<Vec<u8>, EncodeError> {
    let mut leading = Vec::new();
    if let Some(cicp) = writer::cicp_for(job.color_space) {
        leading.push(Chunk { kind: CHUNK_CICP, data: cicp.to_vec() });
    }
    leading.push(iccp_chunk(&job.color_space.icc_profile_bytes()?));

    let (bit_depth, data) = match writer::primary_samples(job) {
        Samples::Eight(samples) => (png::BitDepth::Eight, samples),
        Samples::Sixteen(samples) => (png::BitDepth::Sixteen, samples.iter().flat_map(|v| v.to_be_bytes()).collect()),
    };
    if job.depth.bits() == 10 {
        leading.push(Chunk { kind: CHUNK_SBIT, data: vec![10; 3] });
    }

    let mut trailing = Vec::new();
    if let Some(gain_map) = &job.gain_map {
        leading.push(Chunk { kind: CHUNK_EXIF, data: makernote::exif_block(&gain_map.headroom) });
        leading.push(xmp_chunk(&xmp::primary_xmp(None)));

        let (samples, channels) = writer::gain_map_samples(gain_map);
        let color_type = if channels == 1 { png::ColorType::Grayscale } else { png::ColorType::Rgb };
        let gain_map_png = write_png(
            gain_map.rendition.width(),
            gain_map.rendition.height(),
            color_type,
            png::BitDepth::Eight,
            &samples,
            &[xmp_chunk(&xmp::gain_map_xmp(&gain_map.metadata))],
            &[],
        )?;
        trace!("PNG: gain map stream of {} bytes", gain_map_png.len());
        trailing.push(Chunk { kind: CHUNK_GAIN_MAP, data: gain_map_png });
    }

    write_png(job.primary.width(), job.primary.height(), png::ColorType::Rgb, bit_depth, &data, &leading, &trailing)
}

/// All chunks of a PNG stream as `(type, data)`, in file order. Stops at the first malformed chunk.
pub fn read_chunks(png: &[u8]) -> Vec<([u8; 4], &[u8])> {
    let mut chunks = Vec::new();
    if !png.starts_with(&SIGNATURE) {
        return chunks;
    }

    let mut position = SIGNATURE.len();
    while position + 8 <= png.len() {
        let length = u32::from_be_bytes([png[position], png[position + 1], png[position + 2], png[position + 3]]) as usize;
        let kind = [png[position + 4], png[position + 5], png[position + 6], png[position + 7]];
        let start = position + 8;
        // Data, then the CRC.
        let Some(end) = start.checked_add(length).filter(|end| end + 4 <= png.len()) else {
            break;
        };
        chunks.push((kind, &png[start..end]));
        position = end + 4;
    }
    chunks
}

pub fn find_chunk(png: &[u8], kind: [u8; 4]) -> Option<&[u8]> {
    read_chunks(png).into_iter().find(|(k, _)| *k == kind).map(|(_, data)| data)
}

/// Decompressed profile of an `iCCP` chunk.
pub fn icc_profile_from_iccp(data: &[u8]) -> Option<Vec<u8>> {
    let name_end = data.iter().position(|&b| b == 0)?;
    // Compression method byte follows the terminator.
    let compressed = data.get(name_end + 2..)?;
    miniz_oxide::inflate::decompress_to_vec_zlib(compressed).ok()
}

/// Text of an uncompressed XMP `iTXt` chunk.
pub fn xmp_from_itxt(data: &[u8]) -> Option<&[u8]> {
    let rest = data.strip_prefix(XMP_KEYWORD)?.strip_prefix(&[0])?;
    let (&compressed, rest) = rest.split_first()?;
    if compressed != 0 {
        return None;
    }
    // Compression method, then the null-terminated language tag and translated keyword.
    let rest = rest.get(1..)?;
    let language_end = rest.iter().position(|&b| b == 0)?;
    let rest = &rest[language_end + 1..];
    let keyword_end = rest.iter().position(|&b| b == 0)?;
    Some(&rest[keyword_end + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_written_in_order() {
        let png = write_png(
            2,
            1,
            png::ColorType::Rgb,
            png::BitDepth::Eight,
            &[0; 6],
            &[Chunk { kind: CHUNK_CICP, data: vec![9, 16, 0, 1] }],
            &[Chunk { kind: CHUNK_GAIN_MAP, data: vec![1, 2, 3] }],
        )
        .unwrap();

        let kinds: Vec<[u8; 4]> = read_chunks(&png).into_iter().map(|(kind, _)| kind).collect();
        let position = |kind: &[u8; 4]| kinds.iter().position(|k| k == kind).unwrap();
        assert_eq!(kinds.first(), Some(b"IHDR"));
        assert!(position(&CHUNK_CICP) < position(b"IDAT"));
        assert!(position(&CHUNK_GAIN_MAP) > position(b"IDAT"));
        assert_eq!(find_chunk(&png, CHUNK_CICP), Some([9u8, 16, 0, 1].as_slice()));
    }

    #[test]
    fn iccp_inflates_back() {
        let profile: Vec<u8> = (0..=255).cycle().take(3000).collect();
        let chunk = iccp_chunk(&profile);
        assert_eq!(icc_profile_from_iccp(&chunk.data).unwrap(), profile);
    }

    #[test]
    fn itxt_text_is_recovered() {
        let chunk = xmp_chunk("<x:xmpmeta/>");
        assert_eq!(xmp_from_itxt(&chunk.data), Some(b"<x:xmpmeta/>".as_slice()));
    }

    #[test]
    fn truncated_stream_stops_cleanly() {
        let png = encode_rgb8(&[255; 12], 2, 2).unwrap();
        assert!(read_chunks(&png[..png.len() / 2]).len() < read_chunks(&png).len());
        assert!(read_chunks(b"not a png").is_empty());
    }
}
