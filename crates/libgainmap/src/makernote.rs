//! Vendor headroom block: an Apple-style maker note inside a minimal EXIF structure.

use std::io::Cursor;

use crate::headroom::HeadroomMetadata;
use crate::ifd::{Endianness, IfdWriter, Tiff, TiffFieldValue, TiffHeader, TiffIfd};

const MAKER_NOTE_SIGNATURE: &[u8; 10] = b"Apple iOS\0";
const MAKER_NOTE_VERSION: u16 = 1;
/// Signature, version and byte order marker.
const MAKER_NOTE_HEADER_LEN: u32 = 14;

pub const TAG_HEADROOM: u16 = 0x0021;
pub const TAG_GAIN: u16 = 0x0030;

const TAG_EXIF_IFD: u16 = 0x8769;
pub const TAG_MAKER_NOTE: u16 = 0x927C;

const RATIONAL_DENOMINATOR: i32 = 100_000;

fn to_srational(value: f32) -> (i32, i32) {
    ((value as f64 * RATIONAL_DENOMINATOR as f64).round() as i32, RATIONAL_DENOMINATOR)
}

/// Maker note bytes carrying `field33` and `field48`. IFD offsets are relative to the start of the note.
pub fn maker_note(headroom: &HeadroomMetadata) -> Vec<u8> {
    let endianness = Endianness::BigEndian;

    let mut ifd = IfdWriter::new(endianness);
    ifd.push(TAG_HEADROOM, TiffFieldValue::SRATIONAL(vec![to_srational(headroom.field33())]))
        .push(TAG_GAIN, TiffFieldValue::SRATIONAL(vec![to_srational(headroom.field48())]));

    let mut bytes = Vec::with_capacity(MAKER_NOTE_HEADER_LEN as usize + ifd.encoded_len());
    bytes.extend_from_slice(MAKER_NOTE_SIGNATURE);
    bytes.extend_from_slice(&endianness.u16_bytes(MAKER_NOTE_VERSION));
    bytes.extend_from_slice(&endianness.marker());
    ifd.write(MAKER_NOTE_HEADER_LEN, 0, &mut bytes);
    bytes
}

/// A TIFF structure (as stored in a JPEG `Exif` APP1, a PNG `eXIf` chunk or a HEIF EXIF item)
/// whose EXIF IFD holds the maker note.
pub fn exif_block(headroom: &HeadroomMetadata) -> Vec<u8> {
    let endianness = Endianness::BigEndian;
    const IFD0_POSITION: u32 = 8;

    let mut ifd0 = IfdWriter::new(endianness);
    // Placeholder with the right size; the real offset is known once IFD0's length is.
    ifd0.push(TAG_EXIF_IFD, TiffFieldValue::LONG(vec![0]));
    let exif_ifd_position = IFD0_POSITION + ifd0.encoded_len() as u32;
    ifd0.push(TAG_EXIF_IFD, TiffFieldValue::LONG(vec![exif_ifd_position]));

    let mut exif_ifd = IfdWriter::new(endianness);
    exif_ifd.push(TAG_MAKER_NOTE, TiffFieldValue::UNDEFINED(maker_note(headroom)));

    let mut bytes = TiffHeader::to_bytes(endianness, IFD0_POSITION).to_vec();
    ifd0.write(IFD0_POSITION, 0, &mut bytes);
    exif_ifd.write(exif_ifd_position, 0, &mut bytes);
    bytes
}

/// Reads `(field33, field48)` back from a block written by [`exif_block`].
pub fn read_exif_block(exif: &[u8]) -> Option<(f32, f32)> {
    let tiff = Tiff::from_reader(&mut Cursor::new(exif)).ok()?;
    let exif_ifd_position = *tiff.ifds.first()?.entry_with_tag(TAG_EXIF_IFD)?.field_value_as_long()?.first()?;

    let mut cursor = Cursor::new(exif);
    cursor.set_position(exif_ifd_position as u64);
    let exif_ifd = TiffIfd::from_reader(&mut cursor, tiff.header.endianness).ok()?;
    let note = exif_ifd.entry_with_tag(TAG_MAKER_NOTE)?.field_value_as_undefined()?;

    read_maker_note(note)
}

pub fn read_maker_note(note: &[u8]) -> Option<(f32, f32)> {
    if !note.starts_with(MAKER_NOTE_SIGNATURE) || note.len() < MAKER_NOTE_HEADER_LEN as usize {
        return None;
    }

    let mut cursor = Cursor::new(note);
    cursor.set_position(MAKER_NOTE_HEADER_LEN as u64);
    let ifd = TiffIfd::from_reader(&mut cursor, Endianness::BigEndian).ok()?;

    let read = |tag: u16| -> Option<f32> {
        let &(n, d) = ifd.entry_with_tag(tag)?.field_value_as_srational()?.first()?;
        Some(n as f32 / d as f32)
    };
    Some((read(TAG_HEADROOM)?, read(TAG_GAIN)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maker_note_layout() {
        let note = maker_note(&HeadroomMetadata::mono());
        assert_eq!(&note[..10], b"Apple iOS\0");
        assert_eq!(&note[10..12], &[0, 1]);
        assert_eq!(&note[12..14], b"MM");
        assert_eq!(read_maker_note(&note), Some((1.0, 0.0)));
    }

    #[test]
    fn exif_block_carries_headroom_fields() {
        let headroom = HeadroomMetadata::from_stops(2.0);
        let exif = exif_block(&headroom);
        let (field33, field48) = read_exif_block(&exif).unwrap();
        assert_eq!(field33, headroom.field33());
        assert!((field48 - headroom.field48()).abs() < 1e-5);
    }
}
