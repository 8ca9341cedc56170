// https://web.archive.org/web/20160405200235/http://cipa.jp/std/documents/e/DC-007_E.pdf

use std::io::Cursor;

use crate::ifd::{Endianness, IfdWriter, Tiff, TiffFieldValue, TiffHeader};

const TAG_MPF_VERSION: u16 = 0xB000;
const TAG_NUMBER_OF_IMAGES: u16 = 0xB001;
const TAG_MP_ENTRY: u16 = 0xB002;

const MP_ENTRY_LEN: usize = 16;
const ATTRIBUTE_PRIMARY: u32 = 0x03_0000;
const ATTRIBUTE_UNDEFINED: u32 = 0x00_0000;

/// APP2 identifier that starts the MPF payload.
pub const MPF_IDENTIFIER: &[u8; 4] = b"MPF\0";

/// Represents the Multi-Picture Format (MPF) index of a JPEG file.
#[derive(Debug, Clone, PartialEq)]
pub struct MpfInfo {
    mp_entries: Vec<MpfMpEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MpfMpEntry {
    pub individual_image_attribute: u32,
    pub individual_image_size: u32,
    /// Relative to the MPF TIFF header; 0 for the first image.
    pub individual_image_data_offset: u32,
}

impl MpfInfo {
    pub fn mp_entries(&self) -> &[MpfMpEntry] {
        &self.mp_entries
    }

    /// Index for a primary image followed by one more image.
    ///
    /// - `primary_len`: byte length of the whole primary JPEG, MPF segment included.
    /// - `tiff_header_position`: position of the MPF TIFF header within the primary JPEG.
    pub fn primary_with_secondary(primary_len: u32, secondary_len: u32, tiff_header_position: u32) -> Self {
        Self {
            mp_entries: vec![
                MpfMpEntry {
                    individual_image_attribute: ATTRIBUTE_PRIMARY,
                    individual_image_size: primary_len,
                    individual_image_data_offset: 0,
                },
                MpfMpEntry {
                    individual_image_attribute: ATTRIBUTE_UNDEFINED,
                    individual_image_size: secondary_len,
                    individual_image_data_offset: primary_len - tiff_header_position,
                },
            ],
        }
    }

    /// Payload of the APP2 segment, starting with [`MPF_IDENTIFIER`]. Its length only depends on the entry count.
    pub fn to_app2_payload(&self) -> Vec<u8> {
        let endianness = Endianness::BigEndian;

        let mut entries = Vec::with_capacity(self.mp_entries.len() * MP_ENTRY_LEN);
        for entry in &self.mp_entries {
            entries.extend_from_slice(&endianness.u32_bytes(entry.individual_image_attribute));
            entries.extend_from_slice(&endianness.u32_bytes(entry.individual_image_size));
            entries.extend_from_slice(&endianness.u32_bytes(entry.individual_image_data_offset));
            // Dependent image entry numbers.
            entries.extend_from_slice(&[0; 4]);
        }

        let mut ifd = IfdWriter::new(endianness);
        ifd.push(TAG_MPF_VERSION, TiffFieldValue::UNDEFINED(b"0100".to_vec()))
            .push(TAG_NUMBER_OF_IMAGES, TiffFieldValue::LONG(vec![self.mp_entries.len() as u32]))
            .push(TAG_MP_ENTRY, TiffFieldValue::UNDEFINED(entries));

        let mut payload = MPF_IDENTIFIER.to_vec();
        payload.extend_from_slice(&TiffHeader::to_bytes(endianness, 8));
        let mut tiff = Vec::new();
        ifd.write(8, 0, &mut tiff);
        payload.extend_from_slice(&tiff);
        payload
    }

    /// Parses the TIFF part of an MPF segment (after [`MPF_IDENTIFIER`]).
    pub fn new_from_bytes(mpf_bytes: &[u8]) -> std::io::Result<Self> {
        let invalid = |message: &'static str| std::io::Error::new(std::io::ErrorKind::InvalidData, message);

        let mpf_tiff = Tiff::from_reader(&mut Cursor::new(mpf_bytes))?;
        let endianness = mpf_tiff.header.endianness;
        let mp_index_ifd = mpf_tiff.ifds.first().ok_or_else(|| invalid("Missing MP index IFD"))?;

        let version_bytes = mp_index_ifd.entry_with_tag(TAG_MPF_VERSION)
            .and_then(|entry| entry.field_value_as_undefined())
            .ok_or_else(|| invalid("Missing MPF version"))?;
        if version_bytes != b"0100" {
            return Err(invalid("Version bytes must be '0', '1', '0', '0'"));
        }

        let number_of_images = mp_index_ifd.entry_with_tag(TAG_NUMBER_OF_IMAGES)
            .and_then(|entry| entry.field_value_as_long())
            .and_then(|values| values.first().copied())
            .ok_or_else(|| invalid("Failed to read number of images"))?;

        let mp_entry_bytes = mp_index_ifd.entry_with_tag(TAG_MP_ENTRY)
            .and_then(|entry| entry.field_value_as_undefined())
            .ok_or_else(|| invalid("Missing MP entries"))?;
        if mp_entry_bytes.len() != MP_ENTRY_LEN * number_of_images as usize {
            return Err(invalid("MP entry size does not match the number of images"));
        }

        let mut mp_entries = Vec::with_capacity(number_of_images as usize);
        for chunk in mp_entry_bytes.chunks_exact(MP_ENTRY_LEN) {
            let mut reader = chunk;
            mp_entries.push(MpfMpEntry {
                individual_image_attribute: endianness.read_u32(&mut reader)?,
                individual_image_size: endianness.read_u32(&mut reader)?,
                individual_image_data_offset: endianness.read_u32(&mut reader)?,
            });
        }

        Ok(Self { mp_entries })
    }
}
