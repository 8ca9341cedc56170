// https://www.itu.int/itudoc/itu-t/com16/tiff-fx/docs/tiff6.pdf
//
// Image File Directories as used inside EXIF blocks, maker notes and the JPEG MPF index.

use std::io::{Read, Seek};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// `0x4949` (little-endian)
    LittleEndian,
    /// `0x4D4D` (big-endian)
    BigEndian,
}

#[derive(Debug, Clone)]
pub struct Tiff {
    pub header: TiffHeader,
    pub ifds: Vec<TiffIfd>,
}

#[derive(Debug, Clone)]
pub struct TiffHeader {
    pub endianness: Endianness,
    pub first_ifd_offset: u32,
}

/// Image File Directory (IFD) structure
#[derive(Debug, Clone)]
pub struct TiffIfd {
    pub entries: Vec<TiffIfdEntry>,

    next_ifd_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TiffIfdEntry {
    pub tag: u16,
    pub field_value: TiffFieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum TiffFieldType {
    BYTE = 1,
    ASCII = 2,
    SHORT = 3,
    LONG = 4,
    RATIONAL = 5,
    UNDEFINED = 7,
    SLONG = 9,
    SRATIONAL = 10,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TiffFieldValue {
    BYTE(Vec<u8>),
    ASCII(String),
    SHORT(Vec<u16>),
    LONG(Vec<u32>),
    RATIONAL(Vec<(u32, u32)>),
    UNDEFINED(Vec<u8>),
    SLONG(Vec<i32>),
    SRATIONAL(Vec<(i32, i32)>),
}

impl Endianness {
    pub fn marker(self) -> [u8; 2] {
        match self {
            Endianness::LittleEndian => *b"II",
            Endianness::BigEndian => *b"MM",
        }
    }

    pub fn read_u16<R: Read>(self, reader: &mut R) -> std::io::Result<u16> {
        let mut buffer = [0; 2];
        reader.read_exact(&mut buffer)?;
        match self {
            Endianness::LittleEndian => Ok(u16::from_le_bytes(buffer)),
            Endianness::BigEndian => Ok(u16::from_be_bytes(buffer)),
        }
    }

    pub fn read_u32<R: Read>(self, reader: &mut R) -> std::io::Result<u32> {
        let mut buffer = [0; 4];
        reader.read_exact(&mut buffer)?;
        match self {
            Endianness::LittleEndian => Ok(u32::from_le_bytes(buffer)),
            Endianness::BigEndian => Ok(u32::from_be_bytes(buffer)),
        }
    }

    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Endianness::LittleEndian => value.to_le_bytes(),
            Endianness::BigEndian => value.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Endianness::LittleEndian => value.to_le_bytes(),
            Endianness::BigEndian => value.to_be_bytes(),
        }
    }
}

impl Tiff {
    /// Parses a TIFF structure. IFD offsets are relative to the start of `reader`.
    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        let header = TiffHeader::new(reader)?;

        let mut ifds: Vec<TiffIfd> = Vec::new();

        let mut ifd_offset = Some(header.first_ifd_offset);
        while let Some(offset) = ifd_offset {
            if ifds.len() >= 64 {
                return Err(invalid_data("Too many IFDs"));
            }

            reader.seek(std::io::SeekFrom::Start(offset as u64))?;
            let ifd = TiffIfd::from_reader(reader, header.endianness)?;

            ifd_offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(Tiff { header, ifds })
    }
}

impl TiffHeader {
    fn new<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut byte_order = [0; 2];
        reader.read_exact(&mut byte_order)?;

        let endianness = match &byte_order {
            b"II" => Endianness::LittleEndian,
            b"MM" => Endianness::BigEndian,
            _ => return Err(invalid_data("Invalid TIFF byte order")),
        };

        let version = endianness.read_u16(reader)?;
        if version != 42 {
            return Err(invalid_data("Invalid TIFF magic number"));
        }

        let first_ifd_offset = endianness.read_u32(reader)?;

        Ok(TiffHeader {
            endianness,
            first_ifd_offset,
        })
    }

    /// The 8-byte header: byte order, 42, and the offset of the first IFD.
    pub fn to_bytes(endianness: Endianness, first_ifd_offset: u32) -> [u8; 8] {
        let mut bytes = [0; 8];
        bytes[0..2].copy_from_slice(&endianness.marker());
        bytes[2..4].copy_from_slice(&endianness.u16_bytes(42));
        bytes[4..8].copy_from_slice(&endianness.u32_bytes(first_ifd_offset));
        bytes
    }
}

impl TiffIfd {
    pub fn entry_with_tag(&self, tag: u16) -> Option<&TiffIfdEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    /// Reads an IFD whose value offsets are relative to the start of `reader`.
    /// `reader` must be positioned at the start of the IFD.
    pub fn from_reader<R: Read + Seek>(reader: &mut R, endianness: Endianness) -> std::io::Result<Self> {
        const VALUE_OFFSET_SIZE: usize = 4;

        let entry_count = endianness.read_u16(reader)?;
        if entry_count < 1 {
            return Err(invalid_data("Invalid IFD entry count"));
        }

        let mut entries: Vec<TiffIfdEntry> = Vec::with_capacity(entry_count as usize);

        for _ in 0..entry_count {
            let tag = endianness.read_u16(reader)?;
            let field_type = endianness.read_u16(reader)?;
            let count = endianness.read_u32(reader)?;

            let field_type = TiffFieldType::from_u16(field_type)
                .ok_or_else(|| invalid_data("Unsupported field type"))?;

            let size = field_type.size() * count as usize;

            let field_value = if size <= VALUE_OFFSET_SIZE {
                // The field value is stored directly in the IFD entry, padded to 4 bytes.
                let mut inline = [0; VALUE_OFFSET_SIZE];
                reader.read_exact(&mut inline)?;
                TiffFieldValue::from_reader(&mut &inline[..size], endianness, field_type, count)?
            } else {
                let value_offset = endianness.read_u32(reader)? as u64;

                let old_position = reader.stream_position()?;
                reader.seek(std::io::SeekFrom::Start(value_offset))?;

                let field_value = TiffFieldValue::from_reader(reader, endianness, field_type, count)?;
                reader.seek(std::io::SeekFrom::Start(old_position))?;
                field_value
            };

            entries.push(TiffIfdEntry {
                tag,
                field_value,
            });
        }

        let next_ifd_offset = endianness.read_u32(reader)?;
        let next_ifd_offset = if next_ifd_offset == 0 {
            None
        } else {
            Some(next_ifd_offset)
        };

        Ok(TiffIfd {
            entries,
            next_ifd_offset,
        })
    }
}

impl TiffIfdEntry {
    pub fn field_value_as_long(&self) -> Option<&[u32]> {
        if let TiffFieldValue::LONG(ref data) = self.field_value {
            Some(data)
        } else {
            None
        }
    }

    pub fn field_value_as_undefined(&self) -> Option<&[u8]> {
        if let TiffFieldValue::UNDEFINED(ref data) = self.field_value {
            Some(data)
        } else {
            None
        }
    }

    pub fn field_value_as_srational(&self) -> Option<&[(i32, i32)]> {
        if let TiffFieldValue::SRATIONAL(ref data) = self.field_value {
            Some(data)
        } else {
            None
        }
    }
}

impl TiffFieldType {
    fn size(&self) -> usize {
        match self {
            TiffFieldType::BYTE => 1,
            TiffFieldType::ASCII => 1,
            TiffFieldType::SHORT => 2,
            TiffFieldType::LONG => 4,
            TiffFieldType::RATIONAL => 8,
            TiffFieldType::UNDEFINED => 1,
            TiffFieldType::SLONG => 4,
            TiffFieldType::SRATIONAL => 8,
        }
    }
}

impl TiffFieldValue {
    fn from_reader<R: Read>(reader: &mut R, endianness: Endianness, field_type: TiffFieldType, count: u32) -> std::io::Result<Self> {
        let count = count as usize;
        match field_type {
            TiffFieldType::BYTE | TiffFieldType::UNDEFINED | TiffFieldType::ASCII => {
                let mut buffer = vec![0; count];
                reader.read_exact(&mut buffer)?;
                Ok(match field_type {
                    TiffFieldType::BYTE => TiffFieldValue::BYTE(buffer),
                    TiffFieldType::ASCII => {
                        let string = String::from_utf8(buffer).map_err(|_| invalid_data("Invalid ASCII string"))?;
                        TiffFieldValue::ASCII(string.trim_end_matches('\0').to_owned())
                    },
                    _ => TiffFieldValue::UNDEFINED(buffer),
                })
            },
            TiffFieldType::SHORT => {
                let values = (0..count).map(|_| endianness.read_u16(reader)).collect::<std::io::Result<_>>()?;
                Ok(TiffFieldValue::SHORT(values))
            },
            TiffFieldType::LONG => {
                let values = (0..count).map(|_| endianness.read_u32(reader)).collect::<std::io::Result<_>>()?;
                Ok(TiffFieldValue::LONG(values))
            },
            TiffFieldType::SLONG => {
                let values = (0..count).map(|_| endianness.read_u32(reader).map(|v| v as i32)).collect::<std::io::Result<_>>()?;
                Ok(TiffFieldValue::SLONG(values))
            },
            TiffFieldType::RATIONAL => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let numerator = endianness.read_u32(reader)?;
                    let denominator = endianness.read_u32(reader)?;
                    values.push((numerator, denominator));
                }
                Ok(TiffFieldValue::RATIONAL(values))
            },
            TiffFieldType::SRATIONAL => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let numerator = endianness.read_u32(reader)? as i32;
                    let denominator = endianness.read_u32(reader)? as i32;
                    values.push((numerator, denominator));
                }
                Ok(TiffFieldValue::SRATIONAL(values))
            },
        }
    }

    fn field_type(&self) -> TiffFieldType {
        match self {
            TiffFieldValue::BYTE(_) => TiffFieldType::BYTE,
            TiffFieldValue::ASCII(_) => TiffFieldType::ASCII,
            TiffFieldValue::SHORT(_) => TiffFieldType::SHORT,
            TiffFieldValue::LONG(_) => TiffFieldType::LONG,
            TiffFieldValue::RATIONAL(_) => TiffFieldType::RATIONAL,
            TiffFieldValue::UNDEFINED(_) => TiffFieldType::UNDEFINED,
            TiffFieldValue::SLONG(_) => TiffFieldType::SLONG,
            TiffFieldValue::SRATIONAL(_) => TiffFieldType::SRATIONAL,
        }
    }

    fn count(&self) -> u32 {
        let count = match self {
            TiffFieldValue::BYTE(values) | TiffFieldValue::UNDEFINED(values) => values.len(),
            // Including the terminating NUL.
            TiffFieldValue::ASCII(string) => string.len() + 1,
            TiffFieldValue::SHORT(values) => values.len(),
            TiffFieldValue::LONG(values) => values.len(),
            TiffFieldValue::RATIONAL(values) => values.len(),
            TiffFieldValue::SLONG(values) => values.len(),
            TiffFieldValue::SRATIONAL(values) => values.len(),
        };
        count as u32
    }

    fn to_bytes(&self, endianness: Endianness) -> Vec<u8> {
        match self {
            TiffFieldValue::BYTE(values) | TiffFieldValue::UNDEFINED(values) => values.clone(),
            TiffFieldValue::ASCII(string) => {
                let mut bytes = string.as_bytes().to_vec();
                bytes.push(0);
                bytes
            },
            TiffFieldValue::SHORT(values) => values.iter().flat_map(|&v| endianness.u16_bytes(v)).collect(),
            TiffFieldValue::LONG(values) => values.iter().flat_map(|&v| endianness.u32_bytes(v)).collect(),
            TiffFieldValue::SLONG(values) => values.iter().flat_map(|&v| endianness.u32_bytes(v as u32)).collect(),
            TiffFieldValue::RATIONAL(values) => values
                .iter()
                .flat_map(|&(n, d)| endianness.u32_bytes(n).into_iter().chain(endianness.u32_bytes(d)))
                .collect(),
            TiffFieldValue::SRATIONAL(values) => values
                .iter()
                .flat_map(|&(n, d)| endianness.u32_bytes(n as u32).into_iter().chain(endianness.u32_bytes(d as u32)))
                .collect(),
        }
    }
}

/// Builds one IFD.
///
/// Out-of-line values are placed right after the directory, each starting on a word boundary.
#[derive(Debug, Clone)]
pub struct IfdWriter {
    endianness: Endianness,
    entries: Vec<TiffIfdEntry>,
}

impl IfdWriter {
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness, entries: Vec::new() }
    }

    pub fn push(&mut self, tag: u16, field_value: TiffFieldValue) -> &mut Self {
        self.entries.retain(|entry| entry.tag != tag);
        self.entries.push(TiffIfdEntry { tag, field_value });
        self
    }

    fn directory_len(&self) -> usize {
        2 + 12 * self.entries.len() + 4
    }

    /// Bytes [`IfdWriter::write`] will produce.
    pub fn encoded_len(&self) -> usize {
        let out_of_line: usize = self.entries
            .iter()
            .map(|entry| entry.field_value.to_bytes(self.endianness).len())
            .filter(|&len| len > 4)
            .map(|len| len + len % 2)
            .sum();
        self.directory_len() + out_of_line
    }

    /// Appends the IFD to `out`. `position` is the offset the IFD will have relative to the offset base
    /// (usually the TIFF header), and is used to compute value offsets.
    pub fn write(&self, position: u32, next_ifd_offset: u32, out: &mut Vec<u8>) {
        let endianness = self.endianness;

        let mut entries: Vec<&TiffIfdEntry> = self.entries.iter().collect();
        entries.sort_by_key(|entry| entry.tag);

        let mut directory = Vec::with_capacity(self.directory_len());
        let mut data = Vec::new();
        let data_position = position as usize + self.directory_len();

        directory.extend_from_slice(&endianness.u16_bytes(entries.len() as u16));
        for entry in entries {
            let value = &entry.field_value;
            let bytes = value.to_bytes(endianness);

            directory.extend_from_slice(&endianness.u16_bytes(entry.tag));
            directory.extend_from_slice(&endianness.u16_bytes(value.field_type() as u16));
            directory.extend_from_slice(&endianness.u32_bytes(value.count()));

            if bytes.len() <= 4 {
                let mut inline = [0; 4];
                inline[..bytes.len()].copy_from_slice(&bytes);
                directory.extend_from_slice(&inline);
            } else {
                let offset = (data_position + data.len()) as u32;
                directory.extend_from_slice(&endianness.u32_bytes(offset));
                data.extend_from_slice(&bytes);
                if data.len() % 2 == 1 {
                    data.push(0);
                }
            }
        }
        directory.extend_from_slice(&endianness.u32_bytes(next_ifd_offset));

        out.extend_from_slice(&directory);
        out.extend_from_slice(&data);
    }
}

fn invalid_data(message: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn written_directory_reads_back() {
        for endianness in [Endianness::BigEndian, Endianness::LittleEndian] {
            let mut ifd = IfdWriter::new(endianness);
            ifd.push(0x0030, TiffFieldValue::SRATIONAL(vec![(-1234, 100000)]))
                .push(0x0001, TiffFieldValue::SHORT(vec![7]))
                .push(0x0002, TiffFieldValue::ASCII("hello".to_owned()))
                .push(0x0003, TiffFieldValue::UNDEFINED(vec![1, 2, 3]));

            let mut bytes = TiffHeader::to_bytes(endianness, 8).to_vec();
            ifd.write(8, 0, &mut bytes);
            assert_eq!(bytes.len(), 8 + ifd.encoded_len());

            let tiff = Tiff::from_reader(&mut Cursor::new(&bytes)).unwrap();
            assert_eq!(tiff.header.endianness, endianness);
            let parsed = &tiff.ifds[0];

            // Entries come back sorted by tag.
            let tags: Vec<_> = parsed.entries.iter().map(|e| e.tag).collect();
            assert_eq!(tags, [1, 2, 3, 0x30]);
            assert_eq!(parsed.entry_with_tag(0x0001).unwrap().field_value, TiffFieldValue::SHORT(vec![7]));
            assert_eq!(parsed.entry_with_tag(0x0002).unwrap().field_value, TiffFieldValue::ASCII("hello".to_owned()));
            assert_eq!(parsed.entry_with_tag(0x0003).unwrap().field_value_as_undefined(), Some(&[1u8, 2, 3][..]));
            assert_eq!(parsed.entry_with_tag(0x0030).unwrap().field_value_as_srational(), Some(&[(-1234, 100000)][..]));
        }
    }

    #[test]
    fn rejects_bad_byte_order() {
        let bytes = [b'X', b'X', 0, 42, 0, 0, 0, 8];
        assert!(Tiff::from_reader(&mut Cursor::new(&bytes)).is_err());
    }
}
