//! TIFF output: the primary image in the first directory, the gain map as a second page.

use std::io::{Cursor, Seek, Write};

use tiff::encoder::{TiffEncoder, TiffValue, colortype};
use tiff::tags::Tag;

use crate::error::EncodeError;
use crate::makernote;
use crate::services::EncodeJob;
use crate::writer::{self, Samples};
use crate::xmp;

pub const TAG_XMP: u16 = 700;
pub const TAG_ICC_PROFILE: u16 = 34675;
pub const TAG_MAKER_NOTE: u16 = 37500;

/// Writes one directory with its strips and the given byte-valued tags.
fn write_page<W, C>(
    encoder: &mut TiffEncoder<W>,
    width: usize,
    height: usize,
    data: &[C::Inner],
    tags: &[(u16, &[u8])],
) -> Result<(), EncodeError>
where
    W: Write + Seek,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(width as u32, height as u32)?;
    for &(tag, value) in tags {
        image.encoder().write_tag(Tag::Unknown(tag), value)?;
    }
    image.write_data(data)?;
    Ok(())
}

pub fn encode(job: &EncodeJob) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = (job.primary.width(), job.primary.height());
    let icc_profile = job.color_space.icc_profile_bytes()?;

    let primary_xmp = xmp::primary_xmp(None);
    let maker_note = job.gain_map.as_ref().map(|gain_map| makernote::maker_note(&gain_map.headroom));

    let mut tags: Vec<(u16, &[u8])> = vec![(TAG_ICC_PROFILE, icc_profile.as_slice())];
    if let Some(maker_note) = &maker_note {
        tags.push((TAG_XMP, primary_xmp.as_bytes()));
        tags.push((TAG_MAKER_NOTE, maker_note.as_slice()));
    }

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor)?;

        match writer::primary_samples(job) {
            Samples::Eight(samples) => write_page::<_, colortype::RGB8>(&mut encoder, width, height, &samples, &tags)?,
            Samples::Sixteen(samples) => write_page::<_, colortype::RGB16>(&mut encoder, width, height, &samples, &tags)?,
        }

        if let Some(gain_map) = &job.gain_map {
            let (samples, channels) = writer::gain_map_samples(gain_map);
            let (width, height) = (gain_map.rendition.width(), gain_map.rendition.height());
            let gain_map_xmp = xmp::gain_map_xmp(&gain_map.metadata);
            let tags = [(TAG_XMP, gain_map_xmp.as_bytes())];

            if channels == 1 {
                write_page::<_, colortype::Gray8>(&mut encoder, width, height, &samples, &tags)?;
            } else {
                write_page::<_, colortype::RGB8>(&mut encoder, width, height, &samples, &tags)?;
            }
        }
    }

    Ok(cursor.into_inner())
}
