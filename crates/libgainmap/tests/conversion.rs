mod common;

use std::io::Cursor;

use common::{Encoding, find_xmp, list_dir, scratch_dir, write_hdr_png};

use libgainmap::gainmap::GainMapMetadata;
use libgainmap::headroom::HeadroomMetadata;
use libgainmap::mpf::MpfInfo;
use libgainmap::native::decode_png_source;
use libgainmap::outpng::{self, CHUNK_CICP, CHUNK_EXIF, CHUNK_GAIN_MAP, CHUNK_ICCP, CHUNK_SBIT};
use libgainmap::{ConversionRequest, GainMapStyle, NativeServices, OutputFormat, convert, makernote};

fn request(source: &std::path::Path, output: &std::path::Path, format: OutputFormat) -> libgainmap::request::ConversionRequestBuilder {
    ConversionRequest::builder(source, output).output_format(format)
}

#[test]
fn default_png_carries_rgb_gain_map() {
    let dir = scratch_dir("default_png");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Png).build().unwrap();
    let destination = convert(&request, &NativeServices::new()).unwrap();
    assert_eq!(destination, output.join("scene.PNG"));
    assert_eq!(list_dir(&output), vec!["scene.PNG"]);

    let bytes = std::fs::read(&destination).unwrap();
    assert!(outpng::find_chunk(&bytes, CHUNK_ICCP).is_some());
    // SDR primaries carry no cICP.
    assert!(outpng::find_chunk(&bytes, CHUNK_CICP).is_none());

    let exif = outpng::find_chunk(&bytes, CHUNK_EXIF).unwrap();
    assert!(makernote::read_exif_block(exif).is_some());

    let gain_map_png = outpng::find_chunk(&bytes, CHUNK_GAIN_MAP).unwrap();
    let decoder = png::Decoder::new(gain_map_png);
    let reader = decoder.read_info().unwrap();
    assert_eq!(reader.info().color_type, png::ColorType::Rgb);
    assert_eq!(reader.info().bit_depth, png::BitDepth::Eight);
    assert_eq!((reader.info().width, reader.info().height), (16, 12));

    let metadata = GainMapMetadata::new_from_xmp_bytes(find_xmp(gain_map_png).unwrap()).unwrap();
    assert!(!metadata.base_rendition_is_hdr);
    // log2 of a headroom clamped to [2, 16].
    assert!((1.0..=4.0).contains(&metadata.hdr_capacity_max), "{:?}", metadata);
}

#[test]
fn mono_gain_map_uses_fixed_metadata() {
    let dir = scratch_dir("mono_png");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Hlg);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Png)
        .gain_map_style(GainMapStyle::Mono)
        .build()
        .unwrap();
    let destination = convert(&request, &NativeServices::new()).unwrap();
    let bytes = std::fs::read(&destination).unwrap();

    let gain_map_png = outpng::find_chunk(&bytes, CHUNK_GAIN_MAP).unwrap();
    let reader = png::Decoder::new(gain_map_png).read_info().unwrap();
    assert_eq!(reader.info().color_type, png::ColorType::Grayscale);

    let metadata = GainMapMetadata::new_from_xmp_bytes(find_xmp(gain_map_png).unwrap()).unwrap();
    assert_eq!(metadata, GainMapMetadata::for_mono());

    let (field33, field48) = makernote::read_exif_block(outpng::find_chunk(&bytes, CHUNK_EXIF).unwrap()).unwrap();
    let expected = HeadroomMetadata::mono();
    assert!((field33 - expected.field33()).abs() < 1e-4);
    assert!((field48 - expected.field48()).abs() < 1e-4);
}

#[test]
fn pq_png_keeps_the_hdr_signal() {
    let dir = scratch_dir("pq_png");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Png)
        .pq(true)
        .bit_depth(10)
        .build()
        .unwrap();
    let destination = convert(&request, &NativeServices::new()).unwrap();
    let bytes = std::fs::read(&destination).unwrap();

    assert_eq!(outpng::find_chunk(&bytes, CHUNK_CICP), Some(&[9u8, 16, 0, 1][..]));
    assert_eq!(outpng::find_chunk(&bytes, CHUNK_SBIT), Some(&[10u8, 10, 10][..]));
    assert!(outpng::find_chunk(&bytes, CHUNK_GAIN_MAP).is_none());
    assert!(outpng::find_chunk(&bytes, CHUNK_EXIF).is_none());

    let original = decode_png_source(&std::fs::read(&source).unwrap()).unwrap();
    let written = decode_png_source(&bytes).unwrap();
    let a = original.rendition.content.get_at(8, 6);
    let b = written.rendition.content.get_at(8, 6);
    for (a, b) in a.rgb().into_iter().zip(b.rgb()) {
        assert!((a - b).abs() / a < 0.05, "{} vs {}", a, b);
    }
}

#[test]
fn sdr_only_png_is_plain() {
    let dir = scratch_dir("sdr_png");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Hlg);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Png).sdr(true).build().unwrap();
    let destination = convert(&request, &NativeServices::new()).unwrap();
    let bytes = std::fs::read(&destination).unwrap();

    let reader = png::Decoder::new(bytes.as_slice()).read_info().unwrap();
    assert_eq!(reader.info().bit_depth, png::BitDepth::Eight);
    assert!(outpng::find_chunk(&bytes, CHUNK_GAIN_MAP).is_none());
    assert!(outpng::find_chunk(&bytes, CHUNK_EXIF).is_none());
}

#[test]
fn default_jpeg_is_a_multi_picture_file() {
    use zune_jpeg::JpegDecoder;
    use zune_jpeg::zune_core::bytestream::ZCursor;

    let dir = scratch_dir("default_jpeg");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Jpeg).build().unwrap();
    let destination = convert(&request, &NativeServices::new()).unwrap();
    assert_eq!(destination, output.join("scene.JPG"));
    let bytes = std::fs::read(&destination).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

    let mut decoder = JpegDecoder::new(ZCursor::new(bytes.as_slice()));
    decoder.decode_headers().unwrap();
    let info = decoder.info().unwrap();
    assert_eq!((info.width, info.height), (16, 12));

    let mpf_info = MpfInfo::new_from_bytes(info.multi_picture_information.as_deref().unwrap()).unwrap();
    let entries = mpf_info.mp_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].individual_image_data_offset, 0);

    let primary_len = entries[0].individual_image_size as usize;
    assert_eq!(primary_len + entries[1].individual_image_size as usize, bytes.len());

    let (primary, gain_map_jpeg) = bytes.split_at(primary_len);
    assert_eq!(&gain_map_jpeg[..2], &[0xFF, 0xD8]);
    assert_eq!(&primary[primary.len() - 2..], &[0xFF, 0xD9]);

    let metadata = GainMapMetadata::new_from_xmp_bytes(find_xmp(gain_map_jpeg).unwrap()).unwrap();
    assert!((1.0..=4.0).contains(&metadata.hdr_capacity_max));

    // The primary's own XMP announces the gain map length.
    let primary_xmp = std::str::from_utf8(find_xmp(primary).unwrap()).unwrap();
    assert!(primary_xmp.contains(&format!("Item:Length=\"{}\"", gain_map_jpeg.len())), "{}", primary_xmp);

    // EXIF APP1: length-prefixed, identifier, then the TIFF block.
    let exif_at = primary.windows(6).position(|w| w == b"Exif\0\0").unwrap();
    let segment_len = u16::from_be_bytes([primary[exif_at - 2], primary[exif_at - 1]]) as usize;
    let exif = &primary[exif_at + 6..exif_at - 2 + segment_len];
    assert!(makernote::read_exif_block(exif).is_some());
}

/// Byte-array tag of the current TIFF directory, whatever integer width the decoder reports it in.
fn tag_bytes<R: std::io::Read + std::io::Seek>(decoder: &mut tiff::decoder::Decoder<R>, tag: u16) -> Vec<u8> {
    use tiff::decoder::ifd::Value;

    match decoder.find_tag(tiff::tags::Tag::Unknown(tag)).unwrap().unwrap() {
        Value::List(values) => values.into_iter().map(|v| v.into_u64().unwrap() as u8).collect(),
        value => vec![value.into_u64().unwrap() as u8],
    }
}

#[test]
fn default_tiff_has_two_pages() {
    use tiff::decoder::Decoder;

    let dir = scratch_dir("default_tiff");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Tiff)
        .gain_map_style(GainMapStyle::Mono)
        .build()
        .unwrap();
    let destination = convert(&request, &NativeServices::new()).unwrap();
    assert_eq!(destination, output.join("scene.TIFF"));

    let mut decoder = Decoder::new(Cursor::new(std::fs::read(&destination).unwrap())).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (16, 12));
    assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::RGB(8));
    // An ICC profile starts with its own size.
    let icc = tag_bytes(&mut decoder, 34675);
    assert_eq!(u32::from_be_bytes([icc[0], icc[1], icc[2], icc[3]]) as usize, icc.len());
    assert_eq!(&icc[36..40], b"acsp");
    let note = tag_bytes(&mut decoder, 37500);
    assert!(makernote::read_maker_note(&note).is_some());

    assert!(decoder.more_images());
    decoder.next_image().unwrap();
    assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::Gray(8));
    let xmp = tag_bytes(&mut decoder, 700);
    assert_eq!(GainMapMetadata::new_from_xmp_bytes(find_xmp(&xmp).unwrap()), Some(GainMapMetadata::for_mono()));
}

#[test]
fn sixteen_bit_tiff_from_hlg() {
    use tiff::decoder::Decoder;

    let dir = scratch_dir("hlg_tiff");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Hlg);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Tiff)
        .hlg(true)
        .bit_depth(16)
        .build()
        .unwrap();
    let destination = convert(&request, &NativeServices::new()).unwrap();

    let mut decoder = Decoder::new(Cursor::new(std::fs::read(&destination).unwrap())).unwrap();
    assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::RGB(16));
    assert!(!decoder.more_images());
}

#[test]
fn invalid_requests_write_nothing() {
    let dir = scratch_dir("invalid");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let conflicting = request(&source, &output, OutputFormat::Png).sdr(true).hlg(true).build();
    assert!(conflicting.unwrap_err().is_validation());

    let eight_bit_pq = request(&source, &output, OutputFormat::Png).pq(true).build().unwrap();
    assert!(convert(&eight_bit_pq, &NativeServices::new()).unwrap_err().is_validation());

    let pq_jpeg = request(&source, &output, OutputFormat::Jpeg).pq(true).build().unwrap();
    assert!(convert(&pq_jpeg, &NativeServices::new()).unwrap_err().is_validation());

    assert!(request(&source, &output, OutputFormat::Png).bit_depth(12).build().unwrap_err().is_validation());
    assert!(request(&source, &output, OutputFormat::Png).quality(0.0).build().unwrap_err().is_validation());

    assert!(list_dir(&output).is_empty());
}

#[test]
fn sdr_sources_fail_to_decode() {
    let dir = scratch_dir("sdr_source");
    let source = dir.join("flat.png");
    std::fs::write(&source, common::sdr_png(4, 4)).unwrap();
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Png).build().unwrap();
    let e = convert(&request, &NativeServices::new()).unwrap_err();
    assert!(matches!(e, libgainmap::ConvertError::Decode { .. }), "{}", e);
    assert!(list_dir(&output).is_empty());
}

#[cfg(not(feature = "heif"))]
#[test]
fn heif_needs_the_feature() {
    let dir = scratch_dir("heif_disabled");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);
    let output = dir.join("out");
    std::fs::create_dir_all(&output).unwrap();

    let request = request(&source, &output, OutputFormat::Heif).build().unwrap();
    let e = convert(&request, &NativeServices::new()).unwrap_err();
    assert!(matches!(e, libgainmap::ConvertError::Encode { .. }), "{}", e);
    assert!(list_dir(&output).is_empty());
}

#[test]
fn percent_quality_matches_fraction() {
    let dir = scratch_dir("quality");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);
    let (a, b) = (dir.join("a"), dir.join("b"));
    std::fs::create_dir_all(&a).unwrap();
    std::fs::create_dir_all(&b).unwrap();

    let percent = request(&source, &a, OutputFormat::Jpeg).quality(95.0).build().unwrap();
    let fraction = request(&source, &b, OutputFormat::Jpeg).quality(0.95).build().unwrap();
    assert_eq!(percent.quality(), fraction.quality());

    let a = std::fs::read(convert(&percent, &NativeServices::new()).unwrap()).unwrap();
    let b = std::fs::read(convert(&fraction, &NativeServices::new()).unwrap()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn repeated_conversions_are_identical() {
    let dir = scratch_dir("repeatable");
    let source = write_hdr_png(&dir, "scene.png", Encoding::Pq);

    for format in [OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::Tiff] {
        let outputs: Vec<Vec<u8>> = ["first", "second"]
            .iter()
            .map(|name| {
                let output = dir.join(format!("{}-{}", format, name));
                std::fs::create_dir_all(&output).unwrap();
                let request = request(&source, &output, format).build().unwrap();
                std::fs::read(convert(&request, &NativeServices::new()).unwrap()).unwrap()
            })
            .collect();
        assert_eq!(outputs[0], outputs[1], "{} output differs between runs", format);
    }
}
