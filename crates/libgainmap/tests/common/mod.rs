#![allow(dead_code)]

use std::path::{Path, PathBuf};

use libgainmap::transfer;

#[derive(Debug, Clone, Copy)]
pub enum Encoding {
    Pq,
    Hlg,
}

/// A fresh, empty directory under the target's scratch space.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Linear light relative to SDR white: a dim-to-bright ramp with a hot corner.
fn scene(x: u32, y: u32, width: u32, height: u32, peak: f32) -> [f32; 3] {
    if x + 2 >= width && y < 2 {
        return [peak, peak * 0.9, peak * 0.8];
    }
    let t = (x + y * width) as f32 / (width * height) as f32;
    let v = 0.02 + t * 3.5;
    [v, v * 0.8, v * 0.5]
}

/// 16-bit RGB PNG, BT.2020 primaries, tagged with a cICP chunk for `encoding`.
pub fn hdr_png(width: u32, height: u32, encoding: Encoding) -> Vec<u8> {
    let (transfer_code, peak) = match encoding {
        Encoding::Pq => (16, 20.0),
        Encoding::Hlg => (18, 4.5),
    };

    let mut data = Vec::with_capacity((width * height * 6) as usize);
    for y in 0..height {
        for x in 0..width {
            let linear = scene(x, y, width, height, peak);
            let signal = match encoding {
                Encoding::Pq => linear.map(transfer::relative_to_pq_signal),
                Encoding::Hlg => transfer::relative_to_hlg_signal(linear),
            };
            for s in signal {
                let v = (s.clamp(0.0, 1.0) * 65535.0).round() as u16;
                data.extend_from_slice(&v.to_be_bytes());
            }
        }
    }

    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Sixteen);
        let mut writer = encoder.write_header().unwrap();
        writer.write_chunk(png::chunk::ChunkType(*b"cICP"), &[9, transfer_code, 0, 1]).unwrap();
        writer.write_image_data(&data).unwrap();
        writer.finish().unwrap();
    }
    bytes
}

/// 8-bit sRGB PNG with no HDR tagging.
pub fn sdr_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&vec![128; (width * height * 3) as usize]).unwrap();
        writer.finish().unwrap();
    }
    bytes
}

pub fn write_hdr_png(dir: &Path, name: &str, encoding: Encoding) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, hdr_png(16, 12, encoding)).unwrap();
    path
}

/// Every file name in `dir`, sorted.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// The `x:xmpmeta` element embedded somewhere in `bytes`.
pub fn find_xmp(bytes: &[u8]) -> Option<&[u8]> {
    const BEGIN: &[u8] = b"<x:xmpmeta";
    const END: &[u8] = b"</x:xmpmeta>";
    let start = bytes.windows(BEGIN.len()).position(|w| w == BEGIN)?;
    let len = bytes[start..].windows(END.len()).position(|w| w == END)?;
    Some(&bytes[start..start + len + END.len()])
}
