//! Headroom measurement and the vendor headroom encoding.

use log::trace;

use crate::reduce::DEFAULT_WINDOW;
use crate::rendition::Rendition;
use crate::services::ImageServices;
use crate::tonemap::ToneMapParams;

pub const MIN_HEADROOM: f32 = 2.0;
pub const MAX_HEADROOM: f32 = 16.0;

/// Headroom expressed the way the vendor maker note stores it.
///
/// `field33` and `field48` are derived from `stops` by a fixed piecewise table;
/// see [`HeadroomMetadata::from_stops`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadroomMetadata {
    stops: f32,
    field33: f32,
    field48: f32,
}

impl HeadroomMetadata {
    pub fn from_stops(stops: f32) -> Self {
        let (field33, field48) = if stops >= 2.303 {
            (1.0, (3.0 - stops) / 70.0)
        } else if stops >= 1.8 {
            (1.0, (2.303 - stops) / 0.303)
        } else if stops >= 1.6 {
            (0.0, (1.80 - stops) / 20.0)
        } else {
            (0.0, (1.601 - stops) / 0.101)
        };

        Self { stops, field33, field48 }
    }

    /// Fixed values used with single-channel gain maps, independent of the image.
    pub const fn mono() -> Self {
        Self { stops: 0.0, field33: 1.0, field48: 0.0 }
    }

    pub fn stops(&self) -> f32 {
        self.stops
    }

    pub fn field33(&self) -> f32 {
        self.field33
    }

    pub fn field48(&self) -> f32 {
        self.field48
    }
}

/// Empirical fit from the normalized brightest value to linear headroom, clamped to `[2, 16]`.
pub fn headroom_from_normalized(v: f32) -> f32 {
    let headroom = f32::powf(2.0, -16.7702 + 20.209 * v) + 4.88701 * v + 0.2935;
    headroom.clamp(MIN_HEADROOM, MAX_HEADROOM)
}

/// Quantizes to the precision of a 16-bit unorm render target.
fn quantize_unorm16(v: f32) -> f32 {
    let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    (v * 65535.0).round() / 65535.0
}

/// Measures the linear headroom of `hdr`, in `[2, 16]`.
pub fn measure_headroom(services: &dyn ImageServices, hdr: &Rendition) -> f32 {
    let tone_mapped = services.tone_map_headroom(hdr, ToneMapParams::to_sdr(hdr.headroom));
    let grid = services.area_min_max(&tone_mapped.content, DEFAULT_WINDOW);
    let brightest = services.area_maximum(&grid.maximum).max_component();

    let v = quantize_unorm16(brightest);
    let headroom = headroom_from_normalized(v);
    trace!("Brightest tone mapped value {} (normalized {}) gives headroom {}", brightest, v, headroom);
    headroom
}
