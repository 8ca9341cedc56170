use derive_more::Display;
use log::trace;

use crate::error::{DecodeError, GainMapError};
use crate::headroom::HeadroomMetadata;
use crate::pixel::{FloatImageContent, FloatPixel};
use crate::rendition::{Rendition, RenditionKind};
use crate::services::ImageServices;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainMapStyle {
    /// Full-color ratio map with measured headroom.
    #[default]
    #[display("RGB")]
    Rgb,
    /// Single-channel map with fixed metadata, readable by viewers that only support the simple convention.
    #[display("mono")]
    Mono,
}

/// See: https://developer.android.com/media/platform/hdr-image-format
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainMapMetadata {
    /// Indicates the dynamic range of the primary image. Always `false` here: the primary image is SDR.
    pub base_rendition_is_hdr: bool,
    /// `log2` of min content boost.
    pub gain_map_min: [f32; 3],
    /// `log2` of max content boost.
    pub gain_map_max: [f32; 3],
    /// The gamma to apply to the stored map values.
    pub gamma: [f32; 3],
    /// The offset to apply to the SDR pixel values during gain map generation and application.
    pub offset_sdr: [f32; 3],
    /// The offset to apply to the HDR pixel values during gain map generation and application.
    pub offset_hdr: [f32; 3],
    /// `log2` of the minimum display boost value for which the map is applied at all.
    pub hdr_capacity_min: f32,
    /// `log2` of the maximum display boost value for which the map is applied completely.
    pub hdr_capacity_max: f32,
}

/// Stops of boost a mono gain map is calibrated for. Matches `field33 = 1, field48 = 0`.
pub const MONO_GAIN_MAP_STOPS: f32 = 3.0;

impl GainMapMetadata {
    fn linear(max_stops: f32) -> Self {
        Self {
            base_rendition_is_hdr: false,
            gain_map_min: [0.0; 3],
            gain_map_max: [max_stops; 3],
            gamma: [1.0; 3],
            offset_sdr: [0.0; 3],
            offset_hdr: [0.0; 3],
            hdr_capacity_min: 0.0,
            hdr_capacity_max: max_stops,
        }
    }

    pub fn for_rgb(headroom_max: f32) -> Self {
        Self::linear(headroom_max.log2())
    }

    /// The shaped mono signal never drops below the curve's value at the clamp floor, so that value
    /// is placed at a boost of exactly 1 and everything above it spreads over `MONO_GAIN_MAP_STOPS`.
    pub fn for_mono() -> Self {
        let floor = mono_floor_value();
        let min = -MONO_GAIN_MAP_STOPS * floor / (1.0 - floor);
        Self {
            gain_map_min: [min; 3],
            ..Self::linear(MONO_GAIN_MAP_STOPS)
        }
    }

    /// `log2` of the boost a stored value in `[0, 1]` decodes to for channel `c`.
    pub fn log_boost(&self, c: usize, stored: f32) -> f32 {
        let v = stored.max(0.0).powf(1.0 / self.gamma[c]);
        self.gain_map_min[c] + v * (self.gain_map_max[c] - self.gain_map_min[c])
    }

    pub fn new_from_xmp_bytes(xmp_bytes: &[u8]) -> Option<Self> {
        let doc = roxmltree::Document::parse(std::str::from_utf8(xmp_bytes).ok()?).ok()?;
        let description_element_node = doc.descendants()
            .find(|node| node.tag_name().name() == "Description" && Self::read_single_f32_value(node, "HDRCapacityMax").is_some())?;

        let base_rendition_is_hdr = Self::read_single_bool_value(&description_element_node, "BaseRenditionIsHDR").unwrap_or(false);
        let gain_map_min = Self::read_rgb_f32_value(&description_element_node, "GainMapMin").unwrap_or([0.0; 3]);
        let gain_map_max = Self::read_rgb_f32_value(&description_element_node, "GainMapMax").unwrap_or([0.0; 3]);
        let gamma = Self::read_rgb_f32_value(&description_element_node, "Gamma").unwrap_or([1.0; 3]);
        let offset_sdr = Self::read_rgb_f32_value(&description_element_node, "OffsetSDR").unwrap_or([0.015625; 3]);
        let offset_hdr = Self::read_rgb_f32_value(&description_element_node, "OffsetHDR").unwrap_or([0.015625; 3]);
        let hdr_capacity_min = Self::read_single_f32_value(&description_element_node, "HDRCapacityMin").unwrap_or(0.0);
        let hdr_capacity_max = Self::read_single_f32_value(&description_element_node, "HDRCapacityMax")?;

        Some(Self {
            base_rendition_is_hdr,
            gain_map_min,
            gain_map_max,
            gamma,
            offset_sdr,
            offset_hdr,
            hdr_capacity_min,
            hdr_capacity_max,
        })
    }

    fn read_single_bool_value(description_node: &roxmltree::Node<'_, '_>, name: &str) -> Option<bool> {
        Self::read_single_text(description_node, name)?.to_ascii_lowercase().parse::<bool>().ok()
    }

    fn read_single_f32_value(description_node: &roxmltree::Node<'_, '_>, name: &str) -> Option<f32> {
        Self::read_single_text(description_node, name)?.parse::<f32>().ok()
    }

    fn read_single_text<'a>(description_node: &roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
        if let Some(attr) = description_node.attributes().find(|attr| attr.name() == name) {
            return Some(attr.value());
        }

        let value_element_node = description_node.children().find(|node| node.tag_name().name() == name)?;
        value_element_node.text()
    }

    fn read_rgb_f32_value(description_node: &roxmltree::Node<'_, '_>, name: &str) -> Option<[f32; 3]> {
        if let Some(attr) = description_node.attributes().find(|attr| attr.name() == name) {
            let value = attr.value().parse::<f32>().ok()?;
            return Some([value; 3]);
        }

        let value_element_node = description_node.children().find(|node| node.tag_name().name() == name)?;
        let Some(seq_element_node) = value_element_node.children().find(|node| node.tag_name().name() == "Seq") else {
            let value = value_element_node.text()?.trim().parse::<f32>().ok()?;
            return Some([value; 3]);
        };

        let values: Vec<f32> = seq_element_node.children()
            .filter(|node| node.tag_name().name() == "li")
            .filter_map(|li_node| li_node.text()?.parse::<f32>().ok())
            .take(3)
            .collect();

        values.try_into().ok()
    }
}

/// A computed gain map together with everything the writers need to serialize it.
#[derive(Debug, Clone)]
pub struct GainMap {
    pub style: GainMapStyle,
    /// Linear boost for RGB maps, shaped single-channel signal for mono maps.
    pub rendition: Rendition,
    pub metadata: GainMapMetadata,
    pub headroom: HeadroomMetadata,
    /// Largest linear boost the map can express.
    pub max_boost: f32,
}

impl GainMap {
    pub fn rgb(rendition: Rendition, headroom_max: f32) -> Self {
        Self {
            style: GainMapStyle::Rgb,
            rendition,
            metadata: GainMapMetadata::for_rgb(headroom_max),
            headroom: HeadroomMetadata::from_stops(headroom_max.log2()),
            max_boost: headroom_max,
        }
    }

    pub fn mono(rendition: Rendition) -> Self {
        Self {
            style: GainMapStyle::Mono,
            rendition,
            metadata: GainMapMetadata::for_mono(),
            headroom: HeadroomMetadata::mono(),
            max_boost: MONO_GAIN_MAP_STOPS.exp2(),
        }
    }

    /// Values as stored in the container, in `[0, 1]`.
    ///
    /// RGB maps store `log2(boost) / log2(max_boost)` per channel; mono maps are already shaped.
    pub fn encoded(&self) -> FloatImageContent {
        match self.style {
            GainMapStyle::Rgb => {
                let log_max = self.max_boost.log2();
                let max_boost = self.max_boost;
                self.rendition.content.map(|p| {
                    p.clamp(1.0, max_boost).map(|c| c.log2() / log_max).with_alpha(1.0)
                })
            },
            GainMapStyle::Mono => self.rendition.content.map(|p| p.clamp(0.0, 1.0).with_alpha(1.0)),
        }
    }

    pub fn is_single_channel(&self) -> bool {
        self.style == GainMapStyle::Mono
    }
}

/// Channel-wise `hdr / sdr`, clamped to `[0, headroom_max]` with alpha pinned to 1.
pub fn compute_rgb_gain_map(hdr: &Rendition, sdr: &Rendition, headroom_max: f32) -> Result<Rendition, DecodeError> {
    if hdr.content.is_empty() {
        return Err(DecodeError::EmptyImage);
    }

    let content = hdr.content
        .zip_map(&sdr.content, |h, s| (h / s).clamp(0.0, headroom_max).with_alpha(1.0))
        .ok_or(DecodeError::DimensionMismatch(hdr.width(), hdr.height(), sdr.width(), sdr.height()))?;

    Ok(Rendition {
        content,
        gamut: hdr.gamut,
        kind: RenditionKind::GainMap(GainMapStyle::Rgb),
        headroom: headroom_max,
    })
}

const MONO_EXPOSURE_EV: f32 = -3.0;
const MONO_FLOOR: f32 = 0.04;
const MONO_GAMMA: f32 = 2.2;
const MONO_CURVE_POINTS: [(f32, f32); 5] = [
    (0.0, 0.61),
    (0.5, 0.63),
    (0.75, 0.76),
    (0.9, 0.91),
    (1.0, 1.0),
];

/// The stored mono value where HDR and the proxy agree.
fn mono_floor_value() -> f32 {
    MonotoneCurve::new(&MONO_CURVE_POINTS).evaluate(MONO_FLOOR.powf(1.0 / MONO_GAMMA))
}

/// Single-channel gain map against an 8-bit proxy of the HDR rendition.
pub fn compute_mono_gain_map(services: &dyn ImageServices, hdr: &Rendition) -> Result<Rendition, GainMapError> {
    if hdr.content.is_empty() {
        return Err(DecodeError::EmptyImage.into());
    }

    let proxy = services.round_trip_sdr8(hdr)?;
    let exposure = MONO_EXPOSURE_EV.exp2();
    let curve = MonotoneCurve::new(&MONO_CURVE_POINTS);

    let content = hdr.content
        .zip_map(&proxy.content, |h, s| {
            let difference = h * exposure - s * exposure;
            let v = difference.max_component();
            let v = if v.is_nan() { MONO_FLOOR } else { v.clamp(MONO_FLOOR, 1.0) };
            let v = v.powf(1.0 / MONO_GAMMA);
            FloatPixel::splat(curve.evaluate(v)).with_alpha(1.0)
        })
        .ok_or(DecodeError::DimensionMismatch(hdr.width(), hdr.height(), proxy.width(), proxy.height()))?;

    trace!("Computed mono gain map {}x{}", content.width(), content.height());

    Ok(Rendition {
        content,
        gamut: hdr.gamut,
        kind: RenditionKind::GainMap(GainMapStyle::Mono),
        headroom: 1.0,
    })
}

/// Monotone cubic Hermite interpolation (Fritsch–Carlson) through a set of control points.
///
/// The curve passes through every point and never decreases between increasing points.
/// Inputs outside the first and last `x` are clamped.
#[derive(Debug, Clone)]
pub struct MonotoneCurve {
    xs: Vec<f32>,
    ys: Vec<f32>,
    tangents: Vec<f32>,
}

impl MonotoneCurve {
    pub fn new(points: &[(f32, f32)]) -> Self {
        let xs: Vec<f32> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f32> = points.iter().map(|p| p.1).collect();
        let n = points.len();

        let secants: Vec<f32> = (0..n.saturating_sub(1))
            .map(|k| (ys[k + 1] - ys[k]) / (xs[k + 1] - xs[k]))
            .collect();

        let mut tangents = vec![0.0; n];
        if n >= 2 {
            tangents[0] = secants[0];
            tangents[n - 1] = secants[n - 2];
            for k in 1..n - 1 {
                tangents[k] = if secants[k - 1] * secants[k] <= 0.0 {
                    0.0
                } else {
                    (secants[k - 1] + secants[k]) * 0.5
                };
            }

            for k in 0..n - 1 {
                if secants[k] == 0.0 {
                    tangents[k] = 0.0;
                    tangents[k + 1] = 0.0;
                    continue;
                }

                let alpha = tangents[k] / secants[k];
                let beta = tangents[k + 1] / secants[k];
                let magnitude = alpha * alpha + beta * beta;
                if magnitude > 9.0 {
                    let tau = 3.0 / magnitude.sqrt();
                    tangents[k] = tau * alpha * secants[k];
                    tangents[k + 1] = tau * beta * secants[k];
                }
            }
        }

        Self { xs, ys, tangents }
    }

    pub fn evaluate(&self, x: f32) -> f32 {
        let n = self.xs.len();
        match n {
            0 => return x,
            1 => return self.ys[0],
            _ => {},
        }

        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }

        let k = self.xs.partition_point(|&xk| xk <= x).saturating_sub(1).min(n - 2);
        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.ys[k] + h10 * h * self.tangents[k] + h01 * self.ys[k + 1] + h11 * h * self.tangents[k + 1]
    }
}
