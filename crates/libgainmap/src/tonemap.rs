//! Headroom-based tone mapping from an HDR rendition to a lower headroom.

use crate::pixel::FloatPixel;
use crate::rendition::{Rendition, RenditionKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMapParams {
    /// Largest value the source can hold, relative to SDR white.
    pub source_headroom: f32,
    /// Largest value the result may hold. `1.0` produces SDR.
    pub target_headroom: f32,
}

impl ToneMapParams {
    pub fn to_sdr(source_headroom: f32) -> Self {
        Self {
            source_headroom,
            target_headroom: 1.0,
        }
    }

    /// Fraction of the target below which pixels pass through unchanged.
    const KNEE: f32 = 0.5;

    fn map_peak(&self, peak: f32) -> f32 {
        let source = self.source_headroom;
        let target = self.target_headroom;
        if source <= target {
            return peak.clamp(0.0, target);
        }

        let knee = Self::KNEE * target;
        if peak <= knee {
            return peak;
        }

        let range = target - knee;
        let excess = (peak.min(source) - knee) / range;
        let excess_max = (source - knee) / range;
        knee + range * extended_reinhard(excess, excess_max)
    }
}

/// Extended Reinhard: `y (1 + y / y_max²) / (1 + y)`, which maps `y_max` to exactly 1.
#[inline]
fn extended_reinhard(y: f32, y_max: f32) -> f32 {
    y * (1.0 + y / (y_max * y_max)) / (1.0 + y)
}

/// Max-RGB tone mapping: every pixel is scaled by the ratio its brightest channel
/// is compressed by, which keeps hue and saturation.
fn tone_map_pixel(pixel: FloatPixel, params: &ToneMapParams) -> FloatPixel {
    if params.source_headroom <= params.target_headroom {
        return pixel.clamp(0.0, params.target_headroom);
    }

    let pixel = pixel.map(|c| if c.is_nan() { 0.0 } else { c.max(0.0) });
    let peak = pixel.max_component();
    if peak <= 0.0 {
        return FloatPixel::zero();
    }

    let mapped = params.map_peak(peak);
    pixel.map(|c| (c * mapped / peak).min(params.target_headroom))
}

/// Tone maps `rendition` to `params.target_headroom`. The result has the same extent and gamut.
pub fn tone_map_headroom(rendition: &Rendition, params: ToneMapParams) -> Rendition {
    let content = rendition.content.map(|p| tone_map_pixel(p, &params));
    let kind = if params.target_headroom <= 1.0 {
        RenditionKind::ToneMappedSdr
    } else {
        rendition.kind
    };

    Rendition {
        content,
        gamut: rendition.gamut,
        kind,
        headroom: params.target_headroom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorspace::ColorGamut;
    use crate::pixel::FloatImageContent;
    use crate::rendition::HdrTransfer;

    fn params() -> ToneMapParams {
        ToneMapParams::to_sdr(HdrTransfer::Pq.headroom())
    }

    #[test]
    fn shadows_pass_through_unchanged() {
        let p = FloatPixel::new(0.1, 0.3, 0.45);
        assert_eq!(tone_map_pixel(p, &params()).rgb(), p.rgb());
    }

    #[test]
    fn source_peak_lands_on_target() {
        let p = params();
        assert!((p.map_peak(p.source_headroom) - 1.0).abs() < 1e-5);
        assert!(p.map_peak(1000.0) <= 1.0);
    }

    #[test]
    fn curve_is_monotonic() {
        let p = params();
        let mut last = 0.0;
        for i in 0..=2000 {
            let v = i as f32 * 0.025;
            let mapped = p.map_peak(v);
            assert!(mapped >= last, "{v}: {mapped} < {last}");
            last = mapped;
        }
    }

    #[test]
    fn hue_is_preserved() {
        let p = FloatPixel::new(8.0, 4.0, 2.0);
        let mapped = tone_map_pixel(p, &params());
        assert!((mapped.r() / mapped.g() - 2.0).abs() < 1e-4);
        assert!((mapped.g() / mapped.b() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn lower_source_headroom_is_a_clamp() {
        let params = ToneMapParams { source_headroom: 0.8, target_headroom: 1.0 };
        let mapped = tone_map_pixel(FloatPixel::new(1.5, 0.5, -0.2), &params);
        assert_eq!(mapped.rgb(), [1.0, 0.5, 0.0]);
    }

    #[test]
    fn rendition_keeps_extent() {
        let content = FloatImageContent::from_fn(5, 3, |x, _| FloatPixel::splat(x as f32 * 10.0));
        let hdr = Rendition::hdr(content, ColorGamut::bt2020(), HdrTransfer::Hlg);
        let sdr = tone_map_headroom(&hdr, ToneMapParams::to_sdr(hdr.headroom));
        assert_eq!(sdr.content.extent(), (5, 3));
        assert_eq!(sdr.kind, RenditionKind::ToneMappedSdr);
        assert!(sdr.content.pixels().iter().all(|p| p.max_component() <= 1.0));
    }
}
