//! One source file in, one output file out.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::colorspace::{self, ColorGamut, GamutConversion};
use crate::error::ConvertError;
use crate::gainmap::{self, GainMap, GainMapStyle};
use crate::headroom;
use crate::native::NativeServices;
use crate::pixel::FloatPixel;
use crate::rendition::Rendition;
use crate::request::{ConversionRequest, ExportMode};
use crate::services::{ContextPolicy, ContextProvider, EncodeJob, ImageServices};
use crate::tonemap::ToneMapParams;
use crate::writer::EncodePlan;

/// Re-expresses `rendition` in `gamut`. Pixels outside the target gamut are kept, not clipped.
fn into_gamut(rendition: Rendition, gamut: &ColorGamut) -> Rendition {
    if rendition.gamut.approx_eq(gamut) {
        return rendition;
    }
    let Some(conversion) = GamutConversion::new(&rendition.gamut, gamut) else {
        warn!("Gamut conversion matrix is singular, keeping the source gamut");
        return rendition;
    };

    Rendition {
        content: rendition.content.map(|p| FloatPixel::from(conversion.apply(p.rgb())).with_alpha(p.a())),
        gamut: *gamut,
        ..rendition
    }
}

/// Converts the file `request` names and returns the path of the written output.
///
/// Exactly one file exists at the returned path on success; nothing is written on failure.
pub fn convert(request: &ConversionRequest, services: &dyn ImageServices) -> Result<PathBuf, ConvertError> {
    let result = convert_inner(request, services);
    match &result {
        Ok(destination) => info!("{} -> {}", request.source_path().display(), destination.display()),
        Err(e) => warn!("{}: {}", request.source_path().display(), e),
    }
    result
}

fn convert_inner(request: &ConversionRequest, services: &dyn ImageServices) -> Result<PathBuf, ConvertError> {
    let source = request.source_path();
    let plan = EncodePlan::new(request)?;
    debug!("{}: {} {} at {} bits, quality {}", source.display(), plan.format, plan.mode, plan.depth, plan.quality);

    let decoded = services.decode_hdr(source)?;
    let resolved = colorspace::resolve(decoded.color_space_name.as_deref(), request.color_space_override());
    debug!("Resolved color spaces: SDR {}, PQ {}, HLG {}", resolved.sdr, resolved.hdr_pq, resolved.hdr_hlg);

    let hdr = into_gamut(decoded.rendition, &resolved.working_gamut());
    let sdr = services.tone_map_headroom(&hdr, ToneMapParams::to_sdr(hdr.headroom));
    trace!("Tone mapped {}x{} from headroom {}", sdr.width(), sdr.height(), hdr.headroom);

    let gain_map = if plan.carries_gain_map() {
        let gain_map = match request.gain_map_style() {
            GainMapStyle::Rgb => {
                let headroom_max = headroom::measure_headroom(services, &hdr);
                let rendition = gainmap::compute_rgb_gain_map(&hdr, &sdr, headroom_max)
                    .map_err(|e| ConvertError::decode(source, e))?;
                GainMap::rgb(rendition, headroom_max)
            },
            GainMapStyle::Mono => {
                let rendition = gainmap::compute_mono_gain_map(services, &hdr)
                    .map_err(|e| ConvertError::gain_map(source, e))?;
                GainMap::mono(rendition)
            },
        };
        debug!(
            "{} gain map, headroom {} stops (field33 {}, field48 {})",
            gain_map.style,
            gain_map.headroom.stops(),
            gain_map.headroom.field33(),
            gain_map.headroom.field48(),
        );
        Some(gain_map)
    } else {
        None
    };

    let primary = match plan.mode {
        ExportMode::Default | ExportMode::SdrOnly => sdr,
        ExportMode::PqOnly | ExportMode::HlgOnly => hdr,
    };

    let job = EncodeJob {
        format: plan.format,
        primary,
        color_space: plan.primary_color_space(&resolved),
        resolved,
        depth: plan.depth,
        quality: plan.quality,
        gain_map,
    };
    let destination = request.destination_path();
    services.encode(&job, &destination)?;

    Ok(destination)
}

/// Runs conversions with services handed out by a [`ContextProvider`].
#[derive(Debug)]
pub struct Converter {
    provider: ContextProvider,
}

impl Converter {
    pub fn new(provider: ContextProvider) -> Self {
        Self { provider }
    }

    /// A converter backed by [`NativeServices`].
    pub fn native(policy: ContextPolicy) -> Self {
        Self::new(ContextProvider::new(policy, || Arc::new(NativeServices::new()) as Arc<dyn ImageServices>))
    }

    pub fn provider(&self) -> &ContextProvider {
        &self.provider
    }

    pub fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConvertError> {
        let services = self.provider.get();
        convert(request, services.as_ref())
    }
}
