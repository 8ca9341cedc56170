//! The image primitives a conversion calls out to, and how their context is shared between jobs.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use derive_more::Display;

use crate::colorspace::{ColorSpaceId, ResolvedColorSpaces};
use crate::error::{ConvertError, EncodeError};
use crate::gainmap::GainMap;
use crate::pixel::{FloatImageContent, FloatPixel};
use crate::reduce::{self, MinMaxGrid};
use crate::rendition::Rendition;
use crate::request::{BitDepth, OutputFormat};
use crate::tonemap::{self, ToneMapParams};

/// A decoded HDR source.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Linear light in the source's own gamut.
    pub rendition: Rendition,
    /// Name of the embedded color space, if the source carries one.
    pub color_space_name: Option<String>,
}

/// Everything an encoder needs to write one output file.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub format: OutputFormat,
    /// The primary image, linear light in the gamut of `color_space`.
    pub primary: Rendition,
    /// Transfer and primaries the primary image is tagged with.
    pub color_space: ColorSpaceId,
    pub resolved: ResolvedColorSpaces,
    pub depth: BitDepth,
    /// Normalized to `(0, 1]`.
    pub quality: f64,
    pub gain_map: Option<GainMap>,
}

/// Outbound capability used by [`crate::convert`].
///
/// Tone mapping and reductions have portable default implementations; decoding,
/// the 8-bit proxy round trip and container encoding are up to the implementor.
pub trait ImageServices: Send + Sync {
    fn decode_hdr(&self, path: &Path) -> Result<DecodedImage, ConvertError>;

    fn tone_map_headroom(&self, rendition: &Rendition, params: ToneMapParams) -> Rendition {
        tonemap::tone_map_headroom(rendition, params)
    }

    fn area_min_max(&self, content: &FloatImageContent, window: usize) -> MinMaxGrid {
        reduce::area_min_max(content, window)
    }

    fn area_maximum(&self, content: &FloatImageContent) -> FloatPixel {
        reduce::area_maximum(content)
    }

    /// Encodes `rendition` into an 8-bit standard-range container in memory and decodes it back.
    fn round_trip_sdr8(&self, rendition: &Rendition) -> Result<Rendition, EncodeError>;

    /// Writes exactly one file at `destination`, or nothing on failure.
    fn encode(&self, job: &EncodeJob, destination: &Path) -> Result<(), ConvertError>;
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPolicy {
    /// One services object is built lazily and shared by every job.
    #[default]
    #[display("shared")]
    Shared,
    /// Every job gets a freshly built services object.
    #[display("per-job")]
    PerJob,
}

type ServicesFactory = dyn Fn() -> Arc<dyn ImageServices> + Send + Sync;

/// Hands out the services object for each conversion according to a [`ContextPolicy`].
pub struct ContextProvider {
    policy: ContextPolicy,
    factory: Box<ServicesFactory>,
    shared: OnceLock<Arc<dyn ImageServices>>,
}

impl ContextProvider {
    pub fn new<F>(policy: ContextPolicy, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn ImageServices> + Send + Sync + 'static,
    {
        Self {
            policy,
            factory: Box::new(factory),
            shared: OnceLock::new(),
        }
    }

    pub fn policy(&self) -> ContextPolicy {
        self.policy
    }

    pub fn get(&self) -> Arc<dyn ImageServices> {
        match self.policy {
            ContextPolicy::Shared => Arc::clone(self.shared.get_or_init(|| (self.factory)())),
            ContextPolicy::PerJob => (self.factory)(),
        }
    }
}

impl std::fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextProvider")
            .field("policy", &self.policy)
            .field("initialized", &self.shared.get().is_some())
            .finish()
    }
}
