//! Converts PQ or HLG HDR images into tone-mapped SDR images carrying a gain map,
//! or into single-rendition SDR / PQ / HLG files, one at a time or in bounded batches.

pub mod batch;
pub mod colorspace;
pub mod convert;
pub mod error;
pub mod gainmap;
pub mod headroom;
pub mod ifd;
pub mod makernote;
pub mod mpf;
pub mod native;
#[cfg(feature = "heif")]
mod outheif;
pub mod outjpeg;
pub mod outpng;
pub mod outtiff;
pub mod pixel;
pub mod reduce;
pub mod rendition;
pub mod request;
pub mod services;
pub mod tonemap;
pub mod transfer;
pub mod writer;
pub mod xmp;

pub use batch::{BatchConfig, BatchReport, CancellationToken, run_batch};
pub use colorspace::{ColorSpaceId, ColorSpaceOverride, ResolvedColorSpaces};
pub use convert::{Converter, convert};
pub use error::{ConvertError, DecodeError, EncodeError, ValidationError};
pub use gainmap::GainMapStyle;
pub use native::NativeServices;
pub use request::{BitDepth, ConversionRequest, ExportMode, OutputFormat, Quality};
pub use services::{ContextPolicy, ContextProvider, ImageServices};
