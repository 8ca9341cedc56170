use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::request::{ExportMode, OutputFormat};

/// Result of a single conversion attempt.
pub type Result<T, E = ConvertError> = std::result::Result<T, E>;

/// Every way a conversion can fail.
///
/// Errors are contained to the file they belong to: a batch keeps going past
/// `Decode` and `Encode` failures and reports them at the end.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The request itself is unusable; nothing was decoded or written.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("failed to encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },

    /// The conversion panicked; a batch records it and moves on.
    #[error("conversion of {} panicked: {message}", .path.display())]
    Panicked {
        path: PathBuf,
        message: String,
    },
}

impl ConvertError {
    pub fn decode(path: &Path, source: impl Into<DecodeError>) -> Self {
        Self::Decode { path: path.to_path_buf(), source: source.into() }
    }

    pub fn encode(path: &Path, source: impl Into<EncodeError>) -> Self {
        Self::Encode { path: path.to_path_buf(), source: source.into() }
    }

    pub fn gain_map(path: &Path, source: GainMapError) -> Self {
        match source {
            GainMapError::Input(e) => Self::decode(path, e),
            GainMapError::RoundTrip(e) => Self::encode(path, e),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("only one of SDR, PQ and HLG export can be requested")]
    ConflictingExportModes,

    #[error("unsupported bit depth {0}, expected 8, 10 or 16")]
    BitDepth(u32),

    #[error("quality {0} is outside (0, 1] after normalization")]
    Quality(f64),

    #[error("{format} output cannot carry {mode} at {requested} bits")]
    IncompatibleBitDepth {
        format: OutputFormat,
        mode: ExportMode,
        requested: u32,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("PNG decoding failed: {0}")]
    Png(#[from] png::DecodingError),

    #[error("source is not PQ or HLG encoded")]
    NotHdr,

    #[error("unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    #[error("decoded image is empty")]
    EmptyImage,

    #[error("rendition sizes differ: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// Failure while computing a gain map, before any path is attached.
#[derive(Debug, Error)]
pub enum GainMapError {
    #[error(transparent)]
    Input(#[from] DecodeError),

    #[error("8-bit proxy round trip failed: {0}")]
    RoundTrip(#[from] EncodeError),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),

    #[error("TIFF encoding failed: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),

    #[error("failed to build ICC profile: {0}")]
    Icc(String),

    #[error("HEIF encoding failed: {0}")]
    Heif(String),

    #[error("unsupported output: {0}")]
    Unsupported(&'static str),
}
