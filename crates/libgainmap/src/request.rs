use std::path::{Path, PathBuf};

use derive_more::Display;

use crate::colorspace::ColorSpaceOverride;
use crate::error::{ConvertError, ValidationError};

pub use crate::gainmap::GainMapStyle;

/// Output quality in `(0, 1]`.
#[derive(Debug, Display, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quality(f64);

impl Quality {
    /// Values above 1 are read as percentages, so `95` and `0.95` are the same quality.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        let normalized = if value > 1.0 { value / 100.0 } else { value };
        if normalized > 0.0 && normalized <= 1.0 {
            Ok(Self(normalized))
        } else {
            Err(ValidationError::Quality(normalized))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }

    fn default_for(mode: ExportMode) -> Self {
        match mode {
            ExportMode::SdrOnly => Self(0.90),
            _ => Self(0.85),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitDepth {
    #[default]
    #[display("8")]
    Eight,
    #[display("10")]
    Ten,
    #[display("16")]
    Sixteen,
}

impl BitDepth {
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Ten => 10,
            BitDepth::Sixteen => 16,
        }
    }
}

impl TryFrom<u32> for BitDepth {
    type Error = ValidationError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(BitDepth::Eight),
            10 => Ok(BitDepth::Ten),
            16 => Ok(BitDepth::Sixteen),
            _ => Err(ValidationError::BitDepth(bits)),
        }
    }
}

/// What a conversion writes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Tone-mapped SDR with an embedded gain map.
    #[default]
    #[display("SDR with gain map")]
    Default,
    #[display("SDR only")]
    SdrOnly,
    #[display("PQ only")]
    PqOnly,
    #[display("HLG only")]
    HlgOnly,
}

impl ExportMode {
    /// Folds the three independent export switches into one mode. At most one may be set.
    pub fn from_flags(sdr: bool, pq: bool, hlg: bool) -> Result<Self, ValidationError> {
        match (sdr, pq, hlg) {
            (false, false, false) => Ok(ExportMode::Default),
            (true, false, false) => Ok(ExportMode::SdrOnly),
            (false, true, false) => Ok(ExportMode::PqOnly),
            (false, false, true) => Ok(ExportMode::HlgOnly),
            _ => Err(ValidationError::ConflictingExportModes),
        }
    }

    pub fn is_hdr(self) -> bool {
        matches!(self, ExportMode::PqOnly | ExportMode::HlgOnly)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    #[display("HEIF")]
    Heif,
    #[display("JPEG")]
    Jpeg,
    #[display("PNG")]
    Png,
    #[display("TIFF")]
    Tiff,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Heif => "HEIC",
            OutputFormat::Jpeg => "JPG",
            OutputFormat::Png => "PNG",
            OutputFormat::Tiff => "TIFF",
        }
    }
}

/// One file's worth of conversion settings. Built and validated by [`ConversionRequestBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    source_path: PathBuf,
    destination_directory: PathBuf,
    quality: Option<Quality>,
    color_space_override: ColorSpaceOverride,
    bit_depth: BitDepth,
    export_mode: ExportMode,
    gain_map_style: GainMapStyle,
    output_format: OutputFormat,
}

impl ConversionRequest {
    pub fn builder(source_path: impl Into<PathBuf>, destination_directory: impl Into<PathBuf>) -> ConversionRequestBuilder {
        ConversionRequestBuilder::new(source_path, destination_directory)
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn destination_directory(&self) -> &Path {
        &self.destination_directory
    }

    /// The requested quality, or the default of the export mode.
    pub fn quality(&self) -> Quality {
        self.quality.unwrap_or_else(|| Quality::default_for(self.export_mode))
    }

    pub fn color_space_override(&self) -> ColorSpaceOverride {
        self.color_space_override
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn export_mode(&self) -> ExportMode {
        self.export_mode
    }

    pub fn gain_map_style(&self) -> GainMapStyle {
        self.gain_map_style
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Same settings for another source file.
    pub fn with_source(&self, source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            ..self.clone()
        }
    }

    /// `<destination>/<source stem>.<EXT>`.
    pub fn destination_path(&self) -> PathBuf {
        let stem = self.source_path.file_stem().unwrap_or(self.source_path.as_os_str());
        let mut file_name = stem.to_os_string();
        file_name.push(".");
        file_name.push(self.output_format.extension());
        self.destination_directory.join(file_name)
    }
}

/// Raw settings as a host collects them.
#[derive(Debug, Clone)]
pub struct ConversionRequestBuilder {
    source_path: PathBuf,
    destination_directory: PathBuf,
    quality: Option<f64>,
    color_space: String,
    bit_depth: u32,
    sdr: bool,
    pq: bool,
    hlg: bool,
    gain_map_style: GainMapStyle,
    output_format: OutputFormat,
}

impl ConversionRequestBuilder {
    pub fn new(source_path: impl Into<PathBuf>, destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_directory: destination_directory.into(),
            quality: None,
            color_space: String::new(),
            bit_depth: 8,
            sdr: false,
            pq: false,
            hlg: false,
            gain_map_style: GainMapStyle::default(),
            output_format: OutputFormat::default(),
        }
    }

    pub fn quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Color-space alias such as `p3` or `rec2020`. Empty keeps the embedded color space.
    pub fn color_space(mut self, alias: impl Into<String>) -> Self {
        self.color_space = alias.into();
        self
    }

    pub fn bit_depth(mut self, bits: u32) -> Self {
        self.bit_depth = bits;
        self
    }

    pub fn sdr(mut self, enabled: bool) -> Self {
        self.sdr = enabled;
        self
    }

    pub fn pq(mut self, enabled: bool) -> Self {
        self.pq = enabled;
        self
    }

    pub fn hlg(mut self, enabled: bool) -> Self {
        self.hlg = enabled;
        self
    }

    pub fn gain_map_style(mut self, style: GainMapStyle) -> Self {
        self.gain_map_style = style;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn build(self) -> Result<ConversionRequest, ConvertError> {
        let export_mode = ExportMode::from_flags(self.sdr, self.pq, self.hlg)?;
        let bit_depth = BitDepth::try_from(self.bit_depth)?;
        let quality = self.quality.map(Quality::new).transpose()?;

        Ok(ConversionRequest {
            source_path: self.source_path,
            destination_directory: self.destination_directory,
            quality,
            color_space_override: ColorSpaceOverride::from_alias(&self.color_space),
            bit_depth,
            export_mode,
            gain_map_style: self.gain_map_style,
            output_format: self.output_format,
        })
    }
}
