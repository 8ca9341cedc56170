use derive_more::Display;

use crate::colorspace::ColorGamut;
use crate::gainmap::GainMapStyle;
use crate::pixel::FloatImageContent;
use crate::transfer::{HLG_PEAK_NITS, PQ_PEAK_NITS, SDR_WHITE_NITS};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum HdrTransfer {
    #[display("PQ")]
    Pq,
    #[display("HLG")]
    Hlg,
}

impl HdrTransfer {
    /// Largest linear value the transfer can encode, relative to SDR white.
    pub fn headroom(self) -> f32 {
        match self {
            HdrTransfer::Pq => PQ_PEAK_NITS / SDR_WHITE_NITS,
            HdrTransfer::Hlg => HLG_PEAK_NITS / SDR_WHITE_NITS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenditionKind {
    Hdr(HdrTransfer),
    ToneMappedSdr,
    GainMap(GainMapStyle),
}

/// One linear-light version of the picture.
///
/// Pixel values are relative to SDR reference white, and `headroom` is the
/// largest value this rendition is allowed to hold.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub content: FloatImageContent,
    pub gamut: ColorGamut,
    pub kind: RenditionKind,
    pub headroom: f32,
}

impl Rendition {
    pub fn hdr(content: FloatImageContent, gamut: ColorGamut, transfer: HdrTransfer) -> Self {
        Self {
            content,
            gamut,
            kind: RenditionKind::Hdr(transfer),
            headroom: transfer.headroom(),
        }
    }

    pub fn sdr(content: FloatImageContent, gamut: ColorGamut) -> Self {
        Self {
            content,
            gamut,
            kind: RenditionKind::ToneMappedSdr,
            headroom: 1.0,
        }
    }

    pub fn width(&self) -> usize {
        self.content.width()
    }

    pub fn height(&self) -> usize {
        self.content.height()
    }

    pub fn hdr_transfer(&self) -> Option<HdrTransfer> {
        match self.kind {
            RenditionKind::Hdr(transfer) => Some(transfer),
            _ => None,
        }
    }
}
