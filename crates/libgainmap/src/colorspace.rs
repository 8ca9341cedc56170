use derive_more::{Debug, Display};
use lcms2::{CIEXYZ, CIExyY, CIExyYTRIPLE, Locale, MLU, Profile, Tag, TagSignature, ToneCurve};
use log::{debug, trace, warn};

use crate::error::EncodeError;
use crate::transfer;

/// What an ICC profile tells us about an embedded color space.
#[derive(Debug, Clone)]
pub struct IccColorSpace {
    pub description: Option<String>,
    pub color_gamut: Option<ColorGamut>,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorGamut {
    primaries: ColorPrimaries,
    white_point: CIExyY,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorPrimaries {
    red: CIExyY,
    green: CIExyY,
    blue: CIExyY,
}

impl IccColorSpace {
    pub fn from_icc_profile_bytes(icc_profile_bytes: &[u8]) -> Option<Self> {
        let icc_profile = Profile::new_icc(icc_profile_bytes).ok()?;
        Some(Self::from_icc_profile(&icc_profile))
    }

    pub fn from_icc_profile(icc_profile: &Profile) -> Self {
        let description = read_mlu_tag(icc_profile, TagSignature::ProfileDescriptionTag);
        let color_gamut = ColorGamut::from_icc_profile(icc_profile);

        Self {
            description,
            color_gamut,
        }
    }
}

impl ColorGamut {
    const WHITE_POINT_D65: CIExyY = CIExyY { x: 0.3127, y: 0.3290, Y: 1.0000 };

    /// [sRGB](https://en.wikipedia.org/wiki/SRGB) color gamut, same color primaries and white point as the ITU-R Recommendation BT.709 or [Rec.709](https://en.wikipedia.org/wiki/Rec._709) standard.
    pub const fn srgb() -> Self {
        Self {
            primaries: ColorPrimaries {
                red: CIExyY { x: 0.6400, y: 0.3300, Y: 0.2126 },
                green: CIExyY { x: 0.3000, y: 0.6000, Y: 0.7152 },
                blue: CIExyY { x: 0.1500, y: 0.0600, Y: 0.0722 },
            },
            white_point: Self::WHITE_POINT_D65,
        }
    }

    /// Display P3: DCI-P3 primaries with a D65 white point.
    pub const fn display_p3() -> Self {
        Self {
            primaries: ColorPrimaries {
                red: CIExyY { x: 0.6800, y: 0.3200, Y: 0.2290 },
                green: CIExyY { x: 0.2650, y: 0.6900, Y: 0.6917 },
                blue: CIExyY { x: 0.1500, y: 0.0600, Y: 0.0793 },
            },
            white_point: Self::WHITE_POINT_D65,
        }
    }

    /// Color gamut defined by the ITU-R Recommendation BT.2020 or [Rec.2020](https://en.wikipedia.org/wiki/Rec._2020) standard.
    pub const fn bt2020() -> Self {
        Self {
            primaries: ColorPrimaries {
                red: CIExyY { x: 0.7080, y: 0.2920, Y: 0.2627 },
                green: CIExyY { x: 0.1700, y: 0.7970, Y: 0.6780 },
                blue: CIExyY { x: 0.1310, y: 0.0460, Y: 0.0593 },
            },
            white_point: Self::WHITE_POINT_D65,
        }
    }

    /// Adobe RGB (1998).
    pub const fn adobe_rgb() -> Self {
        Self {
            primaries: ColorPrimaries {
                red: CIExyY { x: 0.6400, y: 0.3300, Y: 0.2974 },
                green: CIExyY { x: 0.2100, y: 0.7100, Y: 0.6273 },
                blue: CIExyY { x: 0.1500, y: 0.0600, Y: 0.0753 },
            },
            white_point: Self::WHITE_POINT_D65,
        }
    }

    /// Maps CICP `ColourPrimaries` (ITU-T H.273) to a gamut.
    pub fn from_cicp_primaries(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::srgb()),
            9 => Some(Self::bt2020()),
            12 => Some(Self::display_p3()),
            _ => None,
        }
    }

    pub fn from_icc_profile(icc_profile: &Profile) -> Option<Self> {
        let from_d50 = match read_tag(icc_profile, TagSignature::ChromaticAdaptationTag) {
            Some(Tag::CIExyYTRIPLE(rows)) => {
                // Row-major 3x3 matrix to right-multiply to the row vector CIEXYZ.
                let to_d50 = [
                    [rows.Red.x, rows.Green.x, rows.Blue.x],
                    [rows.Red.y, rows.Green.y, rows.Blue.y],
                    [rows.Red.Y, rows.Green.Y, rows.Blue.Y],
                ];

                Some(invert_matrix(to_d50)?)
            },
            Some(tag) => {
                warn!("Expected CIExyYTRIPLE tag for Chromatic Adaptation, but got {:?}", tag);
                return None;
            },
            None => None,
        };

        let white_point = read_ciexyz_tag(icc_profile, TagSignature::MediaWhitePointTag)?;

        // Convert the white point from D50.
        let white_point = if let Some(from_d50) = &from_d50 {
            // Some non-D50 white point, in many cases D65.
            let result = transform_right(&[white_point.X, white_point.Y, white_point.Z], from_d50);
            CIEXYZ { X: result[0], Y: result[1], Z: result[2] }
        } else {
            white_point
        };

        let white_point = lcms2::XYZ2xyY(&white_point);

        // Single Chromaticity tag present ?
        if let Some(tag) = read_tag(icc_profile, TagSignature::ChromaticityTag) {
            return match tag {
                Tag::CIExyYTRIPLE(primaries) => Some(Self {
                    primaries: ColorPrimaries {
                        red: primaries.Red,
                        green: primaries.Green,
                        blue: primaries.Blue,
                    },
                    white_point,
                }),
                _ => None,
            };
        }

        // Otherwise, read the three primary colorant tags.
        let red = read_ciexyz_tag(icc_profile, TagSignature::RedColorantTag).map(|xyz| lcms2::XYZ2xyY(&xyz))?;
        let green = read_ciexyz_tag(icc_profile, TagSignature::GreenColorantTag).map(|xyz| lcms2::XYZ2xyY(&xyz))?;
        let blue = read_ciexyz_tag(icc_profile, TagSignature::BlueColorantTag).map(|xyz| lcms2::XYZ2xyY(&xyz))?;

        Some(Self {
            primaries: ColorPrimaries { red, green, blue },
            white_point,
        })
    }

    pub const fn primaries(&self) -> &ColorPrimaries {
        &self.primaries
    }

    /// The white point in CIExyY format but without Y.
    pub const fn white_point_xy(&self) -> [f64; 2] {
        [self.white_point.x, self.white_point.y]
    }

    /// Two gamuts are treated as the same when every chromaticity matches to 3 decimals.
    pub fn approx_eq(&self, other: &Self) -> bool {
        let a = self.chromaticities();
        let b = other.chromaticities();
        a.iter().zip(b.iter()).all(|(a, b)| (a - b).abs() < 1e-3)
    }

    fn chromaticities(&self) -> [f64; 8] {
        let p = &self.primaries;
        [
            p.red.x, p.red.y, p.green.x, p.green.y,
            p.blue.x, p.blue.y, self.white_point.x, self.white_point.y,
        ]
    }

    #[allow(non_snake_case)]
    fn rgb_to_unscaled_XYZ(&self) -> [[f64; 3]; 3] {
        fn xyY_to_XYZ(c: &CIExyY) -> [f64; 3] {
            [c.x * c.Y / c.y, c.Y, (1.0 - c.x - c.y) * c.Y / c.y]
        }

        let p = &self.primaries;
        [
            xyY_to_XYZ(&p.red),
            xyY_to_XYZ(&p.green),
            xyY_to_XYZ(&p.blue),
        ]
    }

    fn white_point_xyz(&self) -> [f64; 3] {
        let w = &self.white_point;
        [w.x * w.Y / w.y, w.Y, (1.0 - w.x - w.y) * w.Y / w.y]
    }

    fn lcms_primaries(&self) -> CIExyYTRIPLE {
        CIExyYTRIPLE {
            Red: self.primaries.red,
            Green: self.primaries.green,
            Blue: self.primaries.blue,
        }
    }
}

impl ColorPrimaries {
    /// The red primary in CIExyY format but without Y.
    pub fn red_xy(&self) -> [f64; 2] {
        [self.red.x, self.red.y]
    }
    /// The green primary in CIExyY format but without Y.
    pub fn green_xy(&self) -> [f64; 2] {
        [self.green.x, self.green.y]
    }
    /// The blue primary in CIExyY format but without Y.
    pub fn blue_xy(&self) -> [f64; 2] {
        [self.blue.x, self.blue.y]
    }
}

/// A precomputed linear RGB to linear RGB conversion between two gamuts.
///
/// The source primaries go to XYZ, get scaled so that source white lands on the
/// destination white point, and come back through the inverse destination matrix.
#[derive(Debug, Clone, Copy)]
pub struct GamutConversion {
    matrix: [[f64; 3]; 3],
}

impl GamutConversion {
    pub fn new(src: &ColorGamut, dst: &ColorGamut) -> Option<Self> {
        // https://physics.stackexchange.com/questions/487763/how-are-the-matrices-for-the-rgb-to-from-cie-xyz-conversions-generated
        let src_to_xyz = src.rgb_to_unscaled_XYZ();
        let scale = transform_right(&dst.white_point_xyz(), &invert_matrix(src_to_xyz)?);
        let scaled_src_to_xyz = [
            src_to_xyz[0].map(|v| v * scale[0]),
            src_to_xyz[1].map(|v| v * scale[1]),
            src_to_xyz[2].map(|v| v * scale[2]),
        ];

        let dst_to_xyz = {
            let unscaled = dst.rgb_to_unscaled_XYZ();
            let scale = transform_right(&dst.white_point_xyz(), &invert_matrix(unscaled)?);
            [
                unscaled[0].map(|v| v * scale[0]),
                unscaled[1].map(|v| v * scale[1]),
                unscaled[2].map(|v| v * scale[2]),
            ]
        };

        let matrix = multiply(&scaled_src_to_xyz, &invert_matrix(dst_to_xyz)?);
        Some(Self { matrix })
    }

    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let result = transform_right(&rgb.map(f64::from), &self.matrix);
        result.map(|v| v as f32)
    }
}

/// Transfer characteristic of a [`ColorSpaceId`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    #[display("sRGB")]
    Srgb,
    #[display("gamma 2.2")]
    Gamma22,
    #[display("PQ")]
    Pq,
    #[display("HLG")]
    Hlg,
}

impl Transfer {
    /// Encodes a linear value relative to SDR white. SDR curves clip at 1.
    pub fn encode(self, rgb: [f32; 3]) -> [f32; 3] {
        match self {
            Transfer::Srgb => rgb.map(|c| transfer::srgb_oetf(c.clamp(0.0, 1.0))),
            Transfer::Gamma22 => rgb.map(|c| c.clamp(0.0, 1.0).powf(1.0 / 2.2)),
            Transfer::Pq => rgb.map(|c| transfer::relative_to_pq_signal(c.max(0.0))),
            Transfer::Hlg => transfer::relative_to_hlg_signal(rgb),
        }
    }

    /// CICP `TransferCharacteristics` (ITU-T H.273).
    pub const fn cicp(self) -> u8 {
        match self {
            Transfer::Srgb => 13,
            Transfer::Gamma22 => 4,
            Transfer::Pq => 16,
            Transfer::Hlg => 18,
        }
    }

    fn tone_curve(self) -> Result<ToneCurve, EncodeError> {
        const TABLE_SIZE: usize = 1024;

        match self {
            Transfer::Srgb => ToneCurve::new_parametric(4, &[2.4, 1.0 / 1.055, 0.055 / 1.055, 1.0 / 12.92, 0.04045])
                .map_err(|e| EncodeError::Icc(e.to_string())),
            Transfer::Gamma22 => Ok(ToneCurve::new(2.2)),
            Transfer::Pq | Transfer::Hlg => {
                let table: Vec<u16> = (0..TABLE_SIZE)
                    .map(|i| {
                        let signal = i as f32 / (TABLE_SIZE - 1) as f32;
                        let linear = match self {
                            Transfer::Pq => transfer::st2084_eotf(signal),
                            _ => transfer::hlg_inverse_oetf(signal),
                        };
                        (linear.clamp(0.0, 1.0) * 65535.0).round() as u16
                    })
                    .collect();
                Ok(ToneCurve::new_tabulated(&table))
            },
        }
    }
}

/// Working color spaces a conversion can tag its output with.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpaceId {
    #[display("ITU-R BT.709")]
    Bt709,
    #[display("ITU-R BT.709 PQ")]
    Bt709Pq,
    #[display("ITU-R BT.709 HLG")]
    Bt709Hlg,
    #[display("Display P3")]
    DisplayP3,
    #[display("Display P3 PQ")]
    DisplayP3Pq,
    #[display("Display P3 HLG")]
    DisplayP3Hlg,
    #[display("ITU-R BT.2020 sRGB gamma")]
    Bt2020Srgb,
    #[display("ITU-R BT.2100 PQ")]
    Bt2100Pq,
    #[display("ITU-R BT.2100 HLG")]
    Bt2100Hlg,
    #[display("Adobe RGB (1998)")]
    AdobeRgb1998,
}

impl ColorSpaceId {
    pub fn gamut(self) -> ColorGamut {
        match self {
            Self::Bt709 | Self::Bt709Pq | Self::Bt709Hlg => ColorGamut::srgb(),
            Self::DisplayP3 | Self::DisplayP3Pq | Self::DisplayP3Hlg => ColorGamut::display_p3(),
            Self::Bt2020Srgb | Self::Bt2100Pq | Self::Bt2100Hlg => ColorGamut::bt2020(),
            Self::AdobeRgb1998 => ColorGamut::adobe_rgb(),
        }
    }

    pub fn transfer(self) -> Transfer {
        match self {
            Self::Bt709 | Self::DisplayP3 | Self::Bt2020Srgb => Transfer::Srgb,
            Self::Bt709Pq | Self::DisplayP3Pq | Self::Bt2100Pq => Transfer::Pq,
            Self::Bt709Hlg | Self::DisplayP3Hlg | Self::Bt2100Hlg => Transfer::Hlg,
            Self::AdobeRgb1998 => Transfer::Gamma22,
        }
    }

    /// CICP code points `[primaries, transfer, matrix, full range]`, as stored in a PNG `cICP` chunk.
    /// Adobe RGB has no CICP primaries.
    pub fn cicp(self) -> Option<[u8; 4]> {
        let primaries = match self.gamut() {
            g if g.approx_eq(&ColorGamut::srgb()) => 1,
            g if g.approx_eq(&ColorGamut::bt2020()) => 9,
            g if g.approx_eq(&ColorGamut::display_p3()) => 12,
            _ => return None,
        };
        Some([primaries, self.transfer().cicp(), 0, 1])
    }

    /// The color space a pair of CICP primaries and transfer code points names, if it is one of ours.
    pub fn from_cicp(primaries: u8, transfer: u8) -> Option<Self> {
        let id = match (primaries, transfer) {
            (1, 13) => Self::Bt709,
            (1, 16) => Self::Bt709Pq,
            (1, 18) => Self::Bt709Hlg,
            (12, 13) => Self::DisplayP3,
            (12, 16) => Self::DisplayP3Pq,
            (12, 18) => Self::DisplayP3Hlg,
            (9, 13) => Self::Bt2020Srgb,
            (9, 16) => Self::Bt2100Pq,
            (9, 18) => Self::Bt2100Hlg,
            _ => return None,
        };
        Some(id)
    }

    /// Serializes an ICC v4 profile describing this color space.
    pub fn icc_profile_bytes(self) -> Result<Vec<u8>, EncodeError> {
        let gamut = self.gamut();
        let curve = self.transfer().tone_curve()?;

        let mut profile = Profile::new_rgb(&gamut.white_point, &gamut.lcms_primaries(), &[&curve, &curve, &curve])
            .map_err(|e| EncodeError::Icc(e.to_string()))?;

        let mut description = MLU::new(1);
        description.set_text_ascii(&self.to_string(), Locale::none());
        profile.write_tag(TagSignature::ProfileDescriptionTag, Tag::MLU(&description));

        profile.icc().map_err(|e| EncodeError::Icc(e.to_string()))
    }
}

/// The user's explicit color-space choice, if any.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceOverride {
    #[display("sRGB")]
    Srgb,
    #[display("Display P3")]
    DisplayP3,
    #[display("Rec. 2020")]
    Rec2020,
    #[default]
    #[display("unspecified")]
    Unspecified,
}

impl ColorSpaceOverride {
    /// Parses one of the accepted aliases. Matching is case-sensitive.
    /// Unknown aliases are not an error: they leave the choice to the embedded color space.
    pub fn from_alias(alias: &str) -> Self {
        match alias {
            "srgb" | "709" | "rec709" | "rec.709" | "bt709" | "bt,709" | "itu709" | "sRGB" => Self::Srgb,
            "p3" | "dcip3" | "dci-p3" | "dci.p3" | "displayp3" | "P3" => Self::DisplayP3,
            "rec2020" | "2020" | "rec.2020" | "bt2020" | "itu2020" | "2100" | "rec2100" | "rec.2100" | "Rec. 2020" => Self::Rec2020,
            "" => Self::Unspecified,
            _ => {
                warn!("Unknown color space \"{}\", expected one of srgb, p3, rec2020; using the embedded color space", alias);
                Self::Unspecified
            },
        }
    }

    fn triad(self) -> Option<ResolvedColorSpaces> {
        match self {
            Self::Srgb => Some(ResolvedColorSpaces::BT709),
            Self::DisplayP3 => Some(ResolvedColorSpaces::DISPLAY_P3),
            Self::Rec2020 => Some(ResolvedColorSpaces::BT2020),
            Self::Unspecified => None,
        }
    }
}

/// The SDR, PQ and HLG color spaces one conversion works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColorSpaces {
    pub sdr: ColorSpaceId,
    pub hdr_pq: ColorSpaceId,
    pub hdr_hlg: ColorSpaceId,
}

impl ResolvedColorSpaces {
    pub const BT709: Self = Self {
        sdr: ColorSpaceId::Bt709,
        hdr_pq: ColorSpaceId::Bt709Pq,
        hdr_hlg: ColorSpaceId::Bt709Hlg,
    };
    pub const DISPLAY_P3: Self = Self {
        sdr: ColorSpaceId::DisplayP3,
        hdr_pq: ColorSpaceId::DisplayP3Pq,
        hdr_hlg: ColorSpaceId::DisplayP3Hlg,
    };
    pub const BT2020: Self = Self {
        sdr: ColorSpaceId::Bt2020Srgb,
        hdr_pq: ColorSpaceId::Bt2100Pq,
        hdr_hlg: ColorSpaceId::Bt2100Hlg,
    };
    pub const ADOBE_RGB: Self = Self {
        sdr: ColorSpaceId::AdobeRgb1998,
        hdr_pq: ColorSpaceId::AdobeRgb1998,
        hdr_hlg: ColorSpaceId::AdobeRgb1998,
    };

    /// Gamut shared by the three members; pixels are converted into it once per conversion.
    pub fn working_gamut(&self) -> ColorGamut {
        self.sdr.gamut()
    }
}

/// Picks the working color spaces for a source.
///
/// An explicit override wins. Otherwise the embedded name is checked for
/// `709`, `sRGB`, `2100`, `2020` and `Adobe RGB` in that order, later matches
/// replacing earlier ones. Anything else falls back to Display P3.
pub fn resolve(embedded_name: Option<&str>, color_space_override: ColorSpaceOverride) -> ResolvedColorSpaces {
    if let Some(triad) = color_space_override.triad() {
        trace!("Color space override {} selects {}", color_space_override, triad.sdr);
        return triad;
    }

    const SUBSTRING_RULES: [(&str, ResolvedColorSpaces); 5] = [
        ("709", ResolvedColorSpaces::BT709),
        ("sRGB", ResolvedColorSpaces::BT709),
        ("2100", ResolvedColorSpaces::BT2020),
        ("2020", ResolvedColorSpaces::BT2020),
        ("Adobe RGB", ResolvedColorSpaces::ADOBE_RGB),
    ];

    let mut resolved = None;
    if let Some(name) = embedded_name {
        for (needle, triad) in SUBSTRING_RULES {
            if name.contains(needle) {
                resolved = Some(triad);
            }
        }
    }

    match resolved {
        Some(triad) => {
            trace!("Embedded color space {:?} selects {}", embedded_name, triad.sdr);
            triad
        },
        None => {
            debug!("Embedded color space {:?} not recognized, falling back to Display P3", embedded_name);
            ResolvedColorSpaces::DISPLAY_P3
        },
    }
}

fn read_mlu_tag(icc_profile: &Profile, sig: TagSignature) -> Option<String> {
    match read_tag(icc_profile, sig)? {
        Tag::MLU(mlu) => {
            let locale = *mlu.tanslations().first()?;
            mlu.text(locale).ok()
        },
        _ => None,
    }
}

fn read_ciexyz_tag(icc_profile: &Profile, sig: TagSignature) -> Option<CIEXYZ> {
    match read_tag(icc_profile, sig)? {
        Tag::CIEXYZ(xyz) => Some(*xyz),
        _ => None,
    }
}

fn read_tag(icc_profile: &Profile, sig: TagSignature) -> Option<Tag<'_>> {
    if icc_profile.has_tag(sig) {
        return Some(icc_profile.read_tag(sig));
    }
    None
}

/// Transform a row vector by right-multiplying a row-major 3x3 matrix.
fn transform_right(row_vector: &[f64; 3], matrix: &[[f64; 3]; 3]) -> [f64; 3] {
    let mut result = [0.0; 3];
    for i in 0..3 {
        result[i] = row_vector[0] * matrix[0][i] +
                    row_vector[1] * matrix[1][i] +
                    row_vector[2] * matrix[2][i];
    }
    result
}

/// Multiply a 3x3 matrix by another from the right.
fn multiply(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut result = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            result[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    result
}

fn invert_matrix(matrix: [[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det =
          matrix[0][0] * (matrix[1][1] * matrix[2][2] - matrix[1][2] * matrix[2][1])
        - matrix[0][1] * (matrix[1][0] * matrix[2][2] - matrix[1][2] * matrix[2][0])
        + matrix[0][2] * (matrix[1][0] * matrix[2][1] - matrix[1][1] * matrix[2][0]);

    if det.abs() < 1e-10 {
        return None;
    }

    let inv_det = 1.0 / det;

    let inverse = [
        [
            (matrix[1][1] * matrix[2][2] - matrix[1][2] * matrix[2][1]) * inv_det,
            (matrix[0][2] * matrix[2][1] - matrix[0][1] * matrix[2][2]) * inv_det,
            (matrix[0][1] * matrix[1][2] - matrix[0][2] * matrix[1][1]) * inv_det,
        ],
        [
            (matrix[1][2] * matrix[2][0] - matrix[1][0] * matrix[2][2]) * inv_det,
            (matrix[0][0] * matrix[2][2] - matrix[0][2] * matrix[2][0]) * inv_det,
            (matrix[0][2] * matrix[1][0] - matrix[0][0] * matrix[1][2]) * inv_det,
        ],
        [
            (matrix[1][0] * matrix[2][1] - matrix[1][1] * matrix[2][0]) * inv_det,
            (matrix[0][1] * matrix[2][0] - matrix[0][0] * matrix[2][1]) * inv_det,
            (matrix[0][0] * matrix[1][1] - matrix[0][1] * matrix[1][0]) * inv_det,
        ],
    ];

    Some(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_embedded_name() {
        let resolved = resolve(Some("ITU-R BT.2100 PQ"), ColorSpaceOverride::from_alias("srgb"));
        assert_eq!(resolved, ResolvedColorSpaces::BT709);
    }

    #[test]
    fn later_substring_matches_take_precedence() {
        // Both "709" and "2020" appear; the 2020 rule is checked later and wins.
        let resolved = resolve(Some("BT.709 / BT.2020 hybrid"), ColorSpaceOverride::Unspecified);
        assert_eq!(resolved, ResolvedColorSpaces::BT2020);

        let resolved = resolve(Some("sRGB IEC61966-2.1"), ColorSpaceOverride::Unspecified);
        assert_eq!(resolved, ResolvedColorSpaces::BT709);

        let resolved = resolve(Some("Adobe RGB (1998)"), ColorSpaceOverride::Unspecified);
        assert_eq!(resolved, ResolvedColorSpaces::ADOBE_RGB);
    }

    #[test]
    fn unknown_or_missing_names_fall_back_to_display_p3() {
        assert_eq!(resolve(None, ColorSpaceOverride::Unspecified), ResolvedColorSpaces::DISPLAY_P3);
        assert_eq!(resolve(Some("ProPhoto"), ColorSpaceOverride::Unspecified), ResolvedColorSpaces::DISPLAY_P3);
    }

    #[test]
    fn aliases_are_case_sensitive() {
        assert_eq!(ColorSpaceOverride::from_alias("Rec. 2020"), ColorSpaceOverride::Rec2020);
        assert_eq!(ColorSpaceOverride::from_alias("P3"), ColorSpaceOverride::DisplayP3);
        assert_eq!(ColorSpaceOverride::from_alias("SRGB"), ColorSpaceOverride::Unspecified);
        assert_eq!(ColorSpaceOverride::from_alias("Display P3"), ColorSpaceOverride::Unspecified);
    }

    #[test]
    fn gamut_conversion_keeps_white_and_is_invertible() {
        let to_p3 = GamutConversion::new(&ColorGamut::bt2020(), &ColorGamut::display_p3()).unwrap();
        let back = GamutConversion::new(&ColorGamut::display_p3(), &ColorGamut::bt2020()).unwrap();

        let white = to_p3.apply([1.0, 1.0, 1.0]);
        for c in white {
            assert!((c - 1.0).abs() < 1e-4, "{white:?}");
        }

        let color = [0.2, 0.5, 0.9];
        let round_trip = back.apply(to_p3.apply(color));
        for (a, b) in color.iter().zip(round_trip) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn cicp_code_points() {
        assert_eq!(ColorSpaceId::Bt2100Pq.cicp(), Some([9, 16, 0, 1]));
        assert_eq!(ColorSpaceId::DisplayP3Hlg.cicp(), Some([12, 18, 0, 1]));
        assert_eq!(ColorSpaceId::Bt709.cicp(), Some([1, 13, 0, 1]));
        assert_eq!(ColorSpaceId::AdobeRgb1998.cicp(), None);

        for id in [ColorSpaceId::Bt709Hlg, ColorSpaceId::DisplayP3, ColorSpaceId::Bt2100Pq] {
            let [primaries, transfer, _, _] = id.cicp().unwrap();
            assert_eq!(ColorSpaceId::from_cicp(primaries, transfer), Some(id));
        }
        assert_eq!(ColorSpaceId::from_cicp(5, 16), None);
    }

    #[test]
    fn generated_icc_profile_round_trips_through_lcms() {
        let bytes = ColorSpaceId::DisplayP3.icc_profile_bytes().unwrap();
        let parsed = IccColorSpace::from_icc_profile_bytes(&bytes).unwrap();
        assert_eq!(parsed.description.as_deref(), Some("Display P3"));
        let gamut = parsed.color_gamut.unwrap();
        let expected = ColorGamut::display_p3();
        let pairs = [
            (gamut.primaries().red_xy(), expected.primaries().red_xy()),
            (gamut.primaries().green_xy(), expected.primaries().green_xy()),
            (gamut.primaries().blue_xy(), expected.primaries().blue_xy()),
        ];
        for (actual, expected) in pairs {
            assert!((actual[0] - expected[0]).abs() < 1e-3 && (actual[1] - expected[1]).abs() < 1e-3, "{gamut:?}");
        }
    }
}
