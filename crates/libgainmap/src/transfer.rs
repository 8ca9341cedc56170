//! Transfer functions used to move between encoded signals and linear light.
//!
//! Linear values inside this crate are relative to SDR reference white:
//! `1.0` is [`SDR_WHITE_NITS`], so an HDR pixel at `4.0` is two stops above it.

/// SDR reference white in cd/m², per ITU-R BT.2408.
pub const SDR_WHITE_NITS: f32 = 203.0;

/// Peak luminance of the PQ signal range.
pub const PQ_PEAK_NITS: f32 = 10000.0;

/// Nominal peak of an HLG reference display.
pub const HLG_PEAK_NITS: f32 = 1000.0;

const PQ_M1: f32 = 2610.0 / 16384.0;
const PQ_M2: f32 = 2523.0 / 4096.0 * 128.0;
const PQ_C1: f32 = 3424.0 / 4096.0;
const PQ_C2: f32 = 2413.0 / 4096.0 * 32.0;
const PQ_C3: f32 = 2392.0 / 4096.0 * 32.0;

const HLG_A: f32 = 0.17883277;
const HLG_B: f32 = 0.28466892;
const HLG_C: f32 = 0.55991073;

/// BT.2100 system gamma for a 1000 cd/m² display.
const HLG_SYSTEM_GAMMA: f32 = 1.2;

/// SMPTE ST.2084 PQ (Perceptual Quantizer) EOTF^-1:
/// PQ is actually defined by the EOTF. This is its inverse, divided by 10,000.
///
/// Also in [_Rec. ITU-R BT.2100-3_](https://www.itu.int/rec/R-REC-BT.2100-3-202502-I/en).
///
/// - `color`: Normalized color [0, 1] to map non-linearly to [0, 1].
pub fn st2084_oetf(color: f32) -> f32 {
    if color <= 0.0 {
        return 0.0;
    }

    let cp = f32::powf(color.min(1.0), PQ_M1);
    let numerator = PQ_C1 + PQ_C2 * cp;
    let denominator = 1.0 + PQ_C3 * cp;

    f32::powf(numerator / denominator, PQ_M2)
}

/// SMPTE ST.2084 EOTF: PQ signal [0, 1] to linear light normalized so that 1.0 is 10,000 cd/m².
pub fn st2084_eotf(signal: f32) -> f32 {
    if signal <= 0.0 {
        return 0.0;
    }

    let e = f32::powf(signal.min(1.0), 1.0 / PQ_M2);
    let numerator = (e - PQ_C1).max(0.0);
    let denominator = PQ_C2 - PQ_C3 * e;
    if denominator <= 0.0 {
        return 0.0;
    }

    f32::powf(numerator / denominator, 1.0 / PQ_M1)
}

/// PQ signal to linear light relative to SDR white.
pub fn pq_signal_to_relative(signal: f32) -> f32 {
    st2084_eotf(signal) * PQ_PEAK_NITS / SDR_WHITE_NITS
}

/// Linear light relative to SDR white to PQ signal.
pub fn relative_to_pq_signal(value: f32) -> f32 {
    st2084_oetf(value * SDR_WHITE_NITS / PQ_PEAK_NITS)
}

/// ARIB STD-B67 / BT.2100 HLG OETF: scene linear [0, 1] to signal [0, 1].
pub fn hlg_oetf(scene: f32) -> f32 {
    if scene <= 0.0 {
        0.0
    } else if scene <= 1.0 / 12.0 {
        (3.0 * scene).sqrt()
    } else {
        HLG_A * (12.0 * scene - HLG_B).ln() + HLG_C
    }
}

/// Inverse of [`hlg_oetf`].
pub fn hlg_inverse_oetf(signal: f32) -> f32 {
    if signal <= 0.0 {
        0.0
    } else if signal <= 0.5 {
        signal * signal / 3.0
    } else {
        (((signal - HLG_C) / HLG_A).exp() + HLG_B) / 12.0
    }
}

fn bt2100_luminance(rgb: &[f32; 3]) -> f32 {
    0.2627 * rgb[0] + 0.6780 * rgb[1] + 0.0593 * rgb[2]
}

/// HLG signal to display light relative to SDR white, through the BT.2100 OOTF on a 1000 cd/m² display.
pub fn hlg_signal_to_relative(signal: [f32; 3]) -> [f32; 3] {
    let scene = signal.map(hlg_inverse_oetf);
    let ys = bt2100_luminance(&scene);
    let gain = if ys > 0.0 { ys.powf(HLG_SYSTEM_GAMMA - 1.0) } else { 0.0 };
    let scale = gain * HLG_PEAK_NITS / SDR_WHITE_NITS;
    scene.map(|e| e * scale)
}

/// Display light relative to SDR white back to an HLG signal.
pub fn relative_to_hlg_signal(value: [f32; 3]) -> [f32; 3] {
    let display = value.map(|v| (v * SDR_WHITE_NITS / HLG_PEAK_NITS).clamp(0.0, 1.0));
    let yd = bt2100_luminance(&display);
    if yd <= 0.0 {
        return [0.0; 3];
    }

    let ys = yd.powf(1.0 / HLG_SYSTEM_GAMMA);
    let scale = 1.0 / ys.powf(HLG_SYSTEM_GAMMA - 1.0);
    display.map(|d| hlg_oetf((d * scale).min(1.0)))
}

pub fn srgb_oetf(linear: f32) -> f32 {
    if linear <= 0.0031308 {
        linear.max(0.0) * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

pub fn srgb_eotf(encoded: f32) -> f32 {
    if encoded <= 0.04045 {
        encoded.max(0.0) / 12.92
    } else {
        ((encoded + 0.055) / 1.055).powf(2.4)
    }
}
