//! Premultiplied-RGBA8 blend math for the compositing stage.
//!
//! Buffers are row-major, tightly packed premultiplied RGBA8. The `Normal`
//! path is integer source-over; the separable modes (multiply, screen,
//! overlay) un-premultiply, apply the blend function, then composite with
//! source-over so fully transparent source pixels always leave the
//! destination untouched.

use crate::core::BlendMode;
use crate::error::{CueframeError, CueframeResult};

pub type PremulRgba8 = [u8; 4];

pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

pub fn additive(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }
    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;

    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = add_sat_u8(dst[i], mul_div255(u16::from(src[i]), op));
    }
    out
}

fn separable(dst: PremulRgba8, src: PremulRgba8, opacity: f32, f: fn(f32, f32) -> f32) -> PremulRgba8 {
    let sa = f32::from(src[3]) / 255.0 * opacity.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;

    // Un-premultiply to straight color for the blend function.
    let unpremul = |c: u8, a: f32| -> f32 {
        if a <= 0.0 {
            0.0
        } else {
            (f32::from(c) / 255.0 / a).min(1.0)
        }
    };

    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    out[3] = ((out_a * 255.0).round() as i32).clamp(0, 255) as u8;

    for i in 0..3 {
        let cs = unpremul(src[i], f32::from(src[3]) / 255.0);
        let cb = unpremul(dst[i], da);
        let blended = f(cb, cs).clamp(0.0, 1.0);
        // W3C compositing: blend where both layers exist, plain source-over
        // contributions elsewhere. Result is premultiplied by out alpha.
        let co = sa * da * blended + sa * (1.0 - da) * cs + da * (1.0 - sa) * cb;
        out[i] = ((co * 255.0).round() as i32).clamp(0, 255) as u8;
    }
    out
}

fn multiply_f(cb: f32, cs: f32) -> f32 {
    cb * cs
}

fn screen_f(cb: f32, cs: f32) -> f32 {
    cb + cs - cb * cs
}

fn overlay_f(cb: f32, cs: f32) -> f32 {
    if cb <= 0.5 {
        2.0 * cb * cs
    } else {
        1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
    }
}

pub fn blend_pixel(dst: PremulRgba8, src: PremulRgba8, mode: BlendMode, opacity: f32) -> PremulRgba8 {
    match mode {
        BlendMode::Normal => over(dst, src, opacity),
        BlendMode::Additive => additive(dst, src, opacity),
        BlendMode::Multiply => separable(dst, src, opacity, multiply_f),
        BlendMode::Screen => separable(dst, src, opacity, screen_f),
        BlendMode::Overlay => separable(dst, src, opacity, overlay_f),
    }
}

/// Fold `src` into `dst` with the given blend mode and opacity.
pub fn blend_in_place(
    dst: &mut [u8],
    src: &[u8],
    mode: BlendMode,
    opacity: f32,
) -> CueframeResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(CueframeError::gpu(
            "blend_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = blend_pixel([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], mode, opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}
