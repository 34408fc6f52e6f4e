use prism_core::prelude::*;

use super::{for_each_row, prepare};
use crate::CodecError;

/// BT.601 luma weights scaled by 256.
const W_R: u32 = 77;
const W_G: u32 = 150;
const W_B: u32 = 29;

pub fn bgr_to_gray(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Bgr, dst, PixelFormat::Gray)?;
    for_each_row(
        src.as_slice(),
        width * 3,
        dst.as_mut_slice(),
        width,
        height,
        |s, d| {
            for (bgr, out) in s.chunks_exact(3).zip(d.iter_mut()) {
                let luma = W_B * bgr[0] as u32 + W_G * bgr[1] as u32 + W_R * bgr[2] as u32;
                *out = ((luma + 128) >> 8).min(255) as u8;
            }
        },
    );
    Ok(())
}

pub fn gray_to_bgr(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Gray, dst, PixelFormat::Bgr)?;
    for_each_row(
        src.as_slice(),
        width,
        dst.as_mut_slice(),
        width * 3,
        height,
        |s, d| {
            for (&g, out) in s.iter().zip(d.chunks_exact_mut(3)) {
                out.fill(g);
            }
        },
    );
    Ok(())
}

/// Y16 to gray, stretching the observed min..max range onto 0..255.
///
/// A flat image maps to all zeros.
pub fn y16_to_gray(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Y16, dst, PixelFormat::Gray)?;
    let samples = &src.as_slice()[..width * height * 2];
    let (min, max) = samples
        .chunks_exact(2)
        .map(|px| u16::from_le_bytes([px[0], px[1]]))
        .fold((u16::MAX, u16::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let range = max.saturating_sub(min) as u32;
    for_each_row(
        samples,
        width * 2,
        dst.as_mut_slice(),
        width,
        height,
        |s, d| {
            for (px, out) in s.chunks_exact(2).zip(d.iter_mut()) {
                *out = if range == 0 {
                    0
                } else {
                    let v = u16::from_le_bytes([px[0], px[1]]) as u32 - min as u32;
                    ((v * 255 + range / 2) / range) as u8
                };
            }
        },
    );
    Ok(())
}

/// Gray to Y16 by scaling 0..255 onto 0..65535.
pub fn gray_to_y16(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Gray, dst, PixelFormat::Y16)?;
    for_each_row(
        src.as_slice(),
        width,
        dst.as_mut_slice(),
        width * 2,
        height,
        |s, d| {
            for (&g, out) in s.iter().zip(d.chunks_exact_mut(2)) {
                out.copy_from_slice(&(g as u16 * 257).to_le_bytes());
            }
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;

    #[test]
    fn luma_weights() {
        let src = image(
            PixelFormat::Bgr,
            4,
            1,
            &[255, 255, 255, 0, 0, 0, 0, 255, 0, 255, 0, 0],
        );
        let mut dst = blank(PixelFormat::Gray, 4, 1);
        bgr_to_gray(&src, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[255, 0, 149, 29]);
    }

    #[test]
    fn y16_normalizes_to_full_range() {
        let mut bytes = Vec::new();
        for v in [1000u16, 1500, 2000, 1000] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let src = image(PixelFormat::Y16, 2, 2, &bytes);
        let mut dst = blank(PixelFormat::Gray, 2, 2);
        y16_to_gray(&src, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[0, 128, 255, 0]);
    }

    #[test]
    fn flat_y16_is_black() {
        let src = image(PixelFormat::Y16, 2, 1, &[7, 7, 7, 7]);
        let mut dst = blank(PixelFormat::Gray, 2, 1);
        y16_to_gray(&src, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[0, 0]);
    }

    #[test]
    fn gray_widens_to_y16() {
        let src = image(PixelFormat::Gray, 2, 1, &[0, 255]);
        let mut dst = blank(PixelFormat::Y16, 2, 1);
        gray_to_y16(&src, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[0, 0, 0xff, 0xff]);
    }
}
