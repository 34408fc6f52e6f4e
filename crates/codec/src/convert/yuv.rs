use prism_core::prelude::*;
use yuvutils_rs::{YuvPackedImage, YuvRange, YuvStandardMatrix};

use super::{for_each_row, prepare};
use crate::CodecError;

/// Byte positions of Y0, U, Y1, V inside one 4-byte macropixel.
#[derive(Clone, Copy)]
struct Packed422 {
    y0: usize,
    u: usize,
    y1: usize,
    v: usize,
}

const YUYV: Packed422 = Packed422 {
    y0: 0,
    u: 1,
    y1: 2,
    v: 3,
};

const UYVY: Packed422 = Packed422 {
    u: 0,
    y0: 1,
    v: 2,
    y1: 3,
};

/// Full-range BT.601 integer coefficients (scaled by 256).
const R_V: i32 = 359;
const G_U: i32 = 88;
const G_V: i32 = 183;
const B_U: i32 = 454;

#[inline(always)]
fn yuv_to_bgr(y: i32, u: i32, v: i32) -> [u8; 3] {
    let d = u - 128;
    let e = v - 128;
    let c = y << 8;
    let r = (c + R_V * e + 128) >> 8;
    let g = (c - G_U * d - G_V * e + 128) >> 8;
    let b = (c + B_U * d + 128) >> 8;
    [
        b.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        r.clamp(0, 255) as u8,
    ]
}

fn packed_to_bgr(
    layout: Packed422,
    from: PixelFormat,
    src: &Image,
    dst: &mut Image,
) -> Result<(), CodecError> {
    let (width, height) = prepare(src, from, dst, PixelFormat::Bgr)?;
    let row_bytes = width * 3;
    let packed = YuvPackedImage {
        yuy: &src.as_slice()[..width * 2 * height],
        yuy_stride: (width * 2) as u32,
        width: width as u32,
        height: height as u32,
    };
    let out = &mut dst.as_mut_slice()[..row_bytes * height];
    let (range, matrix) = (YuvRange::Full, YuvStandardMatrix::Bt601);
    let converted = match from {
        PixelFormat::Uyvy => yuvutils_rs::uyvy422_to_bgr(&packed, out, row_bytes as u32, range, matrix),
        _ => yuvutils_rs::yuyv422_to_bgr(&packed, out, row_bytes as u32, range, matrix),
    };
    // the library rejects some geometries (odd widths); convert row by row instead
    if converted.is_err() {
        packed_rows_to_bgr(layout, width, height, src.as_slice(), out);
    }
    Ok(())
}

fn packed_rows_to_bgr(layout: Packed422, width: usize, height: usize, src: &[u8], dst: &mut [u8]) {
    let odd = width % 2 == 1;
    for_each_row(src, width * 2, dst, width * 3, height, |s, d| {
        let pairs = width / 2;
        for (mp, px) in s.chunks_exact(4).zip(d.chunks_exact_mut(6)).take(pairs) {
            let u = mp[layout.u] as i32;
            let v = mp[layout.v] as i32;
            px[..3].copy_from_slice(&yuv_to_bgr(mp[layout.y0] as i32, u, v));
            px[3..].copy_from_slice(&yuv_to_bgr(mp[layout.y1] as i32, u, v));
        }
        if odd {
            // trailing half macropixel: luma plus U, no V
            let tail = &s[pairs * 4..];
            let (y, u) = if layout.y0 == 0 { (tail[0], tail[1]) } else { (tail[1], tail[0]) };
            d[pairs * 6..].copy_from_slice(&yuv_to_bgr(y as i32, u as i32, 128));
        }
    });
}

fn packed_to_gray(
    layout: Packed422,
    from: PixelFormat,
    src: &Image,
    dst: &mut Image,
) -> Result<(), CodecError> {
    let (width, height) = prepare(src, from, dst, PixelFormat::Gray)?;
    let luma = layout.y0;
    for_each_row(
        src.as_slice(),
        width * 2,
        dst.as_mut_slice(),
        width,
        height,
        |s, d| {
            for (px, pair) in d.iter_mut().zip(s.chunks_exact(2)) {
                *px = pair[luma];
            }
        },
    );
    Ok(())
}

/// Packed YUYV 4:2:2 to BGR.
pub fn yuyv_to_bgr(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    packed_to_bgr(YUYV, PixelFormat::Yuyv, src, dst)
}

/// Packed UYVY 4:2:2 to BGR.
pub fn uyvy_to_bgr(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    packed_to_bgr(UYVY, PixelFormat::Uyvy, src, dst)
}

/// Extract the luma plane of a YUYV image.
pub fn yuyv_to_gray(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    packed_to_gray(YUYV, PixelFormat::Yuyv, src, dst)
}

/// Extract the luma plane of a UYVY image.
pub fn uyvy_to_gray(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    packed_to_gray(UYVY, PixelFormat::Uyvy, src, dst)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;

    fn assert_close(actual: &[u8], expected: &[u8]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!(a.abs_diff(*e) <= 1, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn neutral_chroma_is_gray() {
        let src = image(PixelFormat::Yuyv, 2, 1, &[10, 128, 200, 128]);
        let mut dst = blank(PixelFormat::Bgr, 2, 1);
        yuyv_to_bgr(&src, &mut dst).unwrap();
        assert_close(dst.as_slice(), &[10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn uyvy_matches_yuyv_after_reorder() {
        let yuyv = image(PixelFormat::Yuyv, 2, 2, &[81, 90, 81, 240, 145, 54, 145, 34]);
        let uyvy = image(PixelFormat::Uyvy, 2, 2, &[90, 81, 240, 81, 54, 145, 34, 145]);
        let mut a = blank(PixelFormat::Bgr, 2, 2);
        let mut b = blank(PixelFormat::Bgr, 2, 2);
        yuyv_to_bgr(&yuyv, &mut a).unwrap();
        uyvy_to_bgr(&uyvy, &mut b).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        // strong V on the first row reads as red
        let first = &a.as_slice()[..3];
        assert!(first[2] > 200 && first[0] < 60, "{first:?}");
    }

    #[test]
    fn luma_extraction() {
        let yuyv = image(PixelFormat::Yuyv, 2, 1, &[1, 2, 3, 4]);
        let uyvy = image(PixelFormat::Uyvy, 2, 1, &[1, 2, 3, 4]);
        let mut g = blank(PixelFormat::Gray, 2, 1);
        yuyv_to_gray(&yuyv, &mut g).unwrap();
        assert_eq!(g.as_slice(), &[1, 3]);
        uyvy_to_gray(&uyvy, &mut g).unwrap();
        assert_eq!(g.as_slice(), &[2, 4]);
    }

    #[test]
    fn odd_width_fills_every_pixel() {
        let src = image(PixelFormat::Yuyv, 3, 1, &[50, 128, 60, 128, 70, 128]);
        let mut dst = blank(PixelFormat::Bgr, 3, 1);
        yuyv_to_bgr(&src, &mut dst).unwrap();
        assert_close(dst.as_slice(), &[50, 50, 50, 60, 60, 60, 70, 70, 70]);
    }

    #[test]
    fn row_path_matches_library_output() {
        let bytes: Vec<u8> = (0..64u32).map(|i| (i * 37 % 256) as u8).collect();
        let src = image(PixelFormat::Yuyv, 8, 4, &bytes);
        let mut dst = blank(PixelFormat::Bgr, 8, 4);
        yuyv_to_bgr(&src, &mut dst).unwrap();
        let mut rows = vec![0u8; 8 * 4 * 3];
        packed_rows_to_bgr(YUYV, 8, 4, &bytes, &mut rows);
        for (a, b) in dst.as_slice().iter().zip(&rows) {
            assert!(a.abs_diff(*b) <= 3, "{:?} vs {rows:?}", dst.as_slice());
        }
    }
}
