//! Single-step conversions between uncompressed layouts.
//!
//! Every function checks the source and destination tags, requires equal
//! dimensions and writes exactly the destination's frame length. Multi-step
//! routes (for example Y16 to BGR through gray) are composed by the caller.

use prism_core::prelude::*;
use rayon::prelude::*;

use crate::{CodecError, expect_format, expect_frame_len, expect_same_size};

mod bgra;
mod gray;
mod rgb565;
mod yuv;

pub use bgra::{bgr_to_bgra, bgra_to_bgr};
pub use gray::{bgr_to_gray, gray_to_bgr, gray_to_y16, y16_to_gray};
pub use rgb565::{bgr_to_rgb565, rgb565_to_bgr};
pub use yuv::{uyvy_to_bgr, uyvy_to_gray, yuyv_to_bgr, yuyv_to_gray};

type ConvertFn = fn(&Image, &mut Image) -> Result<(), CodecError>;

const DIRECT: &[(PixelFormat, PixelFormat, ConvertFn)] = &[
    (PixelFormat::Yuyv, PixelFormat::Bgr, yuyv_to_bgr),
    (PixelFormat::Yuyv, PixelFormat::Gray, yuyv_to_gray),
    (PixelFormat::Uyvy, PixelFormat::Bgr, uyvy_to_bgr),
    (PixelFormat::Uyvy, PixelFormat::Gray, uyvy_to_gray),
    (PixelFormat::Rgb565, PixelFormat::Bgr, rgb565_to_bgr),
    (PixelFormat::Bgr, PixelFormat::Rgb565, bgr_to_rgb565),
    (PixelFormat::Bgr, PixelFormat::Gray, bgr_to_gray),
    (PixelFormat::Gray, PixelFormat::Bgr, gray_to_bgr),
    (PixelFormat::Y16, PixelFormat::Gray, y16_to_gray),
    (PixelFormat::Gray, PixelFormat::Y16, gray_to_y16),
    (PixelFormat::Bgr, PixelFormat::Bgra, bgr_to_bgra),
    (PixelFormat::Bgra, PixelFormat::Bgr, bgra_to_bgr),
];

/// Whether [`convert_direct`] handles `from -> to` in one step.
pub fn has_direct(from: PixelFormat, to: PixelFormat) -> bool {
    DIRECT.iter().any(|(f, t, _)| *f == from && *t == to)
}

/// Convert `src` into `dst` using the single-step routine for their tags.
///
/// # Example
/// ```rust
/// use prism_codec::convert::convert_direct;
/// use prism_core::prelude::{FramePool, PixelFormat};
///
/// let pool: FramePool<()> = FramePool::new();
/// let mut gray = pool.alloc_image(PixelFormat::Gray, 2, 2, 4);
/// gray.as_mut_slice().copy_from_slice(&[0, 64, 128, 255]);
/// let mut bgr = pool.alloc_image(PixelFormat::Bgr, 2, 2, 12);
/// convert_direct(&gray, &mut bgr).unwrap();
/// assert_eq!(&bgr.as_slice()[3..6], &[64, 64, 64]);
/// ```
pub fn convert_direct(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (from, to) = (src.pixel_format(), dst.pixel_format());
    let (_, _, func) = DIRECT
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .ok_or(CodecError::Unsupported { from, to })?;
    func(src, dst)
}

/// Shared checks; returns `(width, height)` in pixels.
pub(crate) fn prepare(
    src: &Image,
    from: PixelFormat,
    dst: &Image,
    to: PixelFormat,
) -> Result<(usize, usize), CodecError> {
    expect_format(src, from)?;
    expect_format(dst, to)?;
    expect_same_size(src, dst)?;
    expect_frame_len(src)?;
    expect_frame_len(dst)?;
    Ok((src.width() as usize, src.height() as usize))
}

/// Run `f` over matching source and destination rows in parallel.
pub(crate) fn for_each_row<F>(
    src: &[u8],
    src_row: usize,
    dst: &mut [u8],
    dst_row: usize,
    height: usize,
    f: F,
) where
    F: Fn(&[u8], &mut [u8]) + Send + Sync,
{
    if src_row == 0 || dst_row == 0 || height == 0 {
        return;
    }
    dst[..dst_row * height]
        .par_chunks_mut(dst_row)
        .zip(src[..src_row * height].par_chunks(src_row))
        .for_each(|(d, s)| f(s, d));
}

#[cfg(test)]
pub(crate) mod test_util {
    use prism_core::prelude::*;

    pub fn image(fmt: PixelFormat, w: u32, h: u32, bytes: &[u8]) -> Image {
        let pool: FramePool<()> = FramePool::new();
        let mut image = pool.alloc_image(fmt, w, h, bytes.len());
        image.as_mut_slice().copy_from_slice(bytes);
        image
    }

    pub fn blank(fmt: PixelFormat, w: u32, h: u32) -> Image {
        let pool: FramePool<()> = FramePool::new();
        let len = fmt.frame_len(w, h).unwrap_or(0);
        pool.alloc_image(fmt, w, h, len)
    }
}
