//! Scaling between resolutions without changing pixel format.

use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba, imageops::FilterType};
use prism_core::prelude::*;

use crate::{CodecError, expect_frame_len};

/// Scale `src` into `dst`, which must carry the same pixel format tagged with
/// the target dimensions.
///
/// BGR, BGRA, gray and Y16 use bilinear filtering. RGB565 uses nearest
/// neighbour, and packed 4:2:2 keeps chroma pairs intact. MJPEG cannot be
/// resized without decoding first.
///
/// # Example
/// ```rust
/// use prism_codec::resize::resize;
/// use prism_core::prelude::{FramePool, PixelFormat};
///
/// let pool: FramePool<()> = FramePool::new();
/// let mut src = pool.alloc_image(PixelFormat::Gray, 4, 4, 16);
/// src.as_mut_slice().fill(90);
/// let mut dst = pool.alloc_image(PixelFormat::Gray, 2, 2, 4);
/// resize(&src, &mut dst).unwrap();
/// assert_eq!(dst.as_slice(), &[90; 4]);
/// ```
pub fn resize(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let fmt = src.pixel_format();
    if dst.pixel_format() != fmt {
        return Err(CodecError::FormatMismatch {
            expected: fmt,
            actual: dst.pixel_format(),
        });
    }
    if fmt.is_compressed() || fmt == PixelFormat::Unknown {
        return Err(CodecError::Unsupported { from: fmt, to: fmt });
    }
    expect_frame_len(src)?;
    let needed = expect_frame_len(dst)?;
    if dst.width() == 0 || dst.height() == 0 || src.width() == 0 || src.height() == 0 {
        return Ok(());
    }

    match fmt {
        PixelFormat::Bgr => filtered::<Rgb<u8>>(src, dst, needed),
        PixelFormat::Bgra => filtered::<Rgba<u8>>(src, dst, needed),
        PixelFormat::Gray => filtered::<Luma<u8>>(src, dst, needed),
        PixelFormat::Y16 => filtered_y16(src, dst, needed),
        PixelFormat::Rgb565 => {
            nearest(src, dst, 2);
            Ok(())
        }
        PixelFormat::Yuyv => {
            nearest_422(src, dst, 0);
            Ok(())
        }
        PixelFormat::Uyvy => {
            nearest_422(src, dst, 1);
            Ok(())
        }
        PixelFormat::Mjpeg | PixelFormat::Unknown => Err(CodecError::Unsupported { from: fmt, to: fmt }),
    }
}

/// Channel order does not matter to the filter, so BGR runs as `Rgb`.
fn filtered<P>(src: &Image, dst: &mut Image, needed: usize) -> Result<(), CodecError>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let len = needed_for(src);
    let view: ImageBuffer<P, &[u8]> =
        ImageBuffer::from_raw(src.width(), src.height(), &src.as_slice()[..len]).ok_or(
            CodecError::BufferTooShort {
                needed: len,
                actual: src.len(),
            },
        )?;
    let scaled = image::imageops::resize(&view, dst.width(), dst.height(), FilterType::Triangle);
    dst.as_mut_slice()[..needed].copy_from_slice(scaled.as_raw());
    Ok(())
}

/// Y16 samples are little-endian bytes, so they are widened into a
/// `Luma<u16>` buffer for the filter and narrowed back afterwards.
fn filtered_y16(src: &Image, dst: &mut Image, needed: usize) -> Result<(), CodecError> {
    let len = needed_for(src);
    let samples: Vec<u16> = src.as_slice()[..len]
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    let view: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(src.width(), src.height(), samples)
        .ok_or(CodecError::BufferTooShort {
            needed: len,
            actual: src.len(),
        })?;
    let scaled = image::imageops::resize(&view, dst.width(), dst.height(), FilterType::Triangle);
    for (out, v) in dst.as_mut_slice()[..needed]
        .chunks_exact_mut(2)
        .zip(scaled.as_raw())
    {
        out.copy_from_slice(&v.to_le_bytes());
    }
    Ok(())
}

fn needed_for(image: &Image) -> usize {
    image
        .pixel_format()
        .frame_len(image.width(), image.height())
        .unwrap_or(0)
}

#[inline]
fn source_index(dst_pos: usize, dst_len: usize, src_len: usize) -> usize {
    (dst_pos * src_len / dst_len).min(src_len - 1)
}

fn nearest(src: &Image, dst: &mut Image, bpp: usize) {
    let (sw, sh) = (src.width() as usize, src.height() as usize);
    let (dw, dh) = (dst.width() as usize, dst.height() as usize);
    let input = src.as_slice();
    let output = dst.as_mut_slice();
    for y in 0..dh {
        let sy = source_index(y, dh, sh);
        let src_row = &input[sy * sw * bpp..(sy + 1) * sw * bpp];
        let dst_row = &mut output[y * dw * bpp..(y + 1) * dw * bpp];
        for (x, px) in dst_row.chunks_exact_mut(bpp).enumerate() {
            let sx = source_index(x, dw, sw);
            px.copy_from_slice(&src_row[sx * bpp..(sx + 1) * bpp]);
        }
    }
}

/// Nearest neighbour for packed 4:2:2; `luma` is the Y offset within each
/// 2-byte pixel (0 for YUYV, 1 for UYVY).
fn nearest_422(src: &Image, dst: &mut Image, luma: usize) {
    let chroma = 1 - luma;
    let (sw, sh) = (src.width() as usize, src.height() as usize);
    let (dw, dh) = (dst.width() as usize, dst.height() as usize);
    let input = src.as_slice();
    let output = dst.as_mut_slice();
    for y in 0..dh {
        let sy = source_index(y, dh, sh);
        let src_row = &input[sy * sw * 2..(sy + 1) * sw * 2];
        let dst_row = &mut output[y * dw * 2..(y + 1) * dw * 2];
        for (x, px) in dst_row.chunks_exact_mut(2).enumerate() {
            let sx = source_index(x, dw, sw);
            // even pixels carry U, odd pixels carry V
            let c = (sx / 2) * 4 + chroma + if x % 2 == 0 { 0 } else { 2 };
            px[luma] = src_row[sx * 2 + luma];
            px[chroma] = src_row.get(c).copied().unwrap_or(128);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(fmt: PixelFormat, w: u32, h: u32, bytes: &[u8]) -> Image {
        let pool: FramePool<()> = FramePool::new();
        let mut image = pool.alloc_image(fmt, w, h, bytes.len());
        image.as_mut_slice().copy_from_slice(bytes);
        image
    }

    fn blank(fmt: PixelFormat, w: u32, h: u32) -> Image {
        let pool: FramePool<()> = FramePool::new();
        pool.alloc_image(fmt, w, h, fmt.frame_len(w, h).unwrap_or(0))
    }

    #[test]
    fn bgr_upscale_keeps_solid_color() {
        let src = image(PixelFormat::Bgr, 2, 2, &[10, 20, 30].repeat(4));
        let mut dst = blank(PixelFormat::Bgr, 4, 4);
        resize(&src, &mut dst).unwrap();
        assert!(dst.as_slice().chunks_exact(3).all(|px| px == [10, 20, 30]));
    }

    fn y16_values(image: &Image) -> Vec<u16> {
        image
            .as_slice()
            .chunks_exact(2)
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect()
    }

    #[test]
    fn y16_keeps_full_sample_depth() {
        let src = image(PixelFormat::Y16, 4, 4, &4660u16.to_le_bytes().repeat(16));
        let mut dst = blank(PixelFormat::Y16, 2, 2);
        resize(&src, &mut dst).unwrap();
        assert_eq!(y16_values(&dst), vec![4660; 4]);
    }

    #[test]
    fn y16_gradient_stays_ordered() {
        let mut bytes = Vec::new();
        for x in 0u16..8 {
            bytes.extend_from_slice(&(x * 1000).to_le_bytes());
        }
        let src = image(PixelFormat::Y16, 8, 1, &bytes);
        let mut dst = blank(PixelFormat::Y16, 4, 1);
        resize(&src, &mut dst).unwrap();
        let values = y16_values(&dst);
        assert!(values.windows(2).all(|w| w[0] < w[1]), "{values:?}");
        assert!(values[3] > 255, "{values:?}");
    }

    #[test]
    fn yuyv_upscale_preserves_chroma_order() {
        let src = image(PixelFormat::Yuyv, 2, 1, &[10, 100, 20, 200]);
        let mut dst = blank(PixelFormat::Yuyv, 4, 1);
        resize(&src, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[10, 100, 10, 200, 20, 100, 20, 200]);
    }

    #[test]
    fn mjpeg_cannot_be_resized() {
        let src = image(PixelFormat::Mjpeg, 4, 4, &[0xff, 0xd8]);
        let mut dst = blank(PixelFormat::Mjpeg, 2, 2);
        assert!(matches!(
            resize(&src, &mut dst),
            Err(CodecError::Unsupported { .. })
        ));
    }

    #[test]
    fn format_must_match() {
        let src = blank(PixelFormat::Gray, 4, 4);
        let mut dst = blank(PixelFormat::Bgr, 2, 2);
        assert!(matches!(
            resize(&src, &mut dst),
            Err(CodecError::FormatMismatch { .. })
        ));
    }
}
