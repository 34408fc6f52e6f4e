use prism_core::prelude::*;

use super::{for_each_row, prepare};
use crate::CodecError;

/// BGR to little-endian RGB565 (red in the top five bits).
pub fn bgr_to_rgb565(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Bgr, dst, PixelFormat::Rgb565)?;
    for_each_row(
        src.as_slice(),
        width * 3,
        dst.as_mut_slice(),
        width * 2,
        height,
        |s, d| {
            for (bgr, out) in s.chunks_exact(3).zip(d.chunks_exact_mut(2)) {
                let value = ((bgr[2] as u16 >> 3) << 11)
                    | ((bgr[1] as u16 >> 2) << 5)
                    | (bgr[0] as u16 >> 3);
                out.copy_from_slice(&value.to_le_bytes());
            }
        },
    );
    Ok(())
}

/// RGB565 to BGR, replicating high bits into the low bits of each channel.
pub fn rgb565_to_bgr(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Rgb565, dst, PixelFormat::Bgr)?;
    for_each_row(
        src.as_slice(),
        width * 2,
        dst.as_mut_slice(),
        width * 3,
        height,
        |s, d| {
            for (px, out) in s.chunks_exact(2).zip(d.chunks_exact_mut(3)) {
                let value = u16::from_le_bytes([px[0], px[1]]);
                let r = ((value >> 11) & 0x1f) as u8;
                let g = ((value >> 5) & 0x3f) as u8;
                let b = (value & 0x1f) as u8;
                out[0] = (b << 3) | (b >> 2);
                out[1] = (g << 2) | (g >> 4);
                out[2] = (r << 3) | (r >> 2);
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
    fn primaries_pack_into_expected_bits() {
        let src = image(
            PixelFormat::Bgr,
            3,
            1,
            &[0, 0, 255, 0, 255, 0, 255, 0, 0],
        );
        let mut dst = blank(PixelFormat::Rgb565, 3, 1);
        bgr_to_rgb565(&src, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[0x00, 0xf8, 0xe0, 0x07, 0x1f, 0x00]);
    }

    #[test]
    fn unpacking_saturates_full_channels() {
        let src = image(PixelFormat::Rgb565, 2, 1, &[0xff, 0xff, 0x00, 0x00]);
        let mut dst = blank(PixelFormat::Bgr, 2, 1);
        rgb565_to_bgr(&src, &mut dst).unwrap();
        assert_eq!(dst.as_slice(), &[255, 255, 255, 0, 0, 0]);
    }
}
