use prism_core::prelude::*;

use super::{for_each_row, prepare};
use crate::CodecError;

/// BGR to BGRA with opaque alpha.
pub fn bgr_to_bgra(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Bgr, dst, PixelFormat::Bgra)?;
    for_each_row(
        src.as_slice(),
        width * 3,
        dst.as_mut_slice(),
        width * 4,
        height,
        |s, d| {
            for (bgr, out) in s.chunks_exact(3).zip(d.chunks_exact_mut(4)) {
                out[..3].copy_from_slice(bgr);
                out[3] = u8::MAX;
            }
        },
    );
    Ok(())
}

/// BGRA to BGR, dropping alpha.
pub fn bgra_to_bgr(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    let (width, height) = prepare(src, PixelFormat::Bgra, dst, PixelFormat::Bgr)?;
    for_each_row(
        src.as_slice(),
        width * 4,
        dst.as_mut_slice(),
        width * 3,
        height,
        |s, d| {
            for (bgra, out) in s.chunks_exact(4).zip(d.chunks_exact_mut(3)) {
                out.copy_from_slice(&bgra[..3]);
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
    fn alpha_is_added_and_dropped() {
        let src = image(PixelFormat::Bgr, 2, 1, &[1, 2, 3, 4, 5, 6]);
        let mut bgra = blank(PixelFormat::Bgra, 2, 1);
        bgr_to_bgra(&src, &mut bgra).unwrap();
        assert_eq!(bgra.as_slice(), &[1, 2, 3, 255, 4, 5, 6, 255]);

        let mut back = blank(PixelFormat::Bgr, 2, 1);
        bgra_to_bgr(&bgra, &mut back).unwrap();
        assert_eq!(back.as_slice(), src.as_slice());
    }
}
