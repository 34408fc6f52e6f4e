#![doc = include_str!("../README.md")]

use prism_core::prelude::*;

pub mod convert;
pub mod jpeg;
pub mod resize;

/// Errors surfaced by pixel conversions and the JPEG codec.
///
/// # Example
/// ```rust
/// use prism_codec::CodecError;
/// use prism_core::prelude::PixelFormat;
///
/// let err = CodecError::Unsupported {
///     from: PixelFormat::Bgr,
///     to: PixelFormat::Yuyv,
/// };
/// assert_eq!(err.to_string(), "no conversion from bgr to yuyv");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An image did not carry the pixel format the operation expects.
    #[error("format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        /// Expected pixel format.
        expected: PixelFormat,
        /// Pixel format encountered.
        actual: PixelFormat,
    },
    /// Source and destination dimensions disagree.
    #[error("size mismatch: {src_width}x{src_height} into {dst_width}x{dst_height}")]
    SizeMismatch {
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    },
    /// A buffer holds fewer bytes than its tagged layout requires.
    #[error("buffer too short: need {needed} bytes, have {actual}")]
    BufferTooShort { needed: usize, actual: usize },
    /// No single-step conversion exists between the two formats.
    #[error("no conversion from {from} to {to}")]
    Unsupported { from: PixelFormat, to: PixelFormat },
    /// JPEG decode or encode failure.
    #[error("jpeg error: {0}")]
    Jpeg(String),
}

pub(crate) fn expect_format(image: &Image, expected: PixelFormat) -> Result<(), CodecError> {
    if image.pixel_format() != expected {
        return Err(CodecError::FormatMismatch {
            expected,
            actual: image.pixel_format(),
        });
    }
    Ok(())
}

pub(crate) fn expect_same_size(src: &Image, dst: &Image) -> Result<(), CodecError> {
    if !src.is_size(dst.width(), dst.height()) {
        return Err(CodecError::SizeMismatch {
            src_width: src.width(),
            src_height: src.height(),
            dst_width: dst.width(),
            dst_height: dst.height(),
        });
    }
    Ok(())
}

/// Require `image` to hold a full uncompressed frame for its own tag.
pub(crate) fn expect_frame_len(image: &Image) -> Result<usize, CodecError> {
    let needed = image
        .pixel_format()
        .frame_len(image.width(), image.height())
        .unwrap_or(0);
    if image.len() < needed {
        return Err(CodecError::BufferTooShort {
            needed,
            actual: image.len(),
        });
    }
    Ok(needed)
}

pub mod prelude {
    pub use crate::CodecError;
    pub use crate::convert::{convert_direct, has_direct};
    pub use crate::jpeg::{
        JPEG_DHT, decode_jpeg_to_bgr, encode_bgr_jpeg, encode_gray_jpeg, insert_dht,
        jpeg_needs_dht,
    };
    pub use crate::resize::resize;
}
