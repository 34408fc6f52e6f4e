//! JPEG decode/encode and Huffman table repair for motion-JPEG frames.

use std::io::Cursor;

use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};
use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};
use prism_core::prelude::*;

use crate::{CodecError, expect_format, expect_frame_len, expect_same_size};

const MARKER: u8 = 0xff;
const SOI: u8 = 0xd8;
const SOF0: u8 = 0xc0;
const DHT: u8 = 0xc4;
const SOS: u8 = 0xda;

/// Decode a JPEG image into a BGR image of the same tagged dimensions.
///
/// Grayscale streams are replicated into all three channels. The decoded
/// size must equal the tags on both images.
pub fn decode_jpeg_to_bgr(src: &Image, dst: &mut Image) -> Result<(), CodecError> {
    expect_format(src, PixelFormat::Mjpeg)?;
    expect_format(dst, PixelFormat::Bgr)?;
    expect_same_size(src, dst)?;
    let needed = expect_frame_len(dst)?;

    let mut decoder = Decoder::new(Cursor::new(src.as_slice()));
    let pixels = decoder
        .decode()
        .map_err(|e| CodecError::Jpeg(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| CodecError::Jpeg("decoder produced no image info".into()))?;
    if !dst.is_size(info.width as u32, info.height as u32) {
        return Err(CodecError::SizeMismatch {
            src_width: info.width as u32,
            src_height: info.height as u32,
            dst_width: dst.width(),
            dst_height: dst.height(),
        });
    }

    let out = &mut dst.as_mut_slice()[..needed];
    match info.pixel_format {
        JpegPixelFormat::RGB24 => {
            for (rgb, bgr) in pixels.chunks_exact(3).zip(out.chunks_exact_mut(3)) {
                bgr[0] = rgb[2];
                bgr[1] = rgb[1];
                bgr[2] = rgb[0];
            }
        }
        JpegPixelFormat::L8 => {
            for (&g, bgr) in pixels.iter().zip(out.chunks_exact_mut(3)) {
                bgr.fill(g);
            }
        }
        other => {
            return Err(CodecError::Jpeg(format!(
                "unsupported jpeg pixel format {other:?}"
            )));
        }
    }
    Ok(())
}

/// Compress a BGR image into `dst`, which must be tagged MJPEG with the same
/// dimensions. `scratch` holds the channel-swapped copy and is reused across
/// calls. Sets `dst`'s JPEG quality on success.
pub fn encode_bgr_jpeg(
    src: &Image,
    dst: &mut Image,
    quality: i32,
    scratch: &mut Vec<u8>,
) -> Result<(), CodecError> {
    expect_format(src, PixelFormat::Bgr)?;
    expect_format(dst, PixelFormat::Mjpeg)?;
    expect_same_size(src, dst)?;
    let needed = expect_frame_len(src)?;

    scratch.clear();
    scratch.reserve(needed);
    for bgr in src.as_slice()[..needed].chunks_exact(3) {
        scratch.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
    }
    encode(&scratch[..], src.width(), src.height(), ExtendedColorType::Rgb8, quality, dst)
}

/// Compress a gray image into an MJPEG-tagged `dst`.
pub fn encode_gray_jpeg(src: &Image, dst: &mut Image, quality: i32) -> Result<(), CodecError> {
    expect_format(src, PixelFormat::Gray)?;
    expect_format(dst, PixelFormat::Mjpeg)?;
    expect_same_size(src, dst)?;
    let needed = expect_frame_len(src)?;
    encode(
        &src.as_slice()[..needed],
        src.width(),
        src.height(),
        ExtendedColorType::L8,
        quality,
        dst,
    )
}

fn encode(
    pixels: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    quality: i32,
    dst: &mut Image,
) -> Result<(), CodecError> {
    let q = quality.clamp(1, 100);
    let out = dst.buffer_mut();
    out.clear();
    JpegEncoder::new_with_quality(&mut *out, q as u8)
        .encode(pixels, width, height, color)
        .map_err(|e| CodecError::Jpeg(e.to_string()))?;
    dst.set_jpeg_quality(q);
    Ok(())
}

/// Where a default Huffman table segment must be inserted, if at all.
///
/// Many USB cameras emit motion-JPEG frames without a DHT segment, relying
/// on the decoder to assume the standard tables. Returns the offset of the
/// first start-of-frame marker when the header (everything before the scan)
/// has no DHT; `None` when tables are present or the data is not a JPEG.
///
/// # Example
/// ```rust
/// use prism_codec::jpeg::jpeg_needs_dht;
///
/// // SOI, SOF0 (length 2), SOS (length 2)
/// let bare = [0xff, 0xd8, 0xff, 0xc0, 0x00, 0x02, 0xff, 0xda, 0x00, 0x02];
/// assert_eq!(jpeg_needs_dht(&bare), Some(2));
/// assert_eq!(jpeg_needs_dht(b"not a jpeg"), None);
/// ```
pub fn jpeg_needs_dht(data: &[u8]) -> Option<usize> {
    if data.len() < 4 || data[0] != MARKER || data[1] != SOI {
        return None;
    }
    let mut pos = 2;
    let mut sof = None;
    while pos + 4 <= data.len() {
        if data[pos] != MARKER {
            return None;
        }
        let marker = data[pos + 1];
        if marker == MARKER {
            // fill byte
            pos += 1;
            continue;
        }
        match marker {
            DHT => return None,
            SOS => break,
            SOF0..=0xc3 if sof.is_none() => sof = Some(pos),
            _ => {}
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + len;
    }
    sof
}

/// Copy `data` into `out` with [`JPEG_DHT`] inserted at `at`.
pub fn insert_dht(data: &[u8], at: usize, out: &mut Vec<u8>) {
    let at = at.min(data.len());
    out.clear();
    out.reserve(data.len() + JPEG_DHT.len());
    out.extend_from_slice(&data[..at]);
    out.extend_from_slice(&JPEG_DHT);
    out.extend_from_slice(&data[at..]);
}

/// The standard luminance and chrominance Huffman tables (ITU T.81 Annex K)
/// as one complete DHT segment, marker included.
pub const JPEG_DHT: [u8; 420] = [
    0xff, 0xc4, 0x01, 0xa2, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a,
    0x0b, 0x01, 0x00, 0x03, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x10, 0x00,
    0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05, 0x04, 0x04, 0x00, 0x00, 0x01, 0x7d, 0x01,
    0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07, 0x22,
    0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0, 0x24,
    0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28, 0x29,
    0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a,
    0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a,
    0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a,
    0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8,
    0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6,
    0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2, 0xe3,
    0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9,
    0xfa, 0x11, 0x00, 0x02, 0x01, 0x02, 0x04, 0x04, 0x03, 0x04, 0x07, 0x05, 0x04, 0x04, 0x00, 0x01,
    0x02, 0x77, 0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07,
    0x61, 0x71, 0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33,
    0x52, 0xf0, 0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19,
    0x1a, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46,
    0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66,
    0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85,
    0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3,
    0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba,
    0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8,
    0xd9, 0xda, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6,
    0xf7, 0xf8, 0xf9, 0xfa,
];
