use std::sync::Arc;

use prism_codec::prelude::*;
use prism_core::prelude::*;
use tracing::{debug, trace};

use super::{EnvelopeState, SourcePool, search};

/// Works on one frame's image list while its lock is held; every image it
/// produces is appended to the list before being returned.
pub(super) struct Converter<'a> {
    pool: &'a SourcePool,
    state: &'a mut EnvelopeState,
}

impl<'a> Converter<'a> {
    pub(super) fn new(pool: &'a SourcePool, state: &'a mut EnvelopeState) -> Self {
        Self { pool, state }
    }

    pub(super) fn get_image(
        &mut self,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        required_quality: i32,
        default_quality: i32,
    ) -> Option<Arc<Image>> {
        let idx = search::nearest(&self.state.images, width, height, pixel_format, required_quality)?;
        let mut cur = Arc::clone(&self.state.images[idx]);
        if cur.is(width, height, pixel_format, required_quality) {
            return Some(cur);
        }

        debug!(
            from = %cur.pixel_format(),
            from_width = cur.width(),
            from_height = cur.height(),
            to = %pixel_format,
            to_width = width,
            to_height = height,
            "converting image"
        );

        if cur.pixel_format() == PixelFormat::Mjpeg {
            cur = self.decode(&cur)?;
        }
        if !cur.is_size(width, height) {
            cur = self.resize(&cur, width, height)?;
        }
        self.convert(cur, pixel_format, required_quality, default_quality)
    }

    /// Same-size format conversion through the BGR and gray hubs.
    fn convert(
        &mut self,
        cur: Arc<Image>,
        pixel_format: PixelFormat,
        required_quality: i32,
        default_quality: i32,
    ) -> Option<Arc<Image>> {
        if cur.is(cur.width(), cur.height(), pixel_format, required_quality) {
            return Some(cur);
        }
        match pixel_format {
            PixelFormat::Bgr => self.to_bgr(cur),
            PixelFormat::Gray => self.to_gray(cur),
            PixelFormat::Y16 => {
                let gray = self.to_gray(cur)?;
                self.direct(&gray, PixelFormat::Y16)
            }
            PixelFormat::Rgb565 | PixelFormat::Bgra => {
                let bgr = self.to_bgr(cur)?;
                self.direct(&bgr, pixel_format)
            }
            PixelFormat::Mjpeg => {
                let quality = if required_quality != QUALITY_UNSET {
                    required_quality
                } else {
                    default_quality
                };
                match cur.pixel_format() {
                    PixelFormat::Gray | PixelFormat::Y16 => {
                        let gray = self.to_gray(cur)?;
                        self.compress_gray(&gray, quality)
                    }
                    _ => {
                        let bgr = self.to_bgr(cur)?;
                        self.compress_bgr(&bgr, quality)
                    }
                }
            }
            PixelFormat::Yuyv | PixelFormat::Uyvy | PixelFormat::Unknown => {
                debug!(from = %cur.pixel_format(), to = %pixel_format, "unsupported target format");
                None
            }
        }
    }

    fn existing(&self, like: &Image, pixel_format: PixelFormat) -> Option<Arc<Image>> {
        self.state
            .images
            .iter()
            .find(|i| i.is_format(like.width(), like.height(), pixel_format))
            .cloned()
    }

    fn to_bgr(&mut self, cur: Arc<Image>) -> Option<Arc<Image>> {
        if cur.pixel_format() == PixelFormat::Bgr {
            return Some(cur);
        }
        if let Some(found) = self.existing(&cur, PixelFormat::Bgr) {
            return Some(found);
        }
        match cur.pixel_format() {
            PixelFormat::Yuyv
            | PixelFormat::Uyvy
            | PixelFormat::Rgb565
            | PixelFormat::Bgra
            | PixelFormat::Gray => self.direct(&cur, PixelFormat::Bgr),
            PixelFormat::Y16 => {
                let gray = self.to_gray(cur)?;
                self.direct(&gray, PixelFormat::Bgr)
            }
            PixelFormat::Mjpeg => self.decode(&cur),
            PixelFormat::Bgr | PixelFormat::Unknown => None,
        }
    }

    fn to_gray(&mut self, cur: Arc<Image>) -> Option<Arc<Image>> {
        if cur.pixel_format() == PixelFormat::Gray {
            return Some(cur);
        }
        if let Some(found) = self.existing(&cur, PixelFormat::Gray) {
            return Some(found);
        }
        match cur.pixel_format() {
            PixelFormat::Yuyv | PixelFormat::Uyvy | PixelFormat::Y16 | PixelFormat::Bgr => {
                self.direct(&cur, PixelFormat::Gray)
            }
            PixelFormat::Rgb565 | PixelFormat::Bgra | PixelFormat::Mjpeg => {
                let bgr = self.to_bgr(cur)?;
                self.direct(&bgr, PixelFormat::Gray)
            }
            PixelFormat::Gray | PixelFormat::Unknown => None,
        }
    }

    fn direct(&mut self, src: &Image, to: PixelFormat) -> Option<Arc<Image>> {
        let size = to.frame_len(src.width(), src.height())?;
        self.step(src, to, src.width(), src.height(), size, |s, d, _| {
            convert_direct(s, d)
        })
    }

    fn decode(&mut self, src: &Image) -> Option<Arc<Image>> {
        let size = PixelFormat::Bgr.frame_len(src.width(), src.height())?;
        self.step(src, PixelFormat::Bgr, src.width(), src.height(), size, |s, d, _| {
            decode_jpeg_to_bgr(s, d)
        })
    }

    fn resize(&mut self, src: &Image, width: u32, height: u32) -> Option<Arc<Image>> {
        let fmt = src.pixel_format();
        let size = fmt.frame_len(width, height)?;
        self.step(src, fmt, width, height, size, |s, d, _| resize(s, d))
    }

    fn compress_bgr(&mut self, src: &Image, quality: i32) -> Option<Arc<Image>> {
        // initial guess only; the encoder grows the buffer as needed
        let size = src.width() as usize * src.height() as usize * 3 / 2;
        self.step(src, PixelFormat::Mjpeg, src.width(), src.height(), size, |s, d, scratch| {
            encode_bgr_jpeg(s, d, quality, scratch)
        })
    }

    fn compress_gray(&mut self, src: &Image, quality: i32) -> Option<Arc<Image>> {
        let size = src.width() as usize * src.height() as usize * 3 / 4;
        self.step(src, PixelFormat::Mjpeg, src.width(), src.height(), size, |s, d, _| {
            encode_gray_jpeg(s, d, quality)
        })
    }

    /// Allocate the destination, run `op`, cache the result. A failed step
    /// hands the destination straight back to the pool.
    fn step<F>(
        &mut self,
        src: &Image,
        to: PixelFormat,
        width: u32,
        height: u32,
        size: usize,
        op: F,
    ) -> Option<Arc<Image>>
    where
        F: FnOnce(&Image, &mut Image, &mut Vec<u8>) -> Result<(), CodecError>,
    {
        let mut dst = self.pool.alloc_image(to, width, height, size);
        if let Err(err) = op(src, &mut dst, &mut self.state.scratch) {
            debug!(%err, from = %src.pixel_format(), to = %to, width, height, "image conversion failed");
            self.pool.release_image(dst);
            return None;
        }
        trace!(from = %src.pixel_format(), to = %to, width, height, bytes = dst.len(), "cached variant");
        let dst = Arc::new(dst);
        self.state.images.push(Arc::clone(&dst));
        Some(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Frame, SourcePool};
    use crate::time::TimeSource;
    use prism_core::prelude::*;
    use std::sync::Arc;

    fn frame_of(pool: &Arc<SourcePool>, fmt: PixelFormat, w: u32, h: u32, fill: u8) -> Frame {
        let len = fmt.frame_len(w, h).unwrap();
        let mut image = pool.alloc_image(fmt, w, h, len);
        image.as_mut_slice().fill(fill);
        Frame::with_image(pool, image, 1, TimeSource::Unknown)
    }

    fn formats(frame: &Frame) -> Vec<PixelFormat> {
        let state = frame.envelope().unwrap().state.lock();
        state.images.iter().map(|i| i.pixel_format()).collect()
    }

    #[test]
    fn y16_to_bgr_goes_through_gray() {
        let pool = Arc::new(SourcePool::new());
        let frame = frame_of(&pool, PixelFormat::Y16, 4, 4, 0x40);
        frame.get_image(4, 4, PixelFormat::Bgr).unwrap();
        assert_eq!(
            formats(&frame),
            vec![PixelFormat::Y16, PixelFormat::Gray, PixelFormat::Bgr]
        );
    }

    #[test]
    fn cached_bgr_is_reused_as_hub() {
        let pool = Arc::new(SourcePool::new());
        let frame = frame_of(&pool, PixelFormat::Yuyv, 4, 4, 128);
        frame.get_image(4, 4, PixelFormat::Bgr).unwrap();
        frame.get_image(4, 4, PixelFormat::Rgb565).unwrap();
        frame.get_image(4, 4, PixelFormat::Bgra).unwrap();
        assert_eq!(
            formats(&frame),
            vec![
                PixelFormat::Yuyv,
                PixelFormat::Bgr,
                PixelFormat::Rgb565,
                PixelFormat::Bgra
            ]
        );
    }

    #[test]
    fn gray_compresses_without_bgr_hub() {
        let pool = Arc::new(SourcePool::new());
        let frame = frame_of(&pool, PixelFormat::Gray, 16, 16, 90);
        let jpeg = frame.get_image_mjpeg(16, 16, -1, 70).unwrap();
        assert_eq!(jpeg.jpeg_quality(), 70);
        assert_eq!(formats(&frame), vec![PixelFormat::Gray, PixelFormat::Mjpeg]);
    }

    #[test]
    fn jpeg_source_is_decoded_then_resized() {
        let pool = Arc::new(SourcePool::new());
        let bgr = frame_of(&pool, PixelFormat::Bgr, 16, 16, 100);
        let jpeg = bgr.get_image_mjpeg(16, 16, 90, 90).unwrap();
        let mut copy = pool.alloc_image(PixelFormat::Mjpeg, 16, 16, jpeg.len());
        copy.as_mut_slice().copy_from_slice(jpeg.as_slice());
        let camera = Frame::with_image(&pool, copy, 2, TimeSource::Unknown);

        let gray = camera.get_image(8, 8, PixelFormat::Gray).unwrap();
        assert_eq!((gray.width(), gray.height()), (8, 8));
        assert_eq!(
            formats(&camera),
            vec![
                PixelFormat::Mjpeg,
                PixelFormat::Bgr,
                PixelFormat::Bgr,
                PixelFormat::Gray
            ]
        );
    }

    #[test]
    fn recompression_respects_quality_tolerance() {
        let pool = Arc::new(SourcePool::new());
        let frame = frame_of(&pool, PixelFormat::Bgr, 16, 16, 30);
        let q80 = frame.get_image_mjpeg(16, 16, 80, 80).unwrap();
        let close = frame.get_image_mjpeg(16, 16, 84, 84).unwrap();
        assert!(Arc::ptr_eq(&q80, &close));
        let far = frame.get_image_mjpeg(16, 16, 40, 40).unwrap();
        assert_eq!(far.jpeg_quality(), 40);
        assert_eq!(frame.image_count(), 3);
    }

    #[test]
    fn corrupt_jpeg_yields_none_and_returns_buffer() {
        let pool = Arc::new(SourcePool::new());
        let mut bad = pool.alloc_image(PixelFormat::Mjpeg, 8, 8, 4);
        bad.as_mut_slice().copy_from_slice(&[0xff, 0xd8, 0x00, 0x00]);
        let frame = Frame::with_image(&pool, bad, 1, TimeSource::Unknown);
        assert!(frame.get_image(8, 8, PixelFormat::Bgr).is_none());
        assert_eq!(frame.image_count(), 1);
        assert_eq!(pool.stats().free_images, 1);
    }
}
