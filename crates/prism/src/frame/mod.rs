//! Frames: one captured instant, cached in every format a consumer has asked
//! for.
//!
//! A [`Frame`] is a cheap, cloneable handle. The producer's image is the
//! first entry of the frame's image list; every variant synthesized later
//! (decoded, resized, converted, recompressed) is appended to the same list
//! so the next consumer asking for it gets the cached copy. When the last
//! handle is dropped the images and the envelope go back to the source's
//! pool.

use std::{fmt, sync::Arc};

use image::RgbImage;
use parking_lot::Mutex;
use prism_core::prelude::*;
use smallvec::SmallVec;

use crate::time::TimeSource;

mod convert;
mod search;

use convert::Converter;

/// JPEG quality used when the caller leaves it unset.
pub const DEFAULT_JPEG_QUALITY: i32 = 80;

/// Pool shared by a source and every frame it publishes.
pub type SourcePool = FramePool<FrameEnvelope>;

/// Pooled per-frame storage. Opaque outside this crate.
#[derive(Default)]
pub struct FrameEnvelope {
    time: u64,
    time_source: TimeSource,
    error: String,
    state: Mutex<EnvelopeState>,
}

#[derive(Default)]
struct EnvelopeState {
    images: SmallVec<[Arc<Image>; 4]>,
    /// Channel-swap buffer reused by JPEG compression.
    scratch: Vec<u8>,
}

/// Shared handle to a captured frame.
///
/// The default value is an empty frame with no envelope at all.
#[derive(Clone, Default)]
pub struct Frame {
    handle: Option<Arc<FrameHandle>>,
}

struct FrameHandle {
    pool: Arc<SourcePool>,
    envelope: Option<Box<FrameEnvelope>>,
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        let Some(mut envelope) = self.envelope.take() else {
            return;
        };
        let images = std::mem::take(&mut envelope.state.get_mut().images);
        for image in images {
            // images still held by a consumer are freed when it lets go
            if let Ok(image) = Arc::try_unwrap(image) {
                self.pool.release_image(image);
            }
        }
        envelope.error.clear();
        self.pool.release_envelope(envelope);
    }
}

impl Frame {
    fn wrap(pool: &Arc<SourcePool>, envelope: Box<FrameEnvelope>) -> Self {
        Self {
            handle: Some(Arc::new(FrameHandle {
                pool: Arc::clone(pool),
                envelope: Some(envelope),
            })),
        }
    }

    fn envelope_from(pool: &SourcePool, time: u64, time_source: TimeSource) -> Box<FrameEnvelope> {
        let mut envelope = pool.alloc_envelope();
        envelope.time = time;
        envelope.time_source = time_source;
        envelope.error.clear();
        envelope
    }

    /// A successful frame wrapping the producer's image.
    pub(crate) fn with_image(
        pool: &Arc<SourcePool>,
        image: Image,
        time: u64,
        time_source: TimeSource,
    ) -> Self {
        let mut envelope = Self::envelope_from(pool, time, time_source);
        envelope.state.get_mut().images.push(Arc::new(image));
        Self::wrap(pool, envelope)
    }

    /// An error frame; carries no images.
    pub(crate) fn with_error(pool: &Arc<SourcePool>, message: &str, time: u64) -> Self {
        let mut envelope = Self::envelope_from(pool, time, TimeSource::Unknown);
        envelope.error.push_str(message);
        Self::wrap(pool, envelope)
    }

    /// A zero-time, image-less frame used to kick waiters.
    pub(crate) fn wakeup(pool: &Arc<SourcePool>) -> Self {
        Self::wrap(pool, Self::envelope_from(pool, 0, TimeSource::Unknown))
    }

    fn envelope(&self) -> Option<&FrameEnvelope> {
        self.handle.as_ref()?.envelope.as_deref()
    }

    /// Capture time in microseconds; 0 for empty and wakeup frames.
    pub fn time(&self) -> u64 {
        self.envelope().map_or(0, |e| e.time)
    }

    pub fn time_source(&self) -> TimeSource {
        self.envelope().map_or(TimeSource::Unknown, |e| e.time_source)
    }

    /// Error text; empty on success and for wakeup frames.
    pub fn error(&self) -> &str {
        self.envelope().map_or("", |e| e.error.as_str())
    }

    /// Holds at least one image and no error.
    pub fn is_valid(&self) -> bool {
        self.envelope()
            .is_some_and(|e| e.error.is_empty() && !e.state.lock().images.is_empty())
    }

    /// Number of cached variants, the producer's image included.
    pub fn image_count(&self) -> usize {
        self.envelope().map_or(0, |e| e.state.lock().images.len())
    }

    fn original(&self) -> Option<Arc<Image>> {
        self.envelope()?.state.lock().images.first().cloned()
    }

    pub fn original_width(&self) -> u32 {
        self.original().map_or(0, |i| i.width())
    }

    pub fn original_height(&self) -> u32 {
        self.original().map_or(0, |i| i.height())
    }

    pub fn original_pixel_format(&self) -> PixelFormat {
        self.original().map_or(PixelFormat::Unknown, |i| i.pixel_format())
    }

    /// Cached image closest in size to `width x height`, any format.
    pub fn nearest_image(&self, width: u32, height: u32) -> Option<Arc<Image>> {
        let state = self.envelope()?.state.lock();
        search::nearest_by_size(&state.images, width, height).map(|idx| Arc::clone(&state.images[idx]))
    }

    /// The frame as `width x height` in `pixel_format`, synthesizing and
    /// caching it if needed.
    ///
    /// Returns `None` for empty or error frames and when no conversion route
    /// exists (packed YUV cannot be produced, only consumed).
    pub fn get_image(&self, width: u32, height: u32, pixel_format: PixelFormat) -> Option<Arc<Image>> {
        self.get_image_impl(width, height, pixel_format, QUALITY_UNSET, DEFAULT_JPEG_QUALITY)
    }

    /// The frame as a JPEG. A cached JPEG within the quality tolerance of
    /// `required_quality` is reused; `-1` accepts any cached quality. New
    /// compressions use `required_quality`, or `default_quality` when unset.
    pub fn get_image_mjpeg(
        &self,
        width: u32,
        height: u32,
        required_quality: i32,
        default_quality: i32,
    ) -> Option<Arc<Image>> {
        self.get_image_impl(width, height, PixelFormat::Mjpeg, required_quality, default_quality)
    }

    fn get_image_impl(
        &self,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        required_quality: i32,
        default_quality: i32,
    ) -> Option<Arc<Image>> {
        let handle = self.handle.as_ref()?;
        let envelope = handle.envelope.as_deref()?;
        let mut state = envelope.state.lock();
        Converter::new(&handle.pool, &mut state).get_image(
            width,
            height,
            pixel_format,
            required_quality,
            default_quality,
        )
    }

    /// Copy out as an RGB image for use with the `image` crate.
    pub fn to_rgb_image(&self, width: u32, height: u32) -> Option<RgbImage> {
        let bgr = self.get_image(width, height, PixelFormat::Bgr)?;
        let len = PixelFormat::Bgr.frame_len(width, height)?;
        let mut rgb = Vec::with_capacity(len);
        for px in bgr.as_slice().get(..len)?.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        RgbImage::from_raw(width, height, rgb)
    }

    /// Replace `dst` with tightly packed BGR pixels. Returns `false` when no
    /// BGR image could be produced.
    pub fn copy_bgr_into(&self, dst: &mut Vec<u8>, width: u32, height: u32) -> bool {
        let Some(bgr) = self.get_image(width, height, PixelFormat::Bgr) else {
            return false;
        };
        dst.clear();
        dst.extend_from_slice(bgr.as_slice());
        true
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("time", &self.time())
            .field("error", &self.error())
            .field("images", &self.image_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<SourcePool> {
        Arc::new(SourcePool::new())
    }

    fn yuyv_frame(pool: &Arc<SourcePool>, w: u32, h: u32) -> Frame {
        let len = PixelFormat::Yuyv.frame_len(w, h).unwrap();
        let mut image = pool.alloc_image(PixelFormat::Yuyv, w, h, len);
        for (i, px) in image.as_mut_slice().chunks_exact_mut(2).enumerate() {
            px[0] = (i % 200) as u8 + 16;
            px[1] = 128;
        }
        Frame::with_image(pool, image, 42, TimeSource::FrameDequeue)
    }

    #[test]
    fn kinds_of_frames() {
        let pool = pool();
        let ok = yuyv_frame(&pool, 4, 2);
        assert!(ok.is_valid());
        assert_eq!(ok.time(), 42);
        assert_eq!(ok.time_source(), TimeSource::FrameDequeue);
        assert_eq!(ok.original_pixel_format(), PixelFormat::Yuyv);
        assert_eq!((ok.original_width(), ok.original_height()), (4, 2));

        let err = Frame::with_error(&pool, "boom", 7);
        assert!(!err.is_valid());
        assert_eq!(err.error(), "boom");
        assert_eq!(err.time(), 7);

        let wake = Frame::wakeup(&pool);
        assert!(!wake.is_valid());
        assert_eq!(wake.time(), 0);
        assert_eq!(wake.error(), "");

        let empty = Frame::default();
        assert!(!empty.is_valid());
        assert!(empty.get_image(4, 2, PixelFormat::Bgr).is_none());
    }

    #[test]
    fn repeated_request_hits_cache() {
        let pool = pool();
        let frame = yuyv_frame(&pool, 8, 4);
        let first = frame.get_image(8, 4, PixelFormat::Gray).unwrap();
        let count = frame.image_count();
        let allocations = pool.stats().allocations;

        let second = frame.get_image(8, 4, PixelFormat::Gray).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(frame.image_count(), count);
        assert_eq!(pool.stats().allocations, allocations);
    }

    #[test]
    fn packed_yuv_targets_are_unsupported() {
        let pool = pool();
        let frame = yuyv_frame(&pool, 4, 2);
        assert!(frame.get_image(4, 2, PixelFormat::Uyvy).is_none());
        assert!(frame.get_image(2, 2, PixelFormat::Yuyv).is_some());
        assert!(frame.get_image(4, 2, PixelFormat::Unknown).is_none());
    }

    #[test]
    fn dropping_last_handle_recycles_everything() {
        let pool = pool();
        let frame = yuyv_frame(&pool, 4, 2);
        frame.get_image(4, 2, PixelFormat::Bgr).unwrap();
        let copies: Vec<Frame> = (0..3).map(|_| frame.clone()).collect();
        drop(frame);
        assert_eq!(pool.stats().free_images, 0);
        drop(copies);
        let stats = pool.stats();
        assert_eq!(stats.free_images, 2);
        assert_eq!(stats.free_envelopes, 1);
    }

    #[test]
    fn held_images_are_not_recycled() {
        let pool = pool();
        let frame = yuyv_frame(&pool, 4, 2);
        let bgr = frame.get_image(4, 2, PixelFormat::Bgr).unwrap();
        drop(frame);
        assert_eq!(pool.stats().free_images, 1);
        assert_eq!(bgr.pixel_format(), PixelFormat::Bgr);
    }

    #[test]
    fn rgb_copy_out_swaps_channels() {
        let pool = pool();
        let mut image = pool.alloc_image(PixelFormat::Bgr, 2, 1, 6);
        image.as_mut_slice().copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        let frame = Frame::with_image(&pool, image, 1, TimeSource::Unknown);

        let rgb = frame.to_rgb_image(2, 1).unwrap();
        assert_eq!(rgb.as_raw(), &vec![3, 2, 1, 6, 5, 4]);

        let mut out = vec![9; 32];
        assert!(frame.copy_bgr_into(&mut out, 2, 1));
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn nearest_image_ignores_format() {
        let pool = pool();
        let frame = yuyv_frame(&pool, 8, 8);
        frame.get_image(4, 4, PixelFormat::Gray).unwrap();
        let near = frame.nearest_image(3, 3).unwrap();
        assert_eq!((near.width(), near.height()), (4, 4));
    }
}
