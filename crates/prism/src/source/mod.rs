//! Sources: the producer side of the frame model.
//!
//! [`SourceCore`] is the shared machinery every source embeds: the buffer
//! pool, the current-frame slot with its condition variable, and the
//! bookkeeping (mode, connection, sink counts). Concrete sources implement
//! the [`Source`] trait on top of it.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use prism_core::prelude::*;
use tracing::debug;

use crate::{
    error::SourceError,
    frame::{Frame, SourcePool},
    settings,
    time::{TimeSource, now},
};

mod pattern;
mod raw;

pub use pattern::PatternSource;
pub use raw::RawSource;

/// Error text published when a timed wait expires.
pub const TIMEOUT_MESSAGE: &str = "timed out getting frame";

struct Slot {
    frame: Frame,
    /// Bumped on every publish; lets waiters that started at time 0 notice
    /// a new frame even if it also carries time 0.
    generation: u64,
}

impl Slot {
    fn is_newer(&self, baseline: u64, generation: u64) -> bool {
        self.frame.time() != baseline || (baseline == 0 && self.generation != generation)
    }
}

/// State and frame plumbing shared by all sources.
pub struct SourceCore {
    name: String,
    description: Mutex<String>,
    connected: AtomicBool,
    mode: Mutex<VideoMode>,
    sinks: AtomicUsize,
    sinks_enabled: AtomicUsize,
    pool: Arc<SourcePool>,
    slot: Mutex<Slot>,
    frame_ready: Condvar,
}

impl SourceCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_pool_config(name, PoolConfig::default())
    }

    pub fn with_pool_config(name: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            name: name.into(),
            description: Mutex::new(String::new()),
            connected: AtomicBool::new(false),
            mode: Mutex::new(VideoMode::default()),
            sinks: AtomicUsize::new(0),
            sinks_enabled: AtomicUsize::new(0),
            pool: Arc::new(SourcePool::with_config(config)),
            slot: Mutex::new(Slot {
                frame: Frame::default(),
                generation: 0,
            }),
            frame_ready: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> String {
        self.description.lock().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.lock() = description.into();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn mode(&self) -> VideoMode {
        *self.mode.lock()
    }

    pub fn set_mode(&self, mode: VideoMode) {
        *self.mode.lock() = mode;
    }

    pub fn num_sinks(&self) -> usize {
        self.sinks.load(Ordering::Acquire)
    }

    pub fn num_sinks_enabled(&self) -> usize {
        self.sinks_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn add_sink(&self) -> usize {
        self.sinks.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn remove_sink(&self) -> usize {
        decrement(&self.sinks)
    }

    pub(crate) fn enable_sink(&self) -> usize {
        self.sinks_enabled.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn disable_sink(&self) -> usize {
        decrement(&self.sinks_enabled)
    }

    /// The pool backing this source's frames.
    pub fn pool(&self) -> &SourcePool {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Check out a writable image to fill and pass to [`put_frame`](Self::put_frame).
    pub fn alloc_image(&self, pixel_format: PixelFormat, width: u32, height: u32, size: usize) -> Image {
        self.pool.alloc_image(pixel_format, width, height, size)
    }

    /// Give back an image that will not be published.
    pub fn release_image(&self, image: Image) {
        self.pool.release_image(image);
    }

    /// Publish `image` as the current frame and wake every waiter.
    pub fn put_frame(&self, image: Image, time: u64, time_source: TimeSource) {
        self.publish(Frame::with_image(&self.pool, image, time, time_source));
    }

    /// Copy raw pixel bytes into a pooled image and publish it.
    pub fn put_frame_bytes(
        &self,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        data: &[u8],
        time: u64,
        time_source: TimeSource,
    ) {
        let mut image = self.alloc_image(pixel_format, width, height, data.len());
        image.as_mut_slice().copy_from_slice(data);
        self.put_frame(image, time, time_source);
    }

    /// Publish an error frame.
    pub fn put_error(&self, message: &str, time: u64) {
        self.publish(Frame::with_error(&self.pool, message, time));
    }

    /// Publish an empty zero-time frame so blocked waiters return.
    pub fn wakeup(&self) {
        self.publish(Frame::wakeup(&self.pool));
    }

    fn publish(&self, frame: Frame) {
        let previous = {
            let mut slot = self.slot.lock();
            slot.generation = slot.generation.wrapping_add(1);
            std::mem::replace(&mut slot.frame, frame)
        };
        self.frame_ready.notify_all();
        // the old frame's images go back to the pool outside the slot lock
        drop(previous);
    }

    /// The current frame, without waiting.
    pub fn get_cur_frame(&self) -> Frame {
        self.slot.lock().frame.clone()
    }

    /// Time of the current frame (0 before the first publish and after a
    /// wakeup).
    pub fn last_frame_time(&self) -> u64 {
        self.slot.lock().frame.time()
    }

    /// Block until a frame newer than the current one is published.
    pub fn get_next_frame(&self) -> Frame {
        let mut slot = self.slot.lock();
        let baseline = slot.frame.time();
        let generation = slot.generation;
        self.frame_ready
            .wait_while(&mut slot, |s| !s.is_newer(baseline, generation));
        slot.frame.clone()
    }

    /// Like [`get_next_frame`](Self::get_next_frame) but bounded.
    ///
    /// Waits for a frame whose time differs from `last_frame_time` (or from
    /// the current frame when that is 0). On timeout an error frame with
    /// [`TIMEOUT_MESSAGE`] becomes the current frame, so every other waiter
    /// observes the timeout too, and is returned.
    pub fn get_next_frame_timeout(&self, timeout: Duration, last_frame_time: u64) -> Frame {
        let mut slot = self.slot.lock();
        let baseline = if last_frame_time != 0 {
            last_frame_time
        } else {
            slot.frame.time()
        };
        let generation = slot.generation;
        let result = self
            .frame_ready
            .wait_while_for(&mut slot, |s| !s.is_newer(baseline, generation), timeout);
        if !result.timed_out() {
            return slot.frame.clone();
        }

        debug!(source = %self.name, ?timeout, "timed out getting frame");
        let frame = Frame::with_error(&self.pool, TIMEOUT_MESSAGE, now());
        slot.generation = slot.generation.wrapping_add(1);
        let previous = std::mem::replace(&mut slot.frame, frame.clone());
        drop(slot);
        self.frame_ready.notify_all();
        drop(previous);
        frame
    }
}

impl Drop for SourceCore {
    fn drop(&mut self) {
        self.wakeup();
        self.pool.begin_teardown();
    }
}

fn decrement(counter: &AtomicUsize) -> usize {
    let prev = counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
        .unwrap_or(0);
    prev.saturating_sub(1)
}

/// A frame producer.
///
/// Implementors embed a [`SourceCore`] and expose it through
/// [`core`](Self::core); everything else has a default. Camera controls
/// default to [`SourceError::Unsupported`].
pub trait Source: Send + Sync {
    fn core(&self) -> &SourceCore;

    /// Short identifier of the source type, e.g. `"raw"`.
    fn kind(&self) -> &'static str;

    /// Begin producing frames, if the source has its own producer.
    fn start(&self) {}

    /// Switch capture mode. Sources that cannot produce `mode` return
    /// [`SourceError::InvalidMode`].
    fn set_video_mode(&self, mode: VideoMode) -> Result<(), SourceError>;

    /// Called after the number of attached sinks changed.
    fn num_sinks_changed(&self) {}

    /// Called after the number of enabled sinks changed.
    fn num_sinks_enabled_changed(&self) {}

    fn set_brightness(&self, _brightness: i32) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("brightness"))
    }

    fn set_white_balance_auto(&self) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("white balance"))
    }

    fn set_white_balance_hold_current(&self) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("white balance"))
    }

    fn set_white_balance_manual(&self, _value: i32) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("white balance"))
    }

    fn set_exposure_auto(&self) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("exposure"))
    }

    fn set_exposure_hold_current(&self) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("exposure"))
    }

    fn set_exposure_manual(&self, _value: i32) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("exposure"))
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn video_mode(&self) -> VideoMode {
        self.core().mode()
    }

    fn set_pixel_format(&self, pixel_format: PixelFormat) -> Result<(), SourceError> {
        let mode = VideoMode {
            pixel_format,
            ..self.core().mode()
        };
        self.set_video_mode(mode)
    }

    fn set_resolution(&self, width: u32, height: u32) -> Result<(), SourceError> {
        let mode = VideoMode {
            width,
            height,
            ..self.core().mode()
        };
        self.set_video_mode(mode)
    }

    fn set_fps(&self, fps: u32) -> Result<(), SourceError> {
        let mode = VideoMode {
            fps,
            ..self.core().mode()
        };
        self.set_video_mode(mode)
    }

    /// Apply a JSON settings document (see the crate docs for keys).
    fn set_settings_json(&self, json: &str) -> Result<(), SourceError> {
        settings::apply(self, json)
    }

    /// Current mode as a JSON settings document.
    fn settings_json(&self) -> String {
        settings::render(&self.core().mode())
    }

    fn add_sink(&self) {
        self.core().add_sink();
        self.num_sinks_changed();
    }

    fn remove_sink(&self) {
        self.core().remove_sink();
        self.num_sinks_changed();
    }

    fn enable_sink(&self) {
        self.core().enable_sink();
        self.num_sinks_enabled_changed();
    }

    fn disable_sink(&self) {
        self.core().disable_sink();
        self.num_sinks_enabled_changed();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn gray(core: &SourceCore, value: u8) -> Image {
        let mut image = core.alloc_image(PixelFormat::Gray, 2, 2, 4);
        image.as_mut_slice().fill(value);
        image
    }

    #[test]
    fn publish_replaces_current_frame() {
        let core = SourceCore::new("cam");
        assert_eq!(core.last_frame_time(), 0);
        core.put_frame(gray(&core, 1), 10, TimeSource::Unknown);
        core.put_frame(gray(&core, 2), 20, TimeSource::Unknown);
        let cur = core.get_cur_frame();
        assert_eq!(cur.time(), 20);
        assert_eq!(core.pool_stats().free_images, 1);
    }

    #[test]
    fn waiter_sees_next_publish() {
        let core = Arc::new(SourceCore::new("cam"));
        core.put_frame(gray(&core, 1), 5, TimeSource::Unknown);
        let waiter = {
            let core = Arc::clone(&core);
            thread::spawn(move || core.get_next_frame_timeout(Duration::from_secs(5), 5).time())
        };
        thread::sleep(Duration::from_millis(20));
        core.put_frame(gray(&core, 2), 6, TimeSource::Unknown);
        assert_eq!(waiter.join().unwrap(), 6);
    }

    #[test]
    fn wakeup_releases_waiters() {
        let core = Arc::new(SourceCore::new("cam"));
        let waiter = {
            let core = Arc::clone(&core);
            thread::spawn(move || core.get_next_frame())
        };
        while !waiter.is_finished() {
            core.wakeup();
            thread::sleep(Duration::from_millis(5));
        }
        let frame = waiter.join().unwrap();
        assert_eq!(frame.time(), 0);
        assert!(!frame.is_valid());
        assert!(frame.error().is_empty());
    }

    #[test]
    fn explicit_baseline_returns_immediately_when_stale() {
        let core = SourceCore::new("cam");
        core.put_frame(gray(&core, 1), 30, TimeSource::Unknown);
        let frame = core.get_next_frame_timeout(Duration::from_secs(5), 29);
        assert_eq!(frame.time(), 30);
    }

    #[test]
    fn error_frames_are_published() {
        let core = SourceCore::new("cam");
        core.put_error("lost device", 99);
        let cur = core.get_cur_frame();
        assert_eq!(cur.error(), "lost device");
        assert!(!cur.is_valid());
    }

    #[test]
    fn sink_counts_never_underflow() {
        let core = SourceCore::new("cam");
        assert_eq!(core.add_sink(), 1);
        assert_eq!(core.remove_sink(), 0);
        assert_eq!(core.remove_sink(), 0);
        assert_eq!(core.enable_sink(), 1);
        assert_eq!(core.num_sinks_enabled(), 1);
    }

    #[test]
    fn frames_outliving_the_source_are_not_recycled() {
        let core = SourceCore::new("cam");
        core.put_frame(gray(&core, 1), 1, TimeSource::Unknown);
        let held = core.get_cur_frame();
        let pool = Arc::clone(&core.pool);
        drop(core);
        assert!(pool.is_tearing_down());
        drop(held);
        assert_eq!(pool.stats().free_images, 0);
        assert_eq!(pool.stats().free_envelopes, 0);
    }
}
