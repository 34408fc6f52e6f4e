//! Synthetic camera that emits a moving test pattern.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;
use prism_codec::prelude::encode_bgr_jpeg;
use prism_core::prelude::*;
use tracing::{debug, info, warn};

use super::{Source, SourceCore};
use crate::{
    error::SourceError,
    time::{TimeSource, now},
};

const DEFAULT_BRIGHTNESS: i32 = 50;
const PATTERN_JPEG_QUALITY: i32 = 90;
const FALLBACK_FPS: u32 = 30;

/// Virtual camera producing diagonal color bars that scroll one step per
/// frame, in whatever pixel format its video mode asks for.
///
/// Frames are produced either on demand with [`tick`](Self::tick) or by a
/// worker thread started with [`Source::start`].
///
/// # Example
/// ```rust
/// use prism::prelude::*;
///
/// let source = PatternSource::new("bars", VideoMode::new(PixelFormat::Yuyv, 8, 4, 30));
/// source.tick().unwrap();
/// let frame = source.core().get_cur_frame();
/// assert_eq!(frame.original_pixel_format(), PixelFormat::Yuyv);
/// assert!(frame.get_image(8, 4, PixelFormat::Bgr).is_some());
/// ```
pub struct PatternSource {
    inner: Arc<PatternInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct PatternInner {
    core: SourceCore,
    counter: AtomicU64,
    brightness: AtomicI32,
    active: AtomicBool,
    scratch: Mutex<Vec<u8>>,
}

impl PatternSource {
    pub fn new(name: impl Into<String>, mode: VideoMode) -> Self {
        let core = SourceCore::new(name);
        core.set_mode(mode);
        core.set_description("test pattern");
        Self {
            inner: Arc::new(PatternInner {
                core,
                counter: AtomicU64::new(0),
                brightness: AtomicI32::new(DEFAULT_BRIGHTNESS),
                active: AtomicBool::new(false),
                scratch: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Render and publish one frame; returns its timestamp.
    pub fn tick(&self) -> Result<u64, SourceError> {
        self.inner.tick()
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Stop the worker thread, if any, and wait for it to exit.
    pub fn stop(&self) {
        self.inner.active.store(false, Ordering::Release);
        let worker = self.worker.lock().take();
        if let Some(handle) = worker
            && handle.join().is_err()
        {
            warn!(source = self.inner.core.name(), "pattern worker panicked");
        }
        self.inner.core.set_connected(false);
    }
}

impl Drop for PatternSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PatternInner {
    fn tick(&self) -> Result<u64, SourceError> {
        let mode = self.core.mode();
        if !is_renderable(&mode) {
            return Err(SourceError::InvalidMode(mode));
        }
        let step = self.counter.fetch_add(1, Ordering::Relaxed);
        let gain = self.brightness.load(Ordering::Relaxed);
        let image = self.render(&mode, step, gain);
        let time = now();
        self.core.put_frame(image, time, TimeSource::FrameDequeue);
        Ok(time)
    }

    fn render(&self, mode: &VideoMode, step: u64, gain: i32) -> Image {
        let (w, h) = (mode.width, mode.height);
        let bars = Bars { width: w, height: h, step, gain };
        let fmt = if mode.pixel_format.is_compressed() {
            PixelFormat::Bgr
        } else {
            mode.pixel_format
        };
        let len = fmt.frame_len(w, h).unwrap_or(0);
        let mut image = self.core.alloc_image(fmt, w, h, len);
        bars.fill(fmt, image.as_mut_slice());
        if fmt == mode.pixel_format {
            return image;
        }

        let mut jpeg = self.core.alloc_image(PixelFormat::Mjpeg, w, h, len / 2);
        let mut scratch = self.scratch.lock();
        match encode_bgr_jpeg(&image, &mut jpeg, PATTERN_JPEG_QUALITY, &mut scratch) {
            Ok(()) => {
                // a camera would not report a quality for its own JPEGs
                jpeg.set_jpeg_quality(QUALITY_UNSET);
                self.core.release_image(image);
                jpeg
            }
            Err(err) => {
                debug!(%err, "pattern compression failed, publishing raw bars");
                self.core.release_image(jpeg);
                image
            }
        }
    }
}

fn is_renderable(mode: &VideoMode) -> bool {
    mode.pixel_format != PixelFormat::Unknown && mode.width > 0 && mode.height > 0
}

/// Diagonal bars; `gain` scales intensity with 50 as neutral.
struct Bars {
    width: u32,
    height: u32,
    step: u64,
    gain: i32,
}

impl Bars {
    fn bgr(&self, x: u32, y: u32) -> [u8; 3] {
        let phase = (x as u64 + y as u64 + self.step * 4) % 256;
        let r = phase as i32;
        let g = (y * 255 / self.height.max(1)) as i32;
        let b = 255 - r;
        let scale = |v: i32| (v * self.gain / DEFAULT_BRIGHTNESS).clamp(0, 255) as u8;
        [scale(b), scale(g), scale(r)]
    }

    fn fill(&self, fmt: PixelFormat, out: &mut [u8]) {
        let (w, h) = (self.width, self.height);
        let Some(bpp) = fmt.bytes_per_pixel() else {
            return;
        };
        for (y, row) in out.chunks_exact_mut(w as usize * bpp).take(h as usize).enumerate() {
            let y = y as u32;
            for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
                let x = x as u32;
                let [b, g, r] = self.bgr(x, y);
                let luma = ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8;
                match fmt {
                    PixelFormat::Bgr => px.copy_from_slice(&[b, g, r]),
                    PixelFormat::Bgra => px.copy_from_slice(&[b, g, r, u8::MAX]),
                    PixelFormat::Gray => px[0] = luma,
                    PixelFormat::Y16 => px.copy_from_slice(&((luma as u16) * 257).to_le_bytes()),
                    PixelFormat::Rgb565 => {
                        let v = (((r as u16) >> 3) << 11) | (((g as u16) >> 2) << 5) | ((b as u16) >> 3);
                        px.copy_from_slice(&v.to_le_bytes());
                    }
                    PixelFormat::Yuyv | PixelFormat::Uyvy => {
                        // even pixels carry U, odd pixels carry V
                        let diff = if x % 2 == 0 {
                            (b as i32 - luma as i32) * 144 / 256
                        } else {
                            (r as i32 - luma as i32) * 183 / 256
                        };
                        let chroma = (diff + 128).clamp(0, 255) as u8;
                        if fmt == PixelFormat::Yuyv {
                            px.copy_from_slice(&[luma, chroma]);
                        } else {
                            px.copy_from_slice(&[chroma, luma]);
                        }
                    }
                    PixelFormat::Mjpeg | PixelFormat::Unknown => {}
                }
            }
        }
    }
}

impl Source for PatternSource {
    fn core(&self) -> &SourceCore {
        &self.inner.core
    }

    fn kind(&self) -> &'static str {
        "pattern"
    }

    /// Spawn the producer thread at the mode's frame rate.
    fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.inner.active.store(true, Ordering::Release);
        self.inner.core.set_connected(true);
        let inner = Arc::clone(&self.inner);
        info!(source = inner.core.name(), "pattern source started");
        *worker = Some(thread::spawn(move || {
            while inner.active.load(Ordering::Acquire) {
                if let Err(err) = inner.tick() {
                    debug!(source = inner.core.name(), %err, "pattern tick failed");
                }
                let fps = match inner.core.mode().fps {
                    0 => FALLBACK_FPS,
                    fps => fps,
                };
                thread::sleep(Duration::from_micros(1_000_000 / fps as u64));
            }
        }));
    }

    fn set_video_mode(&self, mode: VideoMode) -> Result<(), SourceError> {
        if !is_renderable(&mode) {
            return Err(SourceError::InvalidMode(mode));
        }
        self.inner.core.set_mode(mode);
        Ok(())
    }

    fn set_brightness(&self, brightness: i32) -> Result<(), SourceError> {
        self.inner
            .brightness
            .store(brightness.clamp(0, 100), Ordering::Relaxed);
        Ok(())
    }
}
