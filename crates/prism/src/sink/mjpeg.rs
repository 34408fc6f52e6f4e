//! Motion-JPEG streaming loop, independent of the transport that carries it.

use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use prism_codec::prelude::{insert_dht, jpeg_needs_dht};
use prism_core::prelude::QUALITY_UNSET;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{Sink, SinkCore};
use crate::{error::SinkError, frame::DEFAULT_JPEG_QUALITY};

const FRAME_TIMEOUT: Duration = Duration::from_millis(225);
const NO_SOURCE_BACKOFF: Duration = Duration::from_millis(200);
const BAD_FRAME_BACKOFF: Duration = Duration::from_millis(20);
const FPS_BACKOFF: Duration = Duration::from_millis(10);

/// Per-stream output options.
///
/// Zero width/height keep the source resolution, zero fps disables rate
/// limiting. `compression` of `-1` accepts any cached JPEG and compresses
/// new ones at `default_compression`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MjpegSettings {
    pub width: u32,
    pub height: u32,
    pub compression: i32,
    pub default_compression: i32,
    pub fps: u32,
}

impl Default for MjpegSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            compression: QUALITY_UNSET,
            default_compression: DEFAULT_JPEG_QUALITY,
            fps: 0,
        }
    }
}

impl MjpegSettings {
    /// Minimum spacing between emitted frames in microseconds, with a 1 ms
    /// allowance for capture jitter.
    fn time_per_frame(&self) -> u64 {
        if self.fps == 0 {
            return 0;
        }
        let period = 1_000_000 / self.fps as u64;
        if period >= 1000 { period - 1000 } else { period }
    }
}

/// What the stream loop hands to its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent<'a> {
    /// Nothing to send this cycle; a transport may write a keep-alive.
    KeepAlive,
    /// A complete JPEG with Huffman tables.
    Frame { jpeg: &'a [u8], time: u64 },
}

/// Sink producing a motion-JPEG stream.
pub struct MjpegSink {
    core: SinkCore,
    active: AtomicBool,
    settings: Mutex<MjpegSettings>,
}

impl MjpegSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, MjpegSettings::default())
    }

    pub fn with_settings(name: impl Into<String>, settings: MjpegSettings) -> Self {
        Self {
            core: SinkCore::new(name),
            active: AtomicBool::new(true),
            settings: Mutex::new(settings),
        }
    }

    pub fn settings(&self) -> MjpegSettings {
        *self.settings.lock()
    }

    pub fn set_settings(&self, settings: MjpegSettings) {
        *self.settings.lock() = settings;
    }

    pub fn set_resolution(&self, width: u32, height: u32) {
        let mut settings = self.settings.lock();
        settings.width = width;
        settings.height = height;
    }

    pub fn set_compression(&self, quality: i32) {
        self.settings.lock().compression = quality;
    }

    pub fn set_default_compression(&self, quality: i32) {
        self.settings.lock().default_compression = quality;
    }

    pub fn set_fps(&self, fps: u32) {
        self.settings.lock().fps = fps;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Re-arm a stopped sink.
    pub fn start(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// End any running [`stream`](Self::stream) loop.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        if let Some(source) = self.core.source() {
            source.core().wakeup();
        }
    }

    /// Run the stream loop on the calling thread until [`stop`](Self::stop)
    /// is called or `emit` fails.
    ///
    /// Returns `Err(Disabled)` when called on a stopped sink.
    pub fn stream<F>(&self, mut emit: F) -> Result<(), SinkError>
    where
        F: FnMut(StreamEvent<'_>) -> io::Result<()>,
    {
        if !self.is_active() {
            return Err(SinkError::Disabled);
        }
        info!(sink = self.core.name(), "mjpeg stream started");
        self.core.set_enabled(true);
        let result = self.run(&mut emit);
        self.core.set_enabled(false);
        info!(sink = self.core.name(), ?result, "mjpeg stream ended");
        result
    }

    fn run<F>(&self, emit: &mut F) -> Result<(), SinkError>
    where
        F: FnMut(StreamEvent<'_>) -> io::Result<()>,
    {
        let mut repaired = Vec::new();
        let mut last_sent = 0u64;
        while self.is_active() {
            let Some(source) = self.core.source() else {
                emit(StreamEvent::KeepAlive)?;
                thread::sleep(NO_SOURCE_BACKOFF);
                continue;
            };
            let frame = source.core().get_next_frame_timeout(FRAME_TIMEOUT, 0);
            if !self.is_active() {
                break;
            }
            if !frame.is_valid() {
                trace!(sink = self.core.name(), error = frame.error(), "no frame this cycle");
                emit(StreamEvent::KeepAlive)?;
                thread::sleep(BAD_FRAME_BACKOFF);
                continue;
            }

            let settings = self.settings();
            let time_per_frame = settings.time_per_frame();
            if time_per_frame != 0 && frame.time().saturating_sub(last_sent) < time_per_frame {
                thread::sleep(FPS_BACKOFF);
                continue;
            }

            let width = match settings.width {
                0 => frame.original_width(),
                w => w,
            };
            let height = match settings.height {
                0 => frame.original_height(),
                h => h,
            };
            let Some(jpeg) = frame.get_image_mjpeg(
                width,
                height,
                settings.compression,
                settings.default_compression,
            ) else {
                debug!(sink = self.core.name(), width, height, "frame has no jpeg variant");
                thread::sleep(BAD_FRAME_BACKOFF);
                continue;
            };

            let data = match jpeg_needs_dht(jpeg.as_slice()) {
                Some(at) => {
                    insert_dht(jpeg.as_slice(), at, &mut repaired);
                    &repaired[..]
                }
                None => jpeg.as_slice(),
            };
            emit(StreamEvent::Frame {
                jpeg: data,
                time: frame.time(),
            })?;
            last_sent = frame.time();
        }
        Ok(())
    }
}

impl Sink for MjpegSink {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "mjpeg"
    }
}
