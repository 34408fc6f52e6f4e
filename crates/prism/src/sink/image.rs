use std::{thread, time::Duration};

use parking_lot::Mutex;
use prism_core::prelude::*;
use tracing::trace;

use super::{Sink, SinkCore};
use crate::{error::SinkError, frame::Frame};

const DISCONNECTED_BACKOFF: Duration = Duration::from_secs(1);
const BAD_FRAME_BACKOFF: Duration = Duration::from_millis(20);

/// Metadata of a frame copied out by [`ImageSink::grab_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub time: u64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

/// Sink that copies each frame, in a fixed pixel format, into caller memory.
///
/// # Example
/// ```rust
/// use std::{sync::Arc, time::Duration};
/// use prism::prelude::*;
///
/// let source = Arc::new(RawSource::new("cam", VideoMode::new(PixelFormat::Gray, 2, 1, 30)));
/// let sink = ImageSink::new("grabber");
/// sink.set_source(Some(source.clone()));
///
/// let producer = {
///     let source = source.clone();
///     std::thread::spawn(move || {
///         for _ in 0..50 {
///             source.put_frame(PixelFormat::Gray, 2, 1, &[10, 20]);
///             std::thread::sleep(Duration::from_millis(10));
///         }
///     })
/// };
/// let mut pixels = Vec::new();
/// let info = sink.grab_frame(&mut pixels, Duration::from_secs(2)).unwrap();
/// assert_eq!((info.width, info.height), (2, 1));
/// assert_eq!(pixels, [10, 10, 10, 20, 20, 20]);
/// producer.join().unwrap();
/// ```
pub struct ImageSink {
    core: SinkCore,
    pixel_format: Mutex<PixelFormat>,
    error: Mutex<String>,
}

impl ImageSink {
    /// A sink delivering BGR.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_pixel_format(name, PixelFormat::Bgr)
    }

    pub fn with_pixel_format(name: impl Into<String>, pixel_format: PixelFormat) -> Self {
        Self {
            core: SinkCore::new(name),
            pixel_format: Mutex::new(pixel_format),
            error: Mutex::new(String::new()),
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        *self.pixel_format.lock()
    }

    pub fn set_pixel_format(&self, pixel_format: PixelFormat) {
        *self.pixel_format.lock() = pixel_format;
    }

    /// Message of the last failed grab.
    pub fn error(&self) -> String {
        self.error.lock().clone()
    }

    /// Wait up to `timeout` for the next frame and copy it into `dst`.
    ///
    /// On failure the sink sleeps briefly before returning (1 s when the
    /// source is disconnected, 20 ms for a bad frame) so callers can simply
    /// loop.
    pub fn grab_frame(&self, dst: &mut Vec<u8>, timeout: Duration) -> Result<FrameInfo, SinkError> {
        self.grab(dst, Some(timeout))
    }

    /// As [`grab_frame`](Self::grab_frame) but waits indefinitely.
    pub fn grab_frame_no_timeout(&self, dst: &mut Vec<u8>) -> Result<FrameInfo, SinkError> {
        self.grab(dst, None)
    }

    fn grab(&self, dst: &mut Vec<u8>, timeout: Option<Duration>) -> Result<FrameInfo, SinkError> {
        self.core.set_enabled(true);
        let result = self.try_grab(dst, timeout);
        match &result {
            Ok(info) => trace!(sink = self.core.name(), time = info.time, "grabbed frame"),
            Err(err) => *self.error.lock() = err.to_string(),
        }
        result
    }

    fn try_grab(&self, dst: &mut Vec<u8>, timeout: Option<Duration>) -> Result<FrameInfo, SinkError> {
        let source = self.core.source().ok_or(SinkError::NoSource)?;
        if !source.core().is_connected() {
            thread::sleep(DISCONNECTED_BACKOFF);
            return Err(SinkError::Disconnected);
        }
        let frame = match timeout {
            Some(timeout) => source.core().get_next_frame_timeout(timeout, 0),
            None => source.core().get_next_frame(),
        };
        self.copy_out(&frame, dst).inspect_err(|_| thread::sleep(BAD_FRAME_BACKOFF))
    }

    fn copy_out(&self, frame: &Frame, dst: &mut Vec<u8>) -> Result<FrameInfo, SinkError> {
        if !frame.is_valid() {
            return Err(match frame.error() {
                "" => SinkError::Conversion,
                msg => SinkError::Frame(msg.to_owned()),
            });
        }
        let (width, height) = (frame.original_width(), frame.original_height());
        let pixel_format = self.pixel_format();
        let image = frame
            .get_image(width, height, pixel_format)
            .ok_or(SinkError::Conversion)?;
        dst.clear();
        dst.extend_from_slice(image.as_slice());
        Ok(FrameInfo {
            time: frame.time(),
            width,
            height,
            pixel_format,
        })
    }
}

impl Sink for ImageSink {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "image"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::source::{RawSource, Source};

    #[test]
    fn no_source_is_reported() {
        let sink = ImageSink::new("sink");
        let mut dst = Vec::new();
        assert_eq!(
            sink.grab_frame(&mut dst, Duration::from_millis(10)),
            Err(SinkError::NoSource)
        );
        assert_eq!(sink.error(), "no source connected");
    }

    #[test]
    fn timeout_surfaces_frame_error() {
        let source = Arc::new(RawSource::new("cam", VideoMode::default()));
        let sink = ImageSink::new("sink");
        sink.set_source(Some(source.clone()));
        let mut dst = Vec::new();
        let err = sink
            .grab_frame(&mut dst, Duration::from_millis(30))
            .unwrap_err();
        assert_eq!(err, SinkError::Frame(crate::source::TIMEOUT_MESSAGE.into()));
        assert_eq!(source.core().num_sinks_enabled(), 1);
    }

    #[test]
    fn copy_out_uses_configured_format() {
        let source = RawSource::new("cam", VideoMode::default());
        source.put_frame(PixelFormat::Bgr, 1, 2, &[0, 0, 255, 255, 255, 255]);
        let frame = source.core().get_cur_frame();
        let sink = ImageSink::with_pixel_format("sink", PixelFormat::Gray);
        let mut dst = vec![9; 16];
        let info = sink.copy_out(&frame, &mut dst).unwrap();
        assert_eq!(info.pixel_format, PixelFormat::Gray);
        assert_eq!((info.width, info.height), (1, 2));
        assert_eq!(dst, [77, 255]);
    }

    #[test]
    fn unconvertible_request_is_a_conversion_error() {
        let source = RawSource::new("cam", VideoMode::default());
        source.put_frame(PixelFormat::Gray, 2, 2, &[1, 2, 3, 4]);
        let frame = source.core().get_cur_frame();
        let sink = ImageSink::with_pixel_format("sink", PixelFormat::Yuyv);
        assert_eq!(
            sink.copy_out(&frame, &mut Vec::new()),
            Err(SinkError::Conversion)
        );
    }
}
