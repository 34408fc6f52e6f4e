use prism_core::prelude::*;

use super::{Source, SourceCore};
use crate::{
    error::SourceError,
    time::{TimeSource, now},
};

/// A source fed directly by application code.
///
/// # Example
/// ```rust
/// use prism::prelude::*;
///
/// let source = RawSource::new("injected", VideoMode::new(PixelFormat::Gray, 2, 2, 30));
/// source.put_frame(PixelFormat::Gray, 2, 2, &[0, 64, 128, 255]);
///
/// let frame = source.core().get_cur_frame();
/// let bgr = frame.get_image(2, 2, PixelFormat::Bgr).unwrap();
/// assert_eq!(&bgr.as_slice()[3..6], &[64, 64, 64]);
/// ```
pub struct RawSource {
    core: SourceCore,
}

impl RawSource {
    /// A connected source advertising `mode`.
    pub fn new(name: impl Into<String>, mode: VideoMode) -> Self {
        let core = SourceCore::new(name);
        core.set_mode(mode);
        core.set_connected(true);
        Self { core }
    }

    /// Copy `data` into a pooled image and publish it, stamped now.
    pub fn put_frame(&self, pixel_format: PixelFormat, width: u32, height: u32, data: &[u8]) {
        self.core
            .put_frame_bytes(pixel_format, width, height, data, now(), TimeSource::Unknown);
    }

    /// Publish an image previously taken from [`SourceCore::alloc_image`].
    pub fn put_image(&self, image: Image) {
        self.core.put_frame(image, now(), TimeSource::Unknown);
    }

    /// Publish an error frame so consumers can report `message`.
    pub fn notify_error(&self, message: &str) {
        self.core.put_error(message, now());
    }

    pub fn set_connected(&self, connected: bool) {
        self.core.set_connected(connected);
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.core.set_description(description);
    }
}

impl Source for RawSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "raw"
    }

    fn set_video_mode(&self, mode: VideoMode) -> Result<(), SourceError> {
        self.core.set_mode(mode);
        Ok(())
    }
}
