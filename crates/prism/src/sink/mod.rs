//! Sinks: consumers that pull frames from one source at a time.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use tracing::debug;

use crate::source::Source;

mod image;
mod mjpeg;

pub use self::image::{FrameInfo, ImageSink};
pub use self::mjpeg::{MjpegSink, MjpegSettings, StreamEvent};

/// Attachment and enable bookkeeping shared by every sink.
///
/// Attaching registers the sink with the source's sink counts (and its
/// enabled count while enabled); swapping or dropping detaches symmetrically.
pub struct SinkCore {
    name: String,
    description: Mutex<String>,
    source: Mutex<Option<Arc<dyn Source>>>,
    enabled: AtomicBool,
}

impl SinkCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Mutex::new(String::new()),
            source: Mutex::new(None),
            enabled: AtomicBool::new(false),
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

    /// Attach to `source`, detaching from any previous one.
    pub fn set_source(&self, source: Option<Arc<dyn Source>>) {
        let mut slot = self.source.lock();
        let enabled = self.is_enabled();
        if let Some(old) = slot.take() {
            if enabled {
                old.disable_sink();
            }
            old.remove_sink();
        }
        if let Some(new) = &source {
            debug!(sink = %self.name, source = new.name(), "attaching sink");
            new.add_sink();
            if enabled {
                new.enable_sink();
            }
        }
        *slot = source;
    }

    pub fn source(&self) -> Option<Arc<dyn Source>> {
        self.source.lock().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Flip the enabled flag, updating the attached source's enabled count
    /// only on an actual change.
    pub fn set_enabled(&self, enabled: bool) {
        let slot = self.source.lock();
        if self.enabled.swap(enabled, Ordering::AcqRel) == enabled {
            return;
        }
        if let Some(source) = slot.as_ref() {
            if enabled {
                source.enable_sink();
            } else {
                source.disable_sink();
            }
        }
    }
}

impl Drop for SinkCore {
    fn drop(&mut self) {
        self.set_source(None);
    }
}

/// Behaviour common to all sinks.
pub trait Sink: Send + Sync {
    fn core(&self) -> &SinkCore;

    /// Short kind identifier, e.g. `"image"`.
    fn kind(&self) -> &'static str;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn set_source(&self, source: Option<Arc<dyn Source>>) {
        self.core().set_source(source);
    }

    fn source(&self) -> Option<Arc<dyn Source>> {
        self.core().source()
    }

    fn set_enabled(&self, enabled: bool) {
        self.core().set_enabled(enabled);
    }
}

#[cfg(test)]
mod tests {
    use prism_core::prelude::*;

    use super::*;
    use crate::source::RawSource;

    fn source() -> Arc<RawSource> {
        Arc::new(RawSource::new("cam", VideoMode::new(PixelFormat::Gray, 2, 2, 30)))
    }

    #[test]
    fn attach_and_enable_update_source_counts() {
        let cam = source();
        let sink = SinkCore::new("sink");
        sink.set_source(Some(cam.clone()));
        assert_eq!(cam.core().num_sinks(), 1);
        assert_eq!(cam.core().num_sinks_enabled(), 0);

        sink.set_enabled(true);
        sink.set_enabled(true);
        assert_eq!(cam.core().num_sinks_enabled(), 1);

        sink.set_enabled(false);
        assert_eq!(cam.core().num_sinks_enabled(), 0);
    }

    #[test]
    fn swapping_sources_moves_enabled_count() {
        let first = source();
        let second = source();
        let sink = SinkCore::new("sink");
        sink.set_enabled(true);
        sink.set_source(Some(first.clone()));
        assert_eq!(first.core().num_sinks_enabled(), 1);

        sink.set_source(Some(second.clone()));
        assert_eq!(first.core().num_sinks(), 0);
        assert_eq!(first.core().num_sinks_enabled(), 0);
        assert_eq!(second.core().num_sinks(), 1);
        assert_eq!(second.core().num_sinks_enabled(), 1);

        drop(sink);
        assert_eq!(second.core().num_sinks(), 0);
        assert_eq!(second.core().num_sinks_enabled(), 0);
    }
}
