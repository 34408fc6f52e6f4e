#![doc = include_str!("../README.md")]

pub use prism_codec as codec;
pub use prism_core as core;

pub mod error;
pub mod frame;
mod settings;
pub mod sink;
pub mod source;
pub mod time;

pub mod prelude {
    pub use prism_core::prelude::*;

    pub use crate::{
        error::{SinkError, SourceError},
        frame::{DEFAULT_JPEG_QUALITY, Frame, SourcePool},
        sink::{FrameInfo, ImageSink, MjpegSettings, MjpegSink, Sink, SinkCore, StreamEvent},
        source::{PatternSource, RawSource, Source, SourceCore, TIMEOUT_MESSAGE},
        time::{TimeSource, now},
    };
}
