#![doc = include_str!("../README.md")]

pub mod format;
pub mod image;
pub mod metrics;
pub mod pool;

pub mod prelude {
    pub use crate::{
        format::{FourCc, PixelFormat, VideoMode},
        image::{Image, QUALITY_TOLERANCE, QUALITY_UNSET},
        metrics::Metrics,
        pool::{DEFAULT_MAX_FREE_IMAGES, FramePool, PoolConfig, PoolStats},
    };
}
