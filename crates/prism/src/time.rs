use std::{sync::OnceLock, time::Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic microseconds since the first call in this process.
///
/// Never returns 0, which frames reserve for "no frame yet".
pub fn now() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    (epoch.elapsed().as_micros() as u64).max(1)
}

/// Where a frame timestamp was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeSource {
    #[default]
    Unknown,
    /// When the host dequeued the buffer.
    FrameDequeue,
    /// Driver-reported end of frame.
    DriverEndOfFrame,
    /// Driver-reported start of exposure.
    DriverStartOfExposure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_nonzero_and_monotonic() {
        let a = now();
        let b = now();
        assert!(a >= 1);
        assert!(b >= a);
    }
}
