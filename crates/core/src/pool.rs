use parking_lot::Mutex;
use tracing::trace;

use crate::{format::PixelFormat, image::Image, metrics::Metrics};

/// Default number of spare images kept per pool.
pub const DEFAULT_MAX_FREE_IMAGES: usize = 32;

/// Limits for a [`FramePool`].
///
/// # Example
/// ```rust
/// use prism_core::prelude::PoolConfig;
///
/// let cfg = PoolConfig::default();
/// assert_eq!(cfg.max_free_images, 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Spare images retained before the smallest ones start being evicted.
    pub max_free_images: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_free_images: DEFAULT_MAX_FREE_IMAGES,
        }
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Spare images currently held.
    pub free_images: usize,
    /// Spare envelopes currently held.
    pub free_envelopes: usize,
    /// Image requests served from the free list.
    pub hits: u64,
    /// Image requests that needed fresh storage.
    pub misses: u64,
    /// Images or envelopes constructed.
    pub allocations: u64,
    /// Spare images replaced by a larger returning image.
    pub evictions: u64,
    /// Released objects dropped (full list or teardown).
    pub discarded: u64,
}

/// Per-source recycler for image buffers and frame envelopes.
///
/// Images are matched best-fit by capacity; envelopes (`E`) are fixed shape
/// and kept on a LIFO stack. One lock covers both lists. Once
/// [`begin_teardown`](Self::begin_teardown) has been called every release is a
/// plain drop, so releases racing the owner's shutdown never repopulate it.
///
/// # Example
/// ```rust
/// use prism_core::prelude::{FramePool, PixelFormat};
///
/// let pool: FramePool<()> = FramePool::new();
/// let image = pool.alloc_image(PixelFormat::Bgr, 4, 4, 48);
/// let ptr = image.as_slice().as_ptr();
/// pool.release_image(image);
///
/// // A smaller request reuses the same allocation.
/// let again = pool.alloc_image(PixelFormat::Gray, 4, 4, 16);
/// assert_eq!(again.as_slice().as_ptr(), ptr);
/// assert_eq!(pool.stats().hits, 1);
/// ```
pub struct FramePool<E> {
    state: Mutex<PoolState<E>>,
    config: PoolConfig,
    metrics: Metrics,
}

struct PoolState<E> {
    images: Vec<Option<Image>>,
    envelopes: Vec<Box<E>>,
    destroying: bool,
}

impl<E> Default for FramePool<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FramePool<E> {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            state: Mutex::new(PoolState {
                images: Vec::new(),
                envelopes: Vec::new(),
                destroying: false,
            }),
            config,
            metrics: Metrics::default(),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Check out an image of `size` bytes tagged with the given layout.
    ///
    /// Reuses the spare with the smallest capacity that still fits, otherwise
    /// allocates exactly `size` bytes. Never fails.
    pub fn alloc_image(&self, pixel_format: PixelFormat, width: u32, height: u32, size: usize) -> Image {
        let reused = {
            let mut state = self.state.lock();
            let mut found: Option<(usize, usize)> = None;
            for (idx, slot) in state.images.iter().enumerate() {
                let Some(image) = slot else { continue };
                let cap = image.capacity();
                if cap >= size && found.is_none_or(|(_, best)| cap < best) {
                    found = Some((idx, cap));
                }
            }
            found.and_then(|(idx, _)| state.images[idx].take())
        };

        let mut image = match reused {
            Some(image) => {
                self.metrics.hit();
                image
            }
            None => {
                self.metrics.miss();
                self.metrics.alloc();
                Image::with_size(size)
            }
        };
        image.retag(pixel_format, width, height, size);
        image
    }

    /// Return an image to the free list.
    ///
    /// Fills an empty slot first. When the list is full the returned image
    /// only replaces the smallest spare if it is strictly larger.
    pub fn release_image(&self, image: Image) {
        let mut state = self.state.lock();
        if state.destroying {
            self.metrics.discard();
            return;
        }
        if let Some(slot) = state.images.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(image);
            return;
        }
        if state.images.len() >= self.config.max_free_images {
            let smallest = state
                .images
                .iter_mut()
                .flatten()
                .min_by_key(|spare| spare.capacity());
            match smallest {
                Some(spare) if spare.capacity() < image.capacity() => {
                    trace!(
                        evicted = spare.capacity(),
                        kept = image.capacity(),
                        "evicting smallest spare image"
                    );
                    *spare = image;
                    self.metrics.evict();
                }
                _ => self.metrics.discard(),
            }
            return;
        }
        state.images.push(Some(image));
    }

    /// Pop a spare envelope or construct a new one.
    pub fn alloc_envelope(&self) -> Box<E>
    where
        E: Default,
    {
        if let Some(envelope) = self.state.lock().envelopes.pop() {
            return envelope;
        }
        self.metrics.alloc();
        Box::default()
    }

    /// Push an envelope back for reuse; dropped during teardown.
    pub fn release_envelope(&self, envelope: Box<E>) {
        let mut state = self.state.lock();
        if state.destroying {
            self.metrics.discard();
            return;
        }
        state.envelopes.push(envelope);
    }

    /// Stop recycling and free every spare.
    pub fn begin_teardown(&self) {
        let (images, envelopes) = {
            let mut state = self.state.lock();
            state.destroying = true;
            (
                std::mem::take(&mut state.images),
                std::mem::take(&mut state.envelopes),
            )
        };
        trace!(
            images = images.iter().flatten().count(),
            envelopes = envelopes.len(),
            "pool teardown"
        );
    }

    pub fn is_tearing_down(&self) -> bool {
        self.state.lock().destroying
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            free_images: state.images.iter().flatten().count(),
            free_envelopes: state.envelopes.len(),
            hits: self.metrics.hits(),
            misses: self.metrics.misses(),
            allocations: self.metrics.allocations(),
            evictions: self.metrics.evictions(),
            discarded: self.metrics.discarded(),
        }
    }
}
