use crate::format::PixelFormat;

/// JPEG quality sentinel: not JPEG, unknown, or "use the default".
pub const QUALITY_UNSET: i32 = -1;

/// Requested and actual JPEG quality within this distance are treated as equal.
pub const QUALITY_TOLERANCE: i32 = 5;

/// A single pixel buffer tagged with its layout.
///
/// The logical length (`len`) and the allocated capacity are tracked
/// independently; capacity never shrinks, which is what lets a
/// [`FramePool`](crate::pool::FramePool) hand the same allocation out again
/// for any request that fits.
///
/// # Example
/// ```rust
/// use prism_core::prelude::{FramePool, PixelFormat};
///
/// let pool: FramePool<()> = FramePool::new();
/// let mut image = pool.alloc_image(PixelFormat::Gray, 4, 2, 8);
/// image.as_mut_slice().fill(7);
/// assert_eq!(image.len(), 8);
/// assert!(image.is(4, 2, PixelFormat::Gray, -1));
/// ```
#[derive(Debug, Clone)]
pub struct Image {
    data: Vec<u8>,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    jpeg_quality: i32,
}

impl Image {
    /// Fresh storage of exactly `size` bytes, untagged.
    pub(crate) fn with_size(size: usize) -> Self {
        let mut data = Vec::with_capacity(size);
        data.resize(size, 0);
        Self {
            data,
            pixel_format: PixelFormat::Unknown,
            width: 0,
            height: 0,
            jpeg_quality: QUALITY_UNSET,
        }
    }

    /// Overwrite identity and logical size when checked out of the pool.
    pub(crate) fn retag(&mut self, pixel_format: PixelFormat, width: u32, height: u32, size: usize) {
        self.set_len(size);
        self.pixel_format = pixel_format;
        self.width = width;
        self.height = height;
        self.jpeg_quality = QUALITY_UNSET;
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// JPEG quality, or [`QUALITY_UNSET`].
    pub fn jpeg_quality(&self) -> i32 {
        self.jpeg_quality
    }

    pub fn set_jpeg_quality(&mut self, quality: i32) {
        self.jpeg_quality = quality;
    }

    /// Valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Direct access to the backing vector for writers whose output length is
    /// not known up front (JPEG compression). Truncation keeps capacity.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Set the logical length, growing capacity if required.
    pub fn set_len(&mut self, size: usize) {
        if size > self.data.capacity() {
            self.data.reserve_exact(size - self.data.len());
        }
        self.data.resize(size, 0);
    }

    /// Same dimensions.
    pub fn is_size(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Same dimensions and pixel format, any JPEG quality.
    pub fn is_format(&self, width: u32, height: u32, pixel_format: PixelFormat) -> bool {
        self.is_size(width, height) && self.pixel_format == pixel_format
    }

    /// Exact variant match. For MJPEG the quality matches when the request is
    /// [`QUALITY_UNSET`] or both are set and within [`QUALITY_TOLERANCE`].
    pub fn is(&self, width: u32, height: u32, pixel_format: PixelFormat, jpeg_quality: i32) -> bool {
        self.is_format(width, height, pixel_format)
            && (pixel_format != PixelFormat::Mjpeg
                || jpeg_quality == QUALITY_UNSET
                || (self.jpeg_quality != QUALITY_UNSET
                    && (self.jpeg_quality - jpeg_quality).abs() <= QUALITY_TOLERANCE))
    }

    /// At least `width x height` in both dimensions.
    pub fn is_larger(&self, width: u32, height: u32) -> bool {
        self.width >= width && self.height >= height
    }

    /// At least as large as `other` in both dimensions.
    pub fn is_larger_than(&self, other: &Image) -> bool {
        self.is_larger(other.width, other.height)
    }

    /// Smaller than `other` in at least one dimension.
    pub fn is_smaller_than(&self, other: &Image) -> bool {
        !self.is_larger_than(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(fmt: PixelFormat, w: u32, h: u32, quality: i32) -> Image {
        let mut image = Image::with_size(0);
        image.retag(fmt, w, h, 0);
        image.set_jpeg_quality(quality);
        image
    }

    #[test]
    fn jpeg_quality_tolerance() {
        let image = tagged(PixelFormat::Mjpeg, 8, 8, 80);
        assert!(image.is(8, 8, PixelFormat::Mjpeg, QUALITY_UNSET));
        assert!(image.is(8, 8, PixelFormat::Mjpeg, 85));
        assert!(image.is(8, 8, PixelFormat::Mjpeg, 75));
        assert!(!image.is(8, 8, PixelFormat::Mjpeg, 86));

        let camera = tagged(PixelFormat::Mjpeg, 8, 8, QUALITY_UNSET);
        assert!(camera.is(8, 8, PixelFormat::Mjpeg, QUALITY_UNSET));
        assert!(!camera.is(8, 8, PixelFormat::Mjpeg, 80));
    }

    #[test]
    fn quality_ignored_for_raw_formats() {
        let image = tagged(PixelFormat::Bgr, 8, 8, QUALITY_UNSET);
        assert!(image.is(8, 8, PixelFormat::Bgr, 50));
        assert!(!image.is(8, 4, PixelFormat::Bgr, QUALITY_UNSET));
    }

    #[test]
    fn size_ordering() {
        let big = tagged(PixelFormat::Bgr, 640, 480, QUALITY_UNSET);
        let wide = tagged(PixelFormat::Bgr, 800, 240, QUALITY_UNSET);
        assert!(big.is_larger(320, 240));
        assert!(!wide.is_larger(640, 480));
        assert!(wide.is_smaller_than(&big));
        assert!(big.is_smaller_than(&wide));
        assert!(big.is_larger_than(&big));
    }

    #[test]
    fn capacity_never_shrinks() {
        let mut image = Image::with_size(64);
        let cap = image.capacity();
        image.set_len(8);
        assert_eq!(image.len(), 8);
        assert_eq!(image.capacity(), cap);
        image.set_len(128);
        assert!(image.capacity() >= 128);
    }
}
