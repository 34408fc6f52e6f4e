//! Picking the cheapest cached image to derive a requested variant from.

use std::sync::Arc;

use prism_core::prelude::*;

/// Smallest image at least `width x height` that satisfies `pred`, else the
/// largest one that does.
fn closest_size<F>(images: &[Arc<Image>], width: u32, height: u32, pred: F) -> Option<usize>
where
    F: Fn(&Image) -> bool,
{
    let mut found: Option<usize> = None;
    for (idx, image) in images.iter().enumerate() {
        if pred(image)
            && image.is_larger(width, height)
            && found.is_none_or(|f| image.is_smaller_than(&images[f]))
        {
            found = Some(idx);
        }
    }
    if found.is_some() {
        return found;
    }
    for (idx, image) in images.iter().enumerate() {
        if pred(image) && found.is_none_or(|f| image.is_larger_than(&images[f])) {
            found = Some(idx);
        }
    }
    found
}

fn position<F>(images: &[Arc<Image>], pred: F) -> Option<usize>
where
    F: Fn(&Image) -> bool,
{
    images.iter().position(|image| pred(image))
}

/// Size-only search: smallest at least as large as requested, else largest.
pub(crate) fn nearest_by_size(images: &[Arc<Image>], width: u32, height: u32) -> Option<usize> {
    closest_size(images, width, height, |_| true).or_else(|| (!images.is_empty()).then_some(0))
}

/// Cost-ordered search for the best starting point of a conversion.
///
/// Exact matches win; then same-size raw images (BGR first when JPEG output
/// is wanted); then resampling a raw image of the same format; then any raw
/// image; then same-size JPEG (highest quality, camera originals first);
/// then JPEG of another size.
pub(crate) fn nearest(
    images: &[Arc<Image>],
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    jpeg_quality: i32,
) -> Option<usize> {
    let mjpeg = PixelFormat::Mjpeg;

    if let Some(idx) = position(images, |i| i.is(width, height, pixel_format, jpeg_quality)) {
        return Some(idx);
    }

    if pixel_format == mjpeg
        && let Some(idx) = position(images, |i| i.is_format(width, height, PixelFormat::Bgr))
    {
        return Some(idx);
    }
    if let Some(idx) = position(images, |i| i.is_size(width, height) && i.pixel_format() != mjpeg) {
        return Some(idx);
    }

    if pixel_format != mjpeg
        && let Some(idx) = closest_size(images, width, height, |i| i.pixel_format() == pixel_format)
    {
        return Some(idx);
    }

    if let Some(idx) = closest_size(images, width, height, |i| i.pixel_format() != mjpeg) {
        return Some(idx);
    }

    let mut best: Option<usize> = None;
    for (idx, image) in images.iter().enumerate() {
        if !image.is_format(width, height, mjpeg) {
            continue;
        }
        if image.jpeg_quality() == QUALITY_UNSET {
            return Some(idx);
        }
        if best.is_none_or(|b| image.jpeg_quality() > images[b].jpeg_quality()) {
            best = Some(idx);
        }
    }
    if best.is_some() {
        return best;
    }

    closest_size(images, width, height, |i| i.pixel_format() == mjpeg)
        .or_else(|| (!images.is_empty()).then_some(0))
}
