//! Image-space to view-space rectangle mapping.
//!
//! Every function here is pure. The image is aspect-fitted into the view
//! (uniform scale, centred), matching how the preview is displayed.
use crate::shared::rect::{Rect, Size};

/// Coordinate convention of the rectangles a source reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceOrientation {
    /// Top-left origin, same as the view.
    #[default]
    Upright,
    /// Bottom-left origin (detectors with an inverted Y axis).
    FlippedY,
    /// Bottom-left origin and horizontally mirrored (front camera buffers).
    FlippedMirrored,
}

/// Uniform scale and centring offsets of an image fitted into a view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AspectFit {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Returns `None` when either size has zero area.
pub fn aspect_fit(image: Size, view: Size) -> Option<AspectFit> {
    if image.is_empty() || view.is_empty() {
        return None;
    }
    let scale = (view.width / image.width).min(view.height / image.height);
    Some(AspectFit {
        scale,
        offset_x: (view.width - image.width * scale) / 2.0,
        offset_y: (view.height - image.height * scale) / 2.0,
    })
}

/// Converts `rect` from the source convention to top-left image pixels.
pub fn orient(rect: &Rect, image: Size, orientation: SourceOrientation) -> Rect {
    match orientation {
        SourceOrientation::Upright => *rect,
        SourceOrientation::FlippedY => Rect::new(
            rect.x,
            image.height - rect.y - rect.height,
            rect.width,
            rect.height,
        ),
        SourceOrientation::FlippedMirrored => Rect::new(
            image.width - rect.x - rect.width,
            image.height - rect.y - rect.height,
            rect.width,
            rect.height,
        ),
    }
}

/// Maps an image-space rectangle into view space.
///
/// A zero-area image or view yields [`Rect::ZERO`].
pub fn image_to_view(
    rect: &Rect,
    image: Size,
    view: Size,
    orientation: SourceOrientation,
) -> Rect {
    let Some(fit) = aspect_fit(image, view) else {
        return Rect::ZERO;
    };
    orient(rect, image, orientation)
        .scaled(fit.scale, fit.scale)
        .translated(fit.offset_x, fit.offset_y)
}
