use std::time::Instant;

use crate::markers::domain::face_marker::FaceMarker;
use crate::shared::frame::Frame;

/// Draws the marker model over a view-sized frame.
///
/// Implementations modify the frame in place. Marker frames are in view
/// space, so the canvas must have the view's dimensions.
pub trait MarkerRenderer: Send {
    fn render(
        &self,
        canvas: &mut Frame,
        markers: &[FaceMarker],
        now: Instant,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
