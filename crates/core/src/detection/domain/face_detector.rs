use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Domain interface for an on-device face detection backend.
///
/// Returns bounding boxes in frame pixel space with a top-left origin.
/// Implementations may keep inference state, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>>;
}
