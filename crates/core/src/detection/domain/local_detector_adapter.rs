use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;

/// Wraps a detection backend so that callers always get a face list.
///
/// Backend failures and undecodable frames are logged and reported as
/// "no faces"; the coordinator never has to handle a detection error.
pub struct LocalDetectorAdapter {
    backend: Box<dyn FaceDetector>,
}

impl LocalDetectorAdapter {
    pub fn new(backend: Box<dyn FaceDetector>) -> Self {
        Self { backend }
    }

    pub fn detect(&mut self, frame: &Frame) -> Vec<DetectedFace> {
        if frame.is_empty() {
            return Vec::new();
        }
        match self.backend.detect(frame) {
            Ok(rects) => rects
                .into_iter()
                .filter(|r| !r.is_empty())
                .map(DetectedFace::local)
                .collect(),
            Err(e) => {
                log::warn!("Local face detection failed on frame {}: {e}", frame.index());
                Vec::new()
            }
        }
    }
}
