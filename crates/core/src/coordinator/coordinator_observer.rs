use crate::coordinator::interaction_state::InteractionState;
use crate::detection::domain::detected_face::DetectedFace;
use crate::markers::domain::face_marker::FaceMarker;
use crate::markers::domain::marker_style::confidence_percent;
use crate::recognition::domain::face_service_error::FaceServiceError;
use crate::shared::frame::Frame;

/// Receives coordinator activity so front ends can render or report it
/// without the coordinator knowing how.
///
/// Every method defaults to a no-op.
pub trait CoordinatorObserver: Send {
    fn state_changed(&mut self, _from: InteractionState, _to: InteractionState) {}

    /// The marker set changed. `frame` is the preview while one is shown,
    /// otherwise the newest live frame.
    fn markers_updated(&mut self, _frame: Option<&Frame>, _markers: &[FaceMarker]) {}

    fn faces_identified(&mut self, _faces: &[DetectedFace]) {}

    fn remote_failed(&mut self, _error: &FaceServiceError) {}
}

/// Observer that discards everything.
pub struct NullObserver;

impl CoordinatorObserver for NullObserver {}

/// Observer that reports through the `log` facade.
pub struct LogObserver;

impl CoordinatorObserver for LogObserver {
    fn state_changed(&mut self, from: InteractionState, to: InteractionState) {
        log::info!("State {from:?} -> {to:?}");
    }

    fn markers_updated(&mut self, _frame: Option<&Frame>, markers: &[FaceMarker]) {
        log::debug!("{} marker(s) on screen", markers.len());
    }

    fn faces_identified(&mut self, faces: &[DetectedFace]) {
        for face in faces {
            match &face.identity {
                Some(identity) => log::info!(
                    "Identified {} ({}%) at {:?}",
                    identity.label(),
                    confidence_percent(identity.confidence),
                    face.bounding_box
                ),
                None => log::info!("Unknown face at {:?}", face.bounding_box),
            }
        }
    }

    fn remote_failed(&mut self, error: &FaceServiceError) {
        log::warn!("Identification failed: {error}");
    }
}
