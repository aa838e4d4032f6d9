use std::sync::Arc;

use crate::detection::domain::detected_face::DetectedFace;
use crate::markers::domain::face_marker::MarkerId;
use crate::recognition::domain::face_service_error::FaceServiceError;
use crate::recognition::remote_identification_client::RemoteProgress;
use crate::shared::frame::Frame;
use crate::shared::rect::Size;

/// Everything that can change coordinator state, posted to its owner
/// thread.
///
/// Events produced by asynchronous work carry the state generation they
/// were started in so stale results can be told apart.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// A new live frame is in the shared slot.
    FrameTick,
    /// The analyse/back control was pressed.
    Toggle,
    SnapshotReady {
        generation: u64,
        frame: Option<Frame>,
    },
    LocalDetected {
        generation: u64,
        frame: Arc<Frame>,
        faces: Vec<DetectedFace>,
        /// Set for the pass run on a freshly frozen preview.
        preview: bool,
    },
    Remote {
        generation: u64,
        frame_size: Size,
        progress: RemoteProgress,
    },
    MarkerTapped(MarkerId),
    EnrollFinished {
        generation: u64,
        marker: MarkerId,
        result: Result<(), FaceServiceError>,
    },
    ViewResized(Size),
    /// The feed ran out. The loop stops once in-flight work settles.
    FeedEnded,
    Shutdown,
}
