use crate::shared::rect::Rect;

/// Identity assigned to a face by the recognition service.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub person_id: String,
    pub confidence: f64,
    /// Display name, when it could be resolved for `person_id`.
    pub name: Option<String>,
}

impl Identity {
    /// Text shown on a marker: the person's name, else the opaque id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.person_id)
    }
}

/// A face found in a frame, in source-image pixel space.
///
/// Local detections carry geometry only. Remote detections also carry the
/// service's `id`, valid for one detect/identify round trip, and after
/// identification an optional [`Identity`].
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    pub id: Option<String>,
    pub bounding_box: Rect,
    pub identity: Option<Identity>,
}

impl DetectedFace {
    pub fn local(bounding_box: Rect) -> Self {
        Self {
            id: None,
            bounding_box,
            identity: None,
        }
    }
}
