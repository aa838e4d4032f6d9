use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::detection::domain::detected_face::DetectedFace;
use crate::markers::domain::face_marker::{
    ActivityIndicator, FaceMarker, MarkerId, ScanAnimation, TapAction, Transition,
};
use crate::markers::domain::marker_style::style_for;
use crate::shared::recognition_policy::DEFAULT_SECONDARY_LABEL_THRESHOLD;
use crate::shared::rect::Rect;

/// Opacity a marker settles at once shown.
pub const MARKER_OPACITY: f64 = 0.6;
pub const MARKER_TRANSITION: Duration = Duration::from_millis(500);

/// Lifetime counters, for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: usize,
    pub reused: usize,
    pub evicted: usize,
}

/// Reusable set of face markers.
///
/// A detection pass calls [`MarkerPool::clear`] with its face count and then
/// [`MarkerPool::add`] once per face, so the active markers always mirror the
/// latest pass. Cleared markers are parked as spares up to the requested
/// count and dropped beyond it.
#[derive(Debug)]
pub struct MarkerPool {
    active: Vec<FaceMarker>,
    spares: VecDeque<FaceMarker>,
    next_id: u64,
    stats: PoolStats,
    secondary_label_threshold: f64,
}

impl Default for MarkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_SECONDARY_LABEL_THRESHOLD)
    }
}

impl MarkerPool {
    pub fn new(secondary_label_threshold: f64) -> Self {
        Self {
            active: Vec::new(),
            spares: VecDeque::new(),
            next_id: 0,
            stats: PoolStats::default(),
            secondary_label_threshold,
        }
    }

    pub fn clear(&mut self, reuse_count: usize) {
        for mut marker in self.active.drain(..) {
            marker.strip_decorations();
            if self.spares.len() < reuse_count {
                self.spares.push_back(marker);
            } else {
                marker.opacity = 0.0;
                marker.transition = None;
                self.stats.evicted += 1;
                log::trace!("Evicted marker {}", marker.id);
            }
        }
    }

    /// Shows a marker at `rect` (view space) and returns its id.
    pub fn add(
        &mut self,
        rect: Rect,
        face: Option<DetectedFace>,
        animated: bool,
        tap: Option<TapAction>,
    ) -> MarkerId {
        self.add_at(rect, face, animated, tap, Instant::now())
    }

    pub fn add_at(
        &mut self,
        rect: Rect,
        face: Option<DetectedFace>,
        animated: bool,
        tap: Option<TapAction>,
        now: Instant,
    ) -> MarkerId {
        let mut marker = match self.spares.pop_front() {
            Some(marker) => {
                self.stats.reused += 1;
                marker
            }
            None => {
                let id = MarkerId(self.next_id);
                self.next_id += 1;
                self.stats.created += 1;
                FaceMarker::new(id, rect)
            }
        };

        let style = style_for(face.as_ref(), self.secondary_label_threshold);
        marker.color = style.color;
        marker.label = style.label;
        marker.secondary_label = style.secondary_label;
        marker.face = face;
        marker.tap_action = tap;

        let transition = Transition {
            from_frame: marker.frame,
            to_frame: rect,
            from_opacity: marker.opacity,
            to_opacity: MARKER_OPACITY,
            started: now,
            duration: MARKER_TRANSITION,
        };
        marker.scan = animated.then(|| ScanAnimation {
            starts_at: transition.ends_at(),
        });
        marker.transition = Some(transition);
        marker.frame = rect;
        marker.opacity = MARKER_OPACITY;

        let id = marker.id;
        self.active.push(marker);
        id
    }

    /// Returns false when `id` is not an active marker.
    pub fn start_activity(&mut self, id: MarkerId, text: Option<String>) -> bool {
        match self.marker_mut(id) {
            Some(marker) => {
                marker.activity = Some(ActivityIndicator {
                    text,
                    started: Instant::now(),
                });
                true
            }
            None => false,
        }
    }

    pub fn update_activity(&mut self, id: MarkerId, text: Option<String>) -> bool {
        match self.marker_mut(id).and_then(|m| m.activity.as_mut()) {
            Some(activity) => {
                activity.text = text;
                true
            }
            None => false,
        }
    }

    pub fn stop_activity(&mut self, id: MarkerId) -> bool {
        self.marker_mut(id)
            .and_then(|m| m.activity.take())
            .is_some()
    }

    /// Active markers in the order they were added.
    pub fn markers(&self) -> &[FaceMarker] {
        &self.active
    }

    pub fn marker(&self, id: MarkerId) -> Option<&FaceMarker> {
        self.active.iter().find(|m| m.id == id)
    }

    fn marker_mut(&mut self, id: MarkerId) -> Option<&mut FaceMarker> {
        self.active.iter_mut().find(|m| m.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn spare_count(&self) -> usize {
        self.spares.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}
