use std::time::{Duration, Instant};

use crate::detection::domain::detected_face::DetectedFace;
use crate::markers::domain::marker_style::MarkerColor;
use crate::shared::rect::Rect;

/// Stable handle of a marker for its whole life, across reuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a tap on the marker should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapAction {
    /// Upload the face under the marker as a training sample for the person.
    Enroll { person_id: String },
}

/// Busy overlay shown while work for this marker is in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityIndicator {
    pub text: Option<String>,
    pub started: Instant,
}

/// Cubic smoothstep, close to the platform ease-in-out curve.
pub fn ease_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Animated change of frame and opacity.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub from_frame: Rect,
    pub to_frame: Rect,
    pub from_opacity: f64,
    pub to_opacity: f64,
    pub started: Instant,
    pub duration: Duration,
}

impl Transition {
    pub fn ends_at(&self) -> Instant {
        self.started + self.duration
    }

    /// Eased progress in `[0, 1]`.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        ease_in_out(elapsed.as_secs_f64() / self.duration.as_secs_f64())
    }

    pub fn sample(&self, now: Instant) -> (Rect, f64) {
        let t = self.progress(now);
        (
            self.from_frame.lerp(&self.to_frame, t),
            self.from_opacity + (self.to_opacity - self.from_opacity) * t,
        )
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now >= self.ends_at()
    }
}

pub const SCAN_BAR_HEIGHT: f64 = 2.0;
pub const SCAN_BAR_INSET: f64 = 10.0;
pub const SCAN_SWEEP: Duration = Duration::from_millis(1000);
pub const SCAN_RETURN: Duration = Duration::from_millis(500);

/// Positions of the two scan bars, relative to the marker's top edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanBars {
    pub top_y: f64,
    pub bottom_y: f64,
    pub opacity: f64,
}

/// One-shot "analysis in progress" decoration.
///
/// Two bars start inside the top and bottom edges, cross to the opposite
/// edges, return, and then the animation is over.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanAnimation {
    pub starts_at: Instant,
}

impl ScanAnimation {
    pub fn ends_at(&self) -> Instant {
        self.starts_at + SCAN_SWEEP + SCAN_RETURN
    }

    /// `None` before the scan starts and after it has finished.
    pub fn bars(&self, now: Instant, marker_height: f64) -> Option<ScanBars> {
        if now < self.starts_at || now >= self.ends_at() {
            return None;
        }
        let near = SCAN_BAR_INSET;
        let far = marker_height - SCAN_BAR_INSET;
        let elapsed = now - self.starts_at;

        let (travel, opacity) = if elapsed < SCAN_SWEEP {
            let t = ease_in_out(elapsed.as_secs_f64() / SCAN_SWEEP.as_secs_f64());
            (t, 0.5 + 0.5 * t)
        } else {
            let t = ease_in_out((elapsed - SCAN_SWEEP).as_secs_f64() / SCAN_RETURN.as_secs_f64());
            (1.0 - t, 1.0 - t)
        };
        Some(ScanBars {
            top_y: near + (far - near) * travel,
            bottom_y: far + (near - far) * travel,
            opacity,
        })
    }
}

/// A rectangle annotation over one face.
///
/// Decorations are plain optional fields; [`FaceMarker::strip_decorations`]
/// resets all of them when the marker is parked.
#[derive(Clone, Debug)]
pub struct FaceMarker {
    pub id: MarkerId,
    /// Target frame in view space.
    pub frame: Rect,
    /// Target opacity.
    pub opacity: f64,
    pub color: MarkerColor,
    pub face: Option<DetectedFace>,
    pub label: Option<String>,
    pub secondary_label: Option<String>,
    pub scan: Option<ScanAnimation>,
    pub activity: Option<ActivityIndicator>,
    pub tap_action: Option<TapAction>,
    pub transition: Option<Transition>,
}

impl FaceMarker {
    /// A new marker sits invisible at `frame` until its first transition.
    pub fn new(id: MarkerId, frame: Rect) -> Self {
        Self {
            id,
            frame,
            opacity: 0.0,
            color: MarkerColor::White,
            face: None,
            label: None,
            secondary_label: None,
            scan: None,
            activity: None,
            tap_action: None,
            transition: None,
        }
    }

    pub fn strip_decorations(&mut self) {
        self.face = None;
        self.label = None;
        self.secondary_label = None;
        self.scan = None;
        self.activity = None;
        self.tap_action = None;
    }

    /// Frame and opacity as they should be drawn at `now`.
    pub fn appearance(&self, now: Instant) -> (Rect, f64) {
        match &self.transition {
            Some(t) if !t.is_finished(now) => t.sample(now),
            _ => (self.frame, self.opacity),
        }
    }

    pub fn scan_bars(&self, now: Instant) -> Option<ScanBars> {
        let (frame, _) = self.appearance(now);
        self.scan.as_ref()?.bars(now, frame.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ease_in_out_endpoints() {
        assert_relative_eq!(ease_in_out(0.0), 0.0);
        assert_relative_eq!(ease_in_out(0.5), 0.5);
        assert_relative_eq!(ease_in_out(1.0), 1.0);
        assert_relative_eq!(ease_in_out(3.0), 1.0);
        assert!(ease_in_out(0.25) < 0.25);
    }

    #[test]
    fn test_transition_samples_between_endpoints() {
        let start = Instant::now();
        let t = Transition {
            from_frame: Rect::new(0.0, 0.0, 10.0, 10.0),
            to_frame: Rect::new(10.0, 10.0, 20.0, 20.0),
            from_opacity: 0.0,
            to_opacity: 0.6,
            started: start,
            duration: Duration::from_millis(500),
        };
        let (frame, opacity) = t.sample(start);
        assert_eq!(frame, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_relative_eq!(opacity, 0.0);

        let (frame, opacity) = t.sample(start + Duration::from_millis(250));
        assert_eq!(frame, Rect::new(5.0, 5.0, 15.0, 15.0));
        assert_relative_eq!(opacity, 0.3);

        assert!(t.is_finished(start + Duration::from_millis(500)));
        let (frame, _) = t.sample(start + Duration::from_secs(2));
        assert_eq!(frame, Rect::new(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn test_scan_bars_sweep_and_return() {
        let start = Instant::now();
        let scan = ScanAnimation { starts_at: start };
        let h = 100.0;

        let bars = scan.bars(start, h).unwrap();
        assert_relative_eq!(bars.top_y, 10.0);
        assert_relative_eq!(bars.bottom_y, 90.0);
        assert_relative_eq!(bars.opacity, 0.5);

        let bars = scan.bars(start + Duration::from_millis(500), h).unwrap();
        assert_relative_eq!(bars.top_y, 50.0);
        assert_relative_eq!(bars.bottom_y, 50.0);

        let bars = scan.bars(start + SCAN_SWEEP, h).unwrap();
        assert_relative_eq!(bars.top_y, 90.0);
        assert_relative_eq!(bars.bottom_y, 10.0);
        assert_relative_eq!(bars.opacity, 1.0);

        assert!(scan.bars(start + SCAN_SWEEP + SCAN_RETURN, h).is_none());
    }

    #[test]
    fn test_scan_not_visible_before_start() {
        let now = Instant::now();
        let scan = ScanAnimation {
            starts_at: now + Duration::from_millis(500),
        };
        assert!(scan.bars(now, 50.0).is_none());
    }

    #[test]
    fn test_strip_decorations_keeps_geometry() {
        let mut marker = FaceMarker::new(MarkerId(3), Rect::new(1.0, 2.0, 3.0, 4.0));
        marker.label = Some("Ada".into());
        marker.secondary_label = Some("55%".into());
        marker.tap_action = Some(TapAction::Enroll {
            person_id: "p".into(),
        });
        marker.activity = Some(ActivityIndicator {
            text: None,
            started: Instant::now(),
        });
        marker.scan = Some(ScanAnimation {
            starts_at: Instant::now(),
        });
        marker.strip_decorations();

        assert!(marker.label.is_none());
        assert!(marker.secondary_label.is_none());
        assert!(marker.tap_action.is_none());
        assert!(marker.activity.is_none());
        assert!(marker.scan.is_none());
        assert_eq!(marker.frame, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(marker.id, MarkerId(3));
    }
}
