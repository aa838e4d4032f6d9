use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::device_control::{log_failure, DeviceControl};
use crate::capture::domain::latest_frame::LatestFrame;
use crate::coordinator::coordinator_event::CoordinatorEvent;
use crate::coordinator::coordinator_observer::CoordinatorObserver;
use crate::coordinator::interaction_state::{CoordinatorMode, InteractionState};
use crate::coordinator::local_detection_worker::{DetectionJob, LocalDetectionWorker};
use crate::coordinator::throttle::Throttle;
use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::local_detector_adapter::LocalDetectorAdapter;
use crate::geometry::geometry_mapper::{image_to_view, SourceOrientation};
use crate::markers::domain::face_marker::{MarkerId, TapAction};
use crate::markers::domain::marker_pool::MarkerPool;
use crate::recognition::remote_identification_client::{RemoteIdentificationClient, RemoteProgress};
use crate::shared::frame::Frame;
use crate::shared::recognition_policy::RecognitionPolicy;
use crate::shared::rect::Size;

const ENROLL_ACTIVITY_TEXT: &str = "Uploading";

/// Where the faces being drawn came from.
#[derive(Clone, Copy)]
enum Pass {
    /// Geometry from the on-device detector, drawn as plain white boxes.
    Local { animated: bool },
    /// Faces from the service, coloured and labelled by identity.
    Remote { bind_enroll: bool },
}

pub struct CoordinatorSettings {
    pub mode: CoordinatorMode,
    pub policy: RecognitionPolicy,
    /// Size of the surface markers are laid out on. `None` lays markers out
    /// in image space.
    pub view_size: Option<Size>,
    pub orientation: SourceOrientation,
}

/// External collaborators of the coordinator.
pub struct CoordinatorParts {
    pub latest: LatestFrame,
    pub detector: LocalDetectorAdapter,
    pub remote: RemoteIdentificationClient,
    pub device: Arc<dyn DeviceControl>,
    pub observer: Box<dyn CoordinatorObserver>,
}

/// Owner of the interaction state, the preview and the marker pool.
///
/// All mutation happens in [`CaptureCoordinator::handle`] on the thread
/// that runs the coordinator; asynchronous work reports back through
/// [`CoordinatorEvent`]s on the coordinator's channel.
pub struct CaptureCoordinator {
    mode: CoordinatorMode,
    policy: RecognitionPolicy,
    state: InteractionState,
    generation: u64,
    markers: MarkerPool,
    preview: Option<Arc<Frame>>,
    view_size: Option<Size>,
    orientation: SourceOrientation,
    latest: LatestFrame,
    detector: LocalDetectionWorker,
    remote: RemoteIdentificationClient,
    device: Arc<dyn DeviceControl>,
    observer: Box<dyn CoordinatorObserver>,
    local_throttle: Throttle,
    remote_throttle: Throttle,
    events_tx: Sender<CoordinatorEvent>,
    events_rx: Receiver<CoordinatorEvent>,
    in_flight: usize,
    ending: bool,
    /// When the service last drew markers in this generation.
    remote_drawn_at: Option<Instant>,
}

impl CaptureCoordinator {
    pub fn new(settings: CoordinatorSettings, parts: CoordinatorParts) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let detector = LocalDetectionWorker::spawn(parts.detector, events_tx.clone());
        Self {
            mode: settings.mode,
            markers: MarkerPool::new(settings.policy.secondary_label_threshold),
            local_throttle: Throttle::new(settings.policy.local_detect_interval()),
            remote_throttle: Throttle::new(settings.policy.remote_identify_interval()),
            policy: settings.policy,
            state: InteractionState::Idle,
            generation: 0,
            preview: None,
            view_size: settings.view_size,
            orientation: settings.orientation,
            latest: parts.latest,
            detector,
            remote: parts.remote,
            device: parts.device,
            observer: parts.observer,
            events_tx,
            events_rx,
            in_flight: 0,
            ending: false,
            remote_drawn_at: None,
        }
    }

    /// Handle for posting events from other threads.
    pub fn sender(&self) -> Sender<CoordinatorEvent> {
        self.events_tx.clone()
    }

    /// Applies events until `Shutdown`, or until the feed has ended and
    /// no asynchronous work is outstanding.
    pub fn run(&mut self) {
        let events = self.events_rx.clone();
        for event in events.iter() {
            if !self.handle(event) {
                break;
            }
        }
        log::info!("Coordinator stopped");
    }

    /// Applies one event. Returns false when the loop should stop.
    pub fn handle(&mut self, event: CoordinatorEvent) -> bool {
        match event {
            CoordinatorEvent::FrameTick => self.on_frame_tick(Instant::now()),
            CoordinatorEvent::Toggle => self.toggle(),
            CoordinatorEvent::SnapshotReady { generation, frame } => {
                self.settle();
                self.on_snapshot(generation, frame);
            }
            CoordinatorEvent::LocalDetected {
                generation,
                frame,
                faces,
                preview,
            } => {
                self.settle();
                self.on_local_detected(generation, frame, faces, preview);
            }
            CoordinatorEvent::Remote {
                generation,
                frame_size,
                progress,
            } => self.on_remote(generation, frame_size, progress),
            CoordinatorEvent::MarkerTapped(id) => self.on_marker_tapped(id),
            CoordinatorEvent::EnrollFinished {
                generation,
                marker,
                result,
            } => {
                self.settle();
                match result {
                    Ok(()) => log::info!("Enrolled face from marker {marker}"),
                    Err(e) => log::warn!("Enrolment from marker {marker} failed: {e}"),
                }
                if generation == self.generation && self.markers.stop_activity(marker) {
                    self.notify_markers();
                }
            }
            CoordinatorEvent::ViewResized(size) => self.view_size = Some(size),
            CoordinatorEvent::FeedEnded => {
                log::info!("Feed ended");
                self.ending = true;
            }
            CoordinatorEvent::Shutdown => return false,
        }
        !(self.ending && self.in_flight == 0)
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn mode(&self) -> CoordinatorMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn button_title(&self) -> &'static str {
        self.state.button_title()
    }

    pub fn preview_visible(&self) -> bool {
        self.preview.is_some()
    }

    pub fn preview(&self) -> Option<&Frame> {
        self.preview.as_deref()
    }

    pub fn markers(&self) -> &MarkerPool {
        &self.markers
    }

    pub fn view_size(&self) -> Option<Size> {
        self.view_size
    }

    fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn on_frame_tick(&mut self, now: Instant) {
        if self.state == InteractionState::ShowingPreview {
            return;
        }
        let Some(frame) = self.latest.current() else {
            return;
        };

        if self.local_throttle.try_acquire(now) {
            let job = DetectionJob {
                generation: self.generation,
                frame: Arc::clone(&frame),
                preview: false,
            };
            if self.detector.try_submit(job) {
                self.in_flight += 1;
            } else {
                log::debug!("Detector busy, dropped frame {}", frame.index());
            }
        }

        if self.state == InteractionState::Analyzing && self.remote_throttle.try_acquire(now) {
            self.start_remote_chain(&frame);
        }
    }

    /// Moves to `to` and starts a new generation, so results of work
    /// started before are dropped.
    fn enter(&mut self, to: InteractionState) {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        self.remote_drawn_at = None;
        self.observer.state_changed(from, to);
    }

    fn toggle(&mut self) {
        let to = self.state.toggled(self.mode);
        self.enter(to);

        match to {
            InteractionState::ShowingPreview => {
                self.in_flight += 1;
                let tx = self.events_tx.clone();
                let generation = self.generation;
                self.latest.snapshot(move |frame| {
                    let _ = tx.send(CoordinatorEvent::SnapshotReady { generation, frame });
                });
            }
            InteractionState::Analyzing => {
                self.local_throttle.reset();
                self.remote_throttle.reset();
            }
            InteractionState::Idle => {
                self.device
                    .set_indicator_lights(false, log_failure("indicator lights off"));
                self.preview = None;
                self.markers.clear(0);
                self.notify_markers();
            }
        }
    }

    fn on_snapshot(&mut self, generation: u64, frame: Option<Frame>) {
        if generation != self.generation {
            log::debug!("Dropping snapshot from generation {generation}");
            return;
        }
        let Some(frame) = frame else {
            log::warn!("No frame available to analyse yet");
            self.enter(InteractionState::Idle);
            return;
        };

        let frame = Arc::new(frame);
        self.preview = Some(Arc::clone(&frame));
        self.device
            .set_indicator_lights(false, log_failure("indicator lights off"));
        self.notify_markers();

        let replaced = self.detector.submit_replacing(DetectionJob {
            generation,
            frame: Arc::clone(&frame),
            preview: true,
        });
        self.in_flight = self.in_flight.saturating_sub(replaced.displaced);
        if replaced.accepted {
            self.in_flight += 1;
        }
        self.start_remote_chain(&frame);
    }

    /// True while markers drawn from service results should not be
    /// replaced by a local pass: for the whole of a preview, and for one
    /// remote interval while analysing.
    fn remote_result_fresh(&self, now: Instant) -> bool {
        match self.remote_drawn_at {
            None => false,
            Some(_) if self.state == InteractionState::ShowingPreview => true,
            Some(at) => now.duration_since(at) < self.policy.remote_identify_interval(),
        }
    }

    fn on_local_detected(
        &mut self,
        generation: u64,
        frame: Arc<Frame>,
        faces: Vec<DetectedFace>,
        preview: bool,
    ) {
        if generation != self.generation {
            log::debug!("Dropping local detection from generation {generation}");
            return;
        }
        if self.state == InteractionState::ShowingPreview && !preview {
            return;
        }
        if self.remote_result_fresh(Instant::now()) {
            log::debug!("Keeping service markers over local pass on frame {}", frame.index());
            return;
        }

        self.draw_faces(frame.size(), &faces, Pass::Local { animated: preview });
    }

    fn start_remote_chain(&mut self, frame: &Frame) {
        let png = match frame.encode_png() {
            Ok(png) => png,
            Err(e) => {
                log::warn!("Could not encode frame {} for upload: {e}", frame.index());
                return;
            }
        };
        self.in_flight += 1;
        let tx = self.events_tx.clone();
        let generation = self.generation;
        let frame_size = frame.size();
        self.remote.detect_and_identify(
            png,
            Box::new(move |progress| {
                let _ = tx.send(CoordinatorEvent::Remote {
                    generation,
                    frame_size,
                    progress,
                });
            }),
        );
    }

    fn on_remote(&mut self, generation: u64, frame_size: Size, progress: RemoteProgress) {
        let terminal = match &progress {
            RemoteProgress::Detected(faces) => faces.is_empty(),
            RemoteProgress::Identified(_) | RemoteProgress::Failed(_) => true,
        };
        if terminal {
            self.settle();
        }
        let current = generation == self.generation;

        match progress {
            RemoteProgress::Detected(faces) => {
                if !current {
                    return;
                }
                log::debug!("Service detected {} face(s)", faces.len());
                self.remote_drawn_at = Some(Instant::now());
                self.draw_faces(frame_size, &faces, Pass::Remote { bind_enroll: false });
            }
            RemoteProgress::Identified(faces) => {
                if !current {
                    log::debug!("Dropping identification from generation {generation}");
                    return;
                }
                let bind_enroll = self.state == InteractionState::ShowingPreview;
                self.remote_drawn_at = Some(Instant::now());
                self.draw_faces(frame_size, &faces, Pass::Remote { bind_enroll });
                self.observer.faces_identified(&faces);
                if self.policy.led_trigger.fires(&faces) {
                    self.device
                        .set_indicator_lights(true, log_failure("indicator lights on"));
                }
            }
            RemoteProgress::Failed(e) => {
                self.observer.remote_failed(&e);
                if current {
                    log::warn!("Remote identification failed: {e}");
                    // a preview keeps the cleared result; live analysis
                    // falls back to local passes
                    self.remote_drawn_at =
                        (self.state == InteractionState::ShowingPreview).then(Instant::now);
                    self.markers.clear(0);
                    self.notify_markers();
                }
            }
        }
    }

    /// Replaces the marker set with one marker per face.
    ///
    /// Only the local detector sees the feed in its source orientation;
    /// service rectangles are always top-left based.
    fn draw_faces(&mut self, frame_size: Size, faces: &[DetectedFace], pass: Pass) {
        let view = self.view_size.unwrap_or(frame_size);
        let orientation = match pass {
            Pass::Local { .. } => self.orientation,
            Pass::Remote { .. } => SourceOrientation::Upright,
        };
        self.markers.clear(faces.len());
        for face in faces {
            let rect = image_to_view(&face.bounding_box, frame_size, view, orientation);
            match pass {
                Pass::Local { animated } => {
                    self.markers.add(rect, None, animated, None);
                }
                Pass::Remote { bind_enroll } => {
                    let tap = face
                        .identity
                        .as_ref()
                        .filter(|_| bind_enroll)
                        .map(|identity| TapAction::Enroll {
                            person_id: identity.person_id.clone(),
                        });
                    self.markers.add(rect, Some(face.clone()), false, tap);
                }
            }
        }
        self.notify_markers();
    }

    fn on_marker_tapped(&mut self, id: MarkerId) {
        if self.state != InteractionState::ShowingPreview {
            return;
        }
        let Some(marker) = self.markers.marker(id) else {
            return;
        };
        let (Some(TapAction::Enroll { person_id }), Some(face)) = (&marker.tap_action, &marker.face)
        else {
            return;
        };
        let person_id = person_id.clone();
        let Some(crop) = self.preview.as_ref().and_then(|p| p.crop(&face.bounding_box)) else {
            log::warn!("Marker {id} has no face to crop");
            return;
        };
        let png = match crop.encode_png() {
            Ok(png) => png,
            Err(e) => {
                log::warn!("Could not encode face crop: {e}");
                return;
            }
        };

        log::info!("Enrolling marker {id} as person {person_id}");
        self.markers
            .start_activity(id, Some(ENROLL_ACTIVITY_TEXT.to_string()));
        self.notify_markers();

        self.in_flight += 1;
        let pending = self.remote.enroll(png, person_id);
        let tx = self.events_tx.clone();
        let generation = self.generation;
        std::thread::spawn(move || {
            let result = pending.wait().map(|_| ());
            let _ = tx.send(CoordinatorEvent::EnrollFinished {
                generation,
                marker: id,
                result,
            });
        });
    }

    fn notify_markers(&mut self) {
        let live = if self.preview.is_none() {
            self.latest.current()
        } else {
            None
        };
        let frame = self.preview.as_deref().or(live.as_deref());
        self.observer.markers_updated(frame, self.markers.markers());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::capture::domain::device_control::{CaptureMode, Completion};
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::markers::domain::marker_style::MarkerColor;
    use crate::recognition::domain::face_service_error::FaceServiceError;
    use crate::recognition::remote_identification_client::fakes::{remote_face, FakeFaceService};
    use crate::shared::recognition_policy::LedTrigger;
    use crate::shared::rect::Rect;

    struct FixedDetector {
        rects: Vec<Rect>,
        calls: Arc<AtomicUsize>,
    }

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rects.clone())
        }
    }

    #[derive(Default)]
    struct RecordingDevice {
        lights: Mutex<Vec<bool>>,
    }

    impl DeviceControl for RecordingDevice {
        fn set_indicator_lights(&self, on: bool, completion: Completion) {
            self.lights.lock().unwrap().push(on);
            completion(Ok(()));
        }

        fn set_capture_mode(&self, _mode: CaptureMode, completion: Completion) {
            completion(Ok(()));
        }
    }

    #[derive(Clone, Default)]
    struct Recorded {
        states: Arc<Mutex<Vec<InteractionState>>>,
        identified: Arc<AtomicUsize>,
        failures: Arc<AtomicUsize>,
    }

    struct RecordingObserver(Recorded);

    impl CoordinatorObserver for RecordingObserver {
        fn state_changed(&mut self, _from: InteractionState, to: InteractionState) {
            self.0.states.lock().unwrap().push(to);
        }

        fn faces_identified(&mut self, _faces: &[DetectedFace]) {
            self.0.identified.fetch_add(1, Ordering::SeqCst);
        }

        fn remote_failed(&mut self, _error: &FaceServiceError) {
            self.0.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        coordinator: CaptureCoordinator,
        service: Arc<FakeFaceService>,
        device: Arc<RecordingDevice>,
        detector_calls: Arc<AtomicUsize>,
        recorded: Recorded,
    }

    impl Harness {
        /// Applies queued events until `done` holds.
        fn pump_until(&mut self, done: impl Fn(&Harness) -> bool) {
            let events = self.coordinator.events_rx.clone();
            while !done(self) {
                let event = events
                    .recv_timeout(Duration::from_secs(5))
                    .expect("coordinator event");
                self.coordinator.handle(event);
            }
        }

        fn identified(&self) -> usize {
            self.recorded.identified.load(Ordering::SeqCst)
        }

        fn settled(&self) -> bool {
            self.coordinator.in_flight == 0
        }

        fn current_local_result(&self, preview: bool) -> CoordinatorEvent {
            CoordinatorEvent::LocalDetected {
                generation: self.coordinator.generation(),
                frame: Arc::new(Frame::new(vec![128; 100 * 80 * 3], 100, 80, 1)),
                faces: vec![DetectedFace::local(Rect::new(40.0, 40.0, 10.0, 10.0))],
                preview,
            }
        }
    }

    fn face_service() -> FakeFaceService {
        FakeFaceService {
            detected: vec![
                remote_face("f1", Rect::new(10.0, 10.0, 20.0, 20.0)),
                remote_face("f2", Rect::new(60.0, 40.0, 20.0, 20.0)),
            ],
            matches: vec![Some(("p1".into(), 0.92)), None],
            names: HashMap::from([("p1".to_string(), "Ada".to_string())]),
            ..Default::default()
        }
    }

    fn harness(mode: CoordinatorMode, service: FakeFaceService, policy: RecognitionPolicy) -> Harness {
        harness_with(
            mode,
            service,
            policy,
            SourceOrientation::Upright,
            Some(Frame::new(vec![128; 100 * 80 * 3], 100, 80, 0)),
        )
    }

    fn harness_with(
        mode: CoordinatorMode,
        service: FakeFaceService,
        policy: RecognitionPolicy,
        orientation: SourceOrientation,
        frame: Option<Frame>,
    ) -> Harness {
        let service = Arc::new(service);
        let device = Arc::new(RecordingDevice::default());
        let latest = LatestFrame::new();
        if let Some(frame) = frame {
            latest.store(frame);
        }
        let detector_calls = Arc::new(AtomicUsize::new(0));
        let recorded = Recorded::default();

        let coordinator = CaptureCoordinator::new(
            CoordinatorSettings {
                mode,
                policy,
                view_size: None,
                orientation,
            },
            CoordinatorParts {
                latest,
                detector: LocalDetectorAdapter::new(Box::new(FixedDetector {
                    rects: vec![Rect::new(12.0, 12.0, 18.0, 18.0)],
                    calls: Arc::clone(&detector_calls),
                })),
                remote: RemoteIdentificationClient::new(service.clone()),
                device: device.clone(),
                observer: Box::new(RecordingObserver(recorded.clone())),
            },
        );
        Harness {
            coordinator,
            service,
            device,
            detector_calls,
            recorded,
        }
    }

    #[test]
    fn test_preview_round_trip_restores_idle_state() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        assert_eq!(h.coordinator.button_title(), "Analyze");
        assert_eq!(h.coordinator.markers().active_count(), 0);
        assert!(!h.coordinator.preview_visible());

        h.coordinator.handle(CoordinatorEvent::Toggle);
        assert_eq!(h.coordinator.state(), InteractionState::ShowingPreview);
        assert_eq!(h.coordinator.button_title(), "Back");
        h.pump_until(|h| h.identified() == 1);
        assert!(h.coordinator.preview_visible());
        assert_eq!(h.coordinator.markers().active_count(), 2);

        h.coordinator.handle(CoordinatorEvent::Toggle);
        assert_eq!(h.coordinator.state(), InteractionState::Idle);
        assert_eq!(h.coordinator.markers().active_count(), 0);
        assert!(!h.coordinator.preview_visible());
        assert_eq!(
            *h.recorded.states.lock().unwrap(),
            vec![InteractionState::ShowingPreview, InteractionState::Idle]
        );
    }

    #[test]
    fn test_preview_identifies_and_binds_enrolment() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.identified() == 1 && h.settled());

        assert_eq!(h.detector_calls.load(Ordering::SeqCst), 1);
        let markers = h.coordinator.markers().markers();
        assert_eq!(markers[0].color, MarkerColor::Red);
        assert_eq!(markers[0].label.as_deref(), Some("Ada"));
        assert_eq!(
            markers[0].tap_action,
            Some(TapAction::Enroll {
                person_id: "p1".into()
            })
        );
        assert_eq!(markers[1].color, MarkerColor::Yellow);
        assert_eq!(markers[1].tap_action, None);
        // lights off on freeze, then on for the match
        assert_eq!(*h.device.lights.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn test_preview_starts_remote_chain_with_local_pass() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.coordinator.preview_visible());

        // preview detection and the service chain both outstanding
        assert_eq!(h.coordinator.in_flight, 2);
        h.pump_until(|h| h.identified() == 1 && h.settled());
        assert_eq!(h.service.detect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.detector_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_local_preview_pass_keeps_identified_markers() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.identified() == 1 && h.settled());

        let late = h.current_local_result(true);
        h.coordinator.handle(late);
        let markers = h.coordinator.markers().markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].color, MarkerColor::Red);
        assert_eq!(markers[0].label.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_empty_snapshot_returns_to_idle() {
        let mut h = harness_with(
            CoordinatorMode::Interactive,
            face_service(),
            RecognitionPolicy::default(),
            SourceOrientation::Upright,
            None,
        );
        h.coordinator.handle(CoordinatorEvent::Toggle);
        let toggled = h.coordinator.generation();
        h.pump_until(|h| h.settled());

        assert_eq!(h.coordinator.state(), InteractionState::Idle);
        assert_eq!(h.coordinator.button_title(), "Analyze");
        assert!(!h.coordinator.preview_visible());
        assert!(h.coordinator.generation() > toggled);
        assert_eq!(
            *h.recorded.states.lock().unwrap(),
            vec![InteractionState::ShowingPreview, InteractionState::Idle]
        );
        assert_eq!(h.service.detect_calls.load(Ordering::SeqCst), 0);

        // the next toggle starts a fresh preview attempt
        h.coordinator.handle(CoordinatorEvent::Toggle);
        assert_eq!(h.coordinator.state(), InteractionState::ShowingPreview);
    }

    #[rstest]
    #[case::flipped(SourceOrientation::FlippedY)]
    #[case::mirrored(SourceOrientation::FlippedMirrored)]
    fn test_service_faces_ignore_source_orientation(#[case] orientation: SourceOrientation) {
        let mut h = harness_with(
            CoordinatorMode::Interactive,
            face_service(),
            RecognitionPolicy::default(),
            orientation,
            Some(Frame::new(vec![128; 100 * 80 * 3], 100, 80, 0)),
        );
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.identified() == 1 && h.settled());

        let markers = h.coordinator.markers().markers();
        assert_eq!(markers[0].frame, Rect::new(10.0, 10.0, 20.0, 20.0));
        assert_eq!(markers[1].frame, Rect::new(60.0, 40.0, 20.0, 20.0));
    }

    #[test]
    fn test_local_faces_follow_source_orientation() {
        let policy = RecognitionPolicy {
            local_detect_interval_ms: 60_000,
            ..Default::default()
        };
        let mut h = harness_with(
            CoordinatorMode::Interactive,
            face_service(),
            policy,
            SourceOrientation::FlippedY,
            Some(Frame::new(vec![128; 100 * 80 * 3], 100, 80, 0)),
        );
        h.coordinator.handle(CoordinatorEvent::FrameTick);
        h.pump_until(|h| h.coordinator.markers().active_count() == 1);
        assert_eq!(
            h.coordinator.markers().markers()[0].frame,
            Rect::new(12.0, 50.0, 18.0, 18.0)
        );
    }

    #[test]
    fn test_led_policy_never_keeps_lights_off() {
        let policy = RecognitionPolicy {
            led_trigger: LedTrigger::Never,
            ..Default::default()
        };
        let mut h = harness(CoordinatorMode::Interactive, face_service(), policy);
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.identified() == 1);
        assert_eq!(*h.device.lights.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_remote_failure_clears_markers_and_keeps_state() {
        let service = FakeFaceService {
            fail_identify: true,
            ..face_service()
        };
        let mut h = harness(CoordinatorMode::Interactive, service, RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.recorded.failures.load(Ordering::SeqCst) == 1 && h.settled());

        assert_eq!(h.coordinator.markers().active_count(), 0);
        assert_eq!(h.coordinator.state(), InteractionState::ShowingPreview);
        assert!(h.coordinator.preview_visible());
        assert_eq!(h.service.identify_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_results_from_older_generation_are_dropped() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.coordinator.handle(CoordinatorEvent::Toggle);
        let stale = h.coordinator.generation() - 1;

        h.coordinator.handle(CoordinatorEvent::Remote {
            generation: stale,
            frame_size: Size::new(100.0, 80.0),
            progress: RemoteProgress::Detected(vec![remote_face("f1", Rect::new(0.0, 0.0, 10.0, 10.0))]),
        });
        assert_eq!(h.coordinator.markers().active_count(), 0);

        h.coordinator.handle(CoordinatorEvent::SnapshotReady {
            generation: stale,
            frame: Some(Frame::new(vec![0; 12], 2, 2, 1)),
        });
        assert!(!h.coordinator.preview_visible());
    }

    #[test]
    fn test_frame_ticks_are_throttled() {
        let policy = RecognitionPolicy {
            local_detect_interval_ms: 60_000,
            ..Default::default()
        };
        let mut h = harness(CoordinatorMode::Interactive, face_service(), policy);
        h.coordinator.handle(CoordinatorEvent::FrameTick);
        h.coordinator.handle(CoordinatorEvent::FrameTick);
        h.pump_until(|h| h.coordinator.markers().active_count() == 1);

        assert_eq!(h.detector_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.coordinator.markers().markers()[0].color, MarkerColor::White);
        assert_eq!(h.service.detect_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_continuous_mode_identifies_live_frames() {
        let mut h = harness(CoordinatorMode::Continuous, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        assert_eq!(h.coordinator.state(), InteractionState::Analyzing);

        h.coordinator.handle(CoordinatorEvent::FrameTick);
        h.coordinator.handle(CoordinatorEvent::FrameTick);
        h.pump_until(|h| h.identified() == 1);
        assert_eq!(h.service.detect_calls.load(Ordering::SeqCst), 1);
        assert!(!h.coordinator.preview_visible());

        h.coordinator.handle(CoordinatorEvent::Toggle);
        assert_eq!(h.coordinator.state(), InteractionState::Idle);
        assert_eq!(h.coordinator.markers().active_count(), 0);
    }

    #[test]
    fn test_analyzing_local_pass_keeps_fresh_identities() {
        let mut h = harness(CoordinatorMode::Continuous, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.coordinator.handle(CoordinatorEvent::FrameTick);
        h.pump_until(|h| h.identified() == 1 && h.settled());

        let live = h.current_local_result(false);
        h.coordinator.handle(live);
        let markers = h.coordinator.markers().markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].color, MarkerColor::Red);
    }

    #[test]
    fn test_analyzing_local_pass_redraws_once_identities_are_stale() {
        let policy = RecognitionPolicy {
            remote_identify_interval_ms: 20,
            ..Default::default()
        };
        let mut h = harness(CoordinatorMode::Continuous, face_service(), policy);
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.coordinator.handle(CoordinatorEvent::FrameTick);
        h.pump_until(|h| h.identified() == 1 && h.settled());
        std::thread::sleep(Duration::from_millis(50));

        let live = h.current_local_result(false);
        h.coordinator.handle(live);
        let markers = h.coordinator.markers().markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].color, MarkerColor::White);
    }

    #[test]
    fn test_tap_enrolls_cropped_face_and_trains() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.identified() == 1);

        let id = h.coordinator.markers().markers()[0].id;
        h.coordinator.handle(CoordinatorEvent::MarkerTapped(id));
        assert!(h.coordinator.markers().marker(id).unwrap().activity.is_some());

        h.pump_until(|h| {
            h.coordinator
                .markers()
                .marker(id)
                .is_some_and(|m| m.activity.is_none())
        });
        let uploads = h.service.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "p1");
        assert_eq!(h.service.train_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tap_on_unidentified_marker_does_nothing() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        h.coordinator.handle(CoordinatorEvent::Toggle);
        h.pump_until(|h| h.identified() == 1);

        let id = h.coordinator.markers().markers()[1].id;
        h.coordinator.handle(CoordinatorEvent::MarkerTapped(id));
        assert!(h.coordinator.markers().marker(id).unwrap().activity.is_none());
        assert!(h.service.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_drains_in_flight_work_after_feed_ends() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        let tx = h.coordinator.sender();
        tx.send(CoordinatorEvent::Toggle).unwrap();
        tx.send(CoordinatorEvent::FeedEnded).unwrap();
        h.coordinator.run();

        assert_eq!(h.identified(), 1);
        assert_eq!(h.coordinator.markers().active_count(), 2);
    }

    #[test]
    fn test_shutdown_stops_immediately() {
        let mut h = harness(CoordinatorMode::Interactive, face_service(), RecognitionPolicy::default());
        assert!(!h.coordinator.handle(CoordinatorEvent::Shutdown));
        assert!(h.coordinator.handle(CoordinatorEvent::ViewResized(Size::new(200.0, 160.0))));
        assert_eq!(h.coordinator.view_size(), Some(Size::new(200.0, 160.0)));
    }
}
