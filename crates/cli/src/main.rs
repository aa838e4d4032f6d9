use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::Sender;

use facespotter_core::capture::domain::device_control::{log_failure, CaptureMode, DeviceControl};
use facespotter_core::capture::domain::latest_frame::LatestFrame;
use facespotter_core::capture::domain::video_feed::{FeedEvent, VideoFeed};
use facespotter_core::capture::infrastructure::ffmpeg_video_feed::FfmpegVideoFeed;
use facespotter_core::capture::infrastructure::logging_device_control::LoggingDeviceControl;
use facespotter_core::capture::infrastructure::still_image_feed::StillImageFeed;
use facespotter_core::capture::infrastructure::tello_device_control::TelloDeviceControl;
use facespotter_core::coordinator::capture_coordinator::{
    CaptureCoordinator, CoordinatorParts, CoordinatorSettings,
};
use facespotter_core::coordinator::coordinator_event::CoordinatorEvent;
use facespotter_core::coordinator::coordinator_observer::{CoordinatorObserver, LogObserver};
use facespotter_core::coordinator::interaction_state::{CoordinatorMode, InteractionState};
use facespotter_core::detection::domain::detected_face::DetectedFace;
use facespotter_core::detection::domain::local_detector_adapter::LocalDetectorAdapter;
use facespotter_core::detection::infrastructure::model_resolver;
use facespotter_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use facespotter_core::geometry::geometry_mapper::SourceOrientation;
use facespotter_core::markers::domain::face_marker::{FaceMarker, MarkerId};
use facespotter_core::markers::domain::marker_pool::MARKER_TRANSITION;
use facespotter_core::markers::domain::marker_renderer::MarkerRenderer;
use facespotter_core::markers::domain::marker_style::confidence_percent;
use facespotter_core::markers::infrastructure::image_marker_renderer::ImageMarkerRenderer;
use facespotter_core::recognition::domain::face_service::FaceService;
use facespotter_core::recognition::domain::face_service_error::FaceServiceError;
use facespotter_core::recognition::infrastructure::http_face_client::HttpFaceClient;
use facespotter_core::recognition::remote_identification_client::RemoteIdentificationClient;
use facespotter_core::shared::constants::{
    BLAZEFACE_MODEL_NAME, BLAZEFACE_MODEL_URL, IMAGE_EXTENSIONS,
};
use facespotter_core::shared::frame::Frame;
use facespotter_core::shared::rect::Size;
use facespotter_core::shared::service_config::ServiceConfig;

/// Past every marker transition and scan animation.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Face annotation and identification for drone and camera video.
#[derive(Parser)]
#[command(name = "facespotter")]
struct Cli {
    /// Service config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local BlazeFace model (downloaded on first use when omitted).
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect and identify faces in a still image.
    Analyze {
        image: PathBuf,

        /// Write the image with markers drawn on it.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Annotate a live stream or video file.
    ///
    /// Interactive controls on stdin: empty line toggles, `tap <n>` taps
    /// marker n, `q` quits.
    Watch {
        /// Video or image file, or a stream URL (udp://, rtsp://, ...).
        source: String,

        #[arg(long, value_enum, default_value = "continuous")]
        mode: Mode,

        #[arg(long, value_enum, default_value = "upright")]
        orientation: Orientation,

        /// Pace file playback at the stream frame rate.
        #[arg(long)]
        realtime: bool,

        /// Drive the drone in the config's "device" block (starts its video stream).
        #[arg(long)]
        device: bool,

        /// Save an annotated still whenever identified faces are drawn.
        #[arg(long)]
        snapshots: Option<PathBuf>,
    },
    /// Upload a face image for a person and retrain the group.
    Enroll {
        person_id: String,
        image: PathBuf,

        /// Skip starting training after the upload.
        #[arg(long)]
        no_train: bool,
    },
    /// Create the configured person group.
    CreateGroup {
        name: String,
        #[arg(long)]
        user_data: Option<String>,
    },
    /// Create a person in the configured group.
    CreatePerson {
        name: String,
        #[arg(long)]
        user_data: Option<String>,
    },
    /// Show the training state of the configured group.
    TrainingStatus,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Interactive,
    Continuous,
}

impl From<Mode> for CoordinatorMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Interactive => CoordinatorMode::Interactive,
            Mode::Continuous => CoordinatorMode::Continuous,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Orientation {
    Upright,
    FlippedY,
    Mirrored,
}

impl From<Orientation> for SourceOrientation {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Upright => SourceOrientation::Upright,
            Orientation::FlippedY => SourceOrientation::FlippedY,
            Orientation::Mirrored => SourceOrientation::FlippedMirrored,
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let client = HttpFaceClient::new(&config)?;
    log::info!("Using person group {}", client.person_group_id());
    let service: Arc<dyn FaceService> = Arc::new(client);

    match cli.command {
        Command::Analyze { image, output } => {
            let detector = build_detector(cli.model.as_deref())?;
            run_analyze(&config, service, detector, &image, output.as_deref())
        }
        Command::Watch {
            source,
            mode,
            orientation,
            realtime,
            device,
            snapshots,
        } => {
            let detector = build_detector(cli.model.as_deref())?;
            let feed = open_feed(source, realtime, orientation.into());
            let device = build_device(&config, device)?;
            run_watch(&config, service, detector, feed, device, mode.into(), snapshots)
        }
        Command::Enroll {
            person_id,
            image,
            no_train,
        } => {
            let png = StillImageFeed::new(&image).load()?.encode_png()?;
            let persisted = service.upload_face(&png, &person_id)?;
            println!("Added face {} to person {person_id}", persisted.persisted_face_id);
            if !no_train {
                service.train_person_group()?;
                println!("Training started");
            }
            Ok(())
        }
        Command::CreateGroup { name, user_data } => {
            service.create_person_group(&name, user_data.as_deref())?;
            println!("Person group {} ready", config.person_group_id);
            Ok(())
        }
        Command::CreatePerson { name, user_data } => {
            let person = service.create_person(&name, user_data.as_deref())?;
            println!("{}", person.person_id);
            Ok(())
        }
        Command::TrainingStatus => {
            let status = service.training_status()?;
            println!("{:?}", status.status);
            if let Some(message) = status.message {
                println!("{message}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => ServiceConfig::default_path()?,
    };
    log::debug!("Loading config from {}", path.display());
    Ok(ServiceConfig::load(&path)?)
}

fn build_detector(model: Option<&Path>) -> Result<LocalDetectorAdapter, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {BLAZEFACE_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        BLAZEFACE_MODEL_NAME,
        BLAZEFACE_MODEL_URL,
        model,
        Some(Box::new(download_progress)),
    )?;
    let backend = OnnxBlazefaceDetector::new(&model_path)?;
    Ok(LocalDetectorAdapter::new(Box::new(backend)))
}

fn build_device(
    config: &ServiceConfig,
    use_device: bool,
) -> Result<Arc<dyn DeviceControl>, Box<dyn std::error::Error>> {
    match (&config.device, use_device) {
        (Some(settings), true) => Ok(Arc::new(TelloDeviceControl::connect(settings)?)),
        (None, true) => Err("--device requires a \"device\" block in the config".into()),
        (_, false) => Ok(Arc::new(LoggingDeviceControl::new())),
    }
}

fn open_feed(source: String, realtime: bool, orientation: SourceOrientation) -> Box<dyn VideoFeed> {
    if is_image(Path::new(&source)) {
        Box::new(StillImageFeed::new(source))
    } else {
        Box::new(
            FfmpegVideoFeed::new(source)
                .realtime(realtime)
                .with_orientation(orientation),
        )
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn run_analyze(
    config: &ServiceConfig,
    service: Arc<dyn FaceService>,
    detector: LocalDetectorAdapter,
    image: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let latest = LatestFrame::new();
    latest.store(StillImageFeed::new(image).load()?);

    let mut coordinator = CaptureCoordinator::new(
        CoordinatorSettings {
            mode: CoordinatorMode::Interactive,
            policy: config.policy.clone(),
            view_size: None,
            orientation: SourceOrientation::Upright,
        },
        CoordinatorParts {
            latest,
            detector,
            remote: RemoteIdentificationClient::new(service),
            device: Arc::new(LoggingDeviceControl::new()),
            observer: Box::new(LogObserver),
        },
    );
    let events = coordinator.sender();
    events.send(CoordinatorEvent::Toggle)?;
    events.send(CoordinatorEvent::FeedEnded)?;
    coordinator.run();

    let markers = coordinator.markers().markers();
    for marker in markers {
        println!("{}", describe_marker(marker));
    }
    if markers.is_empty() {
        println!("No faces found");
    }

    if let Some(output) = output {
        let preview = coordinator
            .preview()
            .ok_or("no preview was captured")?;
        write_annotated(preview, markers, output)?;
        log::info!("Output written to {}", output.display());
    }
    Ok(())
}

fn run_watch(
    config: &ServiceConfig,
    service: Arc<dyn FaceService>,
    detector: LocalDetectorAdapter,
    mut feed: Box<dyn VideoFeed>,
    device: Arc<dyn DeviceControl>,
    mode: CoordinatorMode,
    snapshots: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = &snapshots {
        std::fs::create_dir_all(dir)?;
    }
    device.set_capture_mode(CaptureMode::Video, log_failure("video mode"));

    let latest = LatestFrame::new();
    let mut coordinator = CaptureCoordinator::new(
        CoordinatorSettings {
            mode,
            policy: config.policy.clone(),
            view_size: None,
            orientation: feed.orientation(),
        },
        CoordinatorParts {
            latest: latest.clone(),
            detector,
            remote: RemoteIdentificationClient::new(service),
            device,
            observer: Box::new(SnapshotObserver::new(snapshots)),
        },
    );
    let events = coordinator.sender();
    if mode == CoordinatorMode::Continuous {
        events.send(CoordinatorEvent::Toggle)?;
    }

    let feed_events = events.clone();
    feed.start(Box::new(move |event| {
        let next = match event {
            FeedEvent::Frame(frame) => {
                latest.store(frame);
                CoordinatorEvent::FrameTick
            }
            FeedEvent::Ended => CoordinatorEvent::FeedEnded,
            FeedEvent::Failed(e) => {
                log::warn!("Video feed failed: {e}");
                CoordinatorEvent::FeedEnded
            }
        };
        let _ = feed_events.send(next);
    }))?;

    spawn_stdin_controls(events);

    coordinator.run();
    feed.stop();
    Ok(())
}

/// Reads interactive controls from stdin and posts them to the coordinator.
fn spawn_stdin_controls(events: Sender<CoordinatorEvent>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let event = match parse_control(&line) {
                Some(event) => event,
                None => {
                    eprintln!("Unknown control '{line}' (enter, tap <n>, q)");
                    continue;
                }
            };
            let quit = matches!(event, CoordinatorEvent::Shutdown);
            if events.send(event).is_err() || quit {
                break;
            }
        }
    });
}

fn parse_control(line: &str) -> Option<CoordinatorEvent> {
    let mut words = line.split_whitespace();
    match words.next() {
        None => Some(CoordinatorEvent::Toggle),
        Some("q") | Some("quit") => Some(CoordinatorEvent::Shutdown),
        Some("tap") => words
            .next()
            .and_then(|n| n.trim_start_matches('#').parse().ok())
            .map(|n| CoordinatorEvent::MarkerTapped(MarkerId(n))),
        Some("view") => {
            let (w, h) = words.next()?.split_once('x')?;
            Some(CoordinatorEvent::ViewResized(Size::new(w.parse().ok()?, h.parse().ok()?)))
        }
        Some(_) => None,
    }
}

/// Logs coordinator activity and, when a directory is set, saves an
/// annotated still every time identified faces are drawn.
struct SnapshotObserver {
    log: LogObserver,
    dir: Option<PathBuf>,
    saved: usize,
}

impl SnapshotObserver {
    fn new(dir: Option<PathBuf>) -> Self {
        Self {
            log: LogObserver,
            dir,
            saved: 0,
        }
    }
}

impl CoordinatorObserver for SnapshotObserver {
    fn state_changed(&mut self, from: InteractionState, to: InteractionState) {
        self.log.state_changed(from, to);
        println!("[{}]", to.button_title());
    }

    fn markers_updated(&mut self, frame: Option<&Frame>, markers: &[FaceMarker]) {
        self.log.markers_updated(frame, markers);
        let (Some(dir), Some(frame)) = (&self.dir, frame) else {
            return;
        };
        if !markers.iter().any(|m| m.face.is_some()) {
            return;
        }
        let path = dir.join(format!("snapshot-{:05}.png", self.saved));
        match write_annotated(frame, markers, &path) {
            Ok(()) => self.saved += 1,
            Err(e) => log::warn!("Could not save {}: {e}", path.display()),
        }
    }

    fn faces_identified(&mut self, faces: &[DetectedFace]) {
        self.log.faces_identified(faces);
        for face in faces {
            if let Some(identity) = &face.identity {
                println!("{} ({}%)", identity.label(), confidence_percent(identity.confidence));
            }
        }
    }

    fn remote_failed(&mut self, error: &FaceServiceError) {
        self.log.remote_failed(error);
    }
}

fn write_annotated(
    frame: &Frame,
    markers: &[FaceMarker],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut canvas = frame.clone();
    let settled = Instant::now() + MARKER_TRANSITION + SETTLE_DELAY;
    ImageMarkerRenderer::default().render(&mut canvas, markers, settled)?;
    std::fs::write(path, canvas.encode_png()?)?;
    Ok(())
}

fn describe_marker(marker: &FaceMarker) -> String {
    let r = marker.frame;
    let place = format!(
        "{} at ({:.0}, {:.0}) {:.0}x{:.0}",
        marker.id, r.x, r.y, r.width, r.height
    );
    match (&marker.label, &marker.secondary_label) {
        (Some(label), Some(pct)) => format!("{place}: {label} {pct}"),
        (Some(label), None) => format!("{place}: {label}"),
        _ if marker.face.is_some() => format!("{place}: unknown"),
        _ => place,
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
