use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, TryRecvError};

use crate::detection::domain::detected_face::DetectedFace;
use crate::recognition::domain::face_service::{FaceService, PersistedFace, Person, TrainingStatus};
use crate::recognition::domain::face_service_error::FaceServiceError;

/// Result of a call running on a worker thread, delivered exactly once.
pub struct Pending<T> {
    rx: Receiver<Result<T, FaceServiceError>>,
}

impl<T> Pending<T> {
    /// Blocks until the call completes.
    pub fn wait(self) -> Result<T, FaceServiceError> {
        self.rx.recv().unwrap_or(Err(FaceServiceError::Disconnected))
    }

    /// Returns the result if the call has completed, without blocking.
    pub fn try_take(&self) -> Option<Result<T, FaceServiceError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(FaceServiceError::Disconnected)),
        }
    }
}

/// Steps of a detect → identify chain.
#[derive(Debug)]
pub enum RemoteProgress {
    /// Faces found by the service, no identities yet.
    Detected(Vec<DetectedFace>),
    /// The same faces with identities and resolved names.
    Identified(Vec<DetectedFace>),
    /// The chain stopped at this error. Nothing follows.
    Failed(FaceServiceError),
}

pub type ProgressSink = Box<dyn FnMut(RemoteProgress) + Send>;

/// Non-blocking façade over a [`FaceService`].
///
/// Every call runs on its own thread. Person names looked up while
/// identifying are cached for the lifetime of the client.
#[derive(Clone)]
pub struct RemoteIdentificationClient {
    service: Arc<dyn FaceService>,
    names: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl RemoteIdentificationClient {
    pub fn new(service: Arc<dyn FaceService>) -> Self {
        Self {
            service,
            names: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn spawn<T, F>(&self, call: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FaceService) -> Result<T, FaceServiceError> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let service = Arc::clone(&self.service);
        std::thread::spawn(move || {
            let _ = tx.send(call(service.as_ref()));
        });
        Pending { rx }
    }

    pub fn detect_faces(&self, png: Vec<u8>) -> Pending<Vec<DetectedFace>> {
        self.spawn(move |s| s.detect_faces(&png))
    }

    pub fn identify_faces(&self, faces: Vec<DetectedFace>) -> Pending<Vec<DetectedFace>> {
        self.spawn(move |s| s.identify_faces(&faces))
    }

    pub fn upload_face(&self, png: Vec<u8>, person_id: String) -> Pending<PersistedFace> {
        self.spawn(move |s| s.upload_face(&png, &person_id))
    }

    pub fn train_person_group(&self) -> Pending<()> {
        self.spawn(|s| s.train_person_group())
    }

    pub fn training_status(&self) -> Pending<TrainingStatus> {
        self.spawn(|s| s.training_status())
    }

    pub fn create_person_group(&self, name: String, user_data: Option<String>) -> Pending<()> {
        self.spawn(move |s| s.create_person_group(&name, user_data.as_deref()))
    }

    pub fn create_person(&self, name: String, user_data: Option<String>) -> Pending<Person> {
        self.spawn(move |s| s.create_person(&name, user_data.as_deref()))
    }

    /// Uploads a face then starts training, as one call.
    pub fn enroll(&self, png: Vec<u8>, person_id: String) -> Pending<PersistedFace> {
        self.spawn(move |s| {
            let ack = s.upload_face(&png, &person_id)?;
            log::info!("Uploaded face {} for person {person_id}", ack.persisted_face_id);
            s.train_person_group()?;
            Ok(ack)
        })
    }

    /// Runs detect then identify on a worker and reports each step to
    /// `sink`, which is called from the worker thread.
    ///
    /// No faces detected ends the chain after `Detected(vec![])`. Every
    /// chain ends in exactly one terminal step, even if the worker dies.
    pub fn detect_and_identify(&self, png: Vec<u8>, sink: ProgressSink) {
        let service = Arc::clone(&self.service);
        let names = Arc::clone(&self.names);
        std::thread::spawn(move || {
            let mut chain = ChainReporter::new(sink);
            let faces = match service.detect_faces(&png) {
                Ok(faces) => faces,
                Err(e) => return chain.report(RemoteProgress::Failed(e)),
            };
            chain.report(RemoteProgress::Detected(faces.clone()));
            if faces.is_empty() {
                return;
            }
            match service.identify_faces(&faces) {
                Ok(mut identified) => {
                    resolve_names(service.as_ref(), &names, &mut identified);
                    chain.report(RemoteProgress::Identified(identified));
                }
                Err(e) => chain.report(RemoteProgress::Failed(e)),
            }
        });
    }

    /// Cached display name for `person_id`, if it was looked up before.
    pub fn cached_name(&self, person_id: &str) -> Option<String> {
        self.names
            .lock()
            .ok()
            .and_then(|names| names.get(person_id).cloned().flatten())
    }
}

/// Forwards chain steps to the sink and reports `Failed(Disconnected)` if
/// it is dropped before a terminal step went out.
struct ChainReporter {
    sink: ProgressSink,
    finished: bool,
}

impl ChainReporter {
    fn new(sink: ProgressSink) -> Self {
        Self {
            sink,
            finished: false,
        }
    }

    fn report(&mut self, progress: RemoteProgress) {
        self.finished = match &progress {
            RemoteProgress::Detected(faces) => faces.is_empty(),
            RemoteProgress::Identified(_) | RemoteProgress::Failed(_) => true,
        };
        (self.sink)(progress);
    }
}

impl Drop for ChainReporter {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Remote identification worker stopped mid-chain");
            (self.sink)(RemoteProgress::Failed(FaceServiceError::Disconnected));
        }
    }
}

/// Fills in `identity.name` from the cache, looking up unknown persons.
///
/// A failed lookup leaves the name empty and is not cached, so the next
/// chain retries it.
fn resolve_names(
    service: &dyn FaceService,
    names: &Mutex<HashMap<String, Option<String>>>,
    faces: &mut [DetectedFace],
) {
    for identity in faces.iter_mut().filter_map(|f| f.identity.as_mut()) {
        let cached = names
            .lock()
            .ok()
            .and_then(|n| n.get(&identity.person_id).cloned());
        identity.name = match cached {
            Some(name) => name,
            None => match service.get_person(&identity.person_id) {
                Ok(person) => {
                    if let Ok(mut n) = names.lock() {
                        n.insert(identity.person_id.clone(), person.name.clone());
                    }
                    person.name
                }
                Err(e) => {
                    log::warn!("Could not resolve name for person {}: {e}", identity.person_id);
                    None
                }
            },
        };
    }
}
