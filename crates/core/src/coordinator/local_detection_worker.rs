use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::coordinator::coordinator_event::CoordinatorEvent;
use crate::detection::domain::local_detector_adapter::LocalDetectorAdapter;
use crate::shared::frame::Frame;

pub struct DetectionJob {
    pub generation: u64,
    pub frame: Arc<Frame>,
    pub preview: bool,
}

/// Runs local detection on its own thread and posts results back as
/// [`CoordinatorEvent::LocalDetected`].
///
/// At most one job waits behind the one being processed.
pub struct LocalDetectionWorker {
    jobs: Option<Sender<DetectionJob>>,
    /// Same queue as `jobs`, used to take back a job still waiting.
    queued: Receiver<DetectionJob>,
    handle: Option<JoinHandle<()>>,
}

/// Outcome of [`LocalDetectionWorker::submit_replacing`].
#[derive(Debug, PartialEq, Eq)]
pub struct Replaced {
    pub accepted: bool,
    /// Queued jobs removed to make room. They produce no result.
    pub displaced: usize,
}

impl LocalDetectionWorker {
    pub fn spawn(mut adapter: LocalDetectorAdapter, events: Sender<CoordinatorEvent>) -> Self {
        let (tx, rx) = crossbeam_channel::bounded::<DetectionJob>(1);
        let queued = rx.clone();
        let handle = std::thread::spawn(move || {
            for job in rx {
                let faces = adapter.detect(&job.frame);
                log::debug!("Local detection on frame {}: {} face(s)", job.frame.index(), faces.len());
                let event = CoordinatorEvent::LocalDetected {
                    generation: job.generation,
                    frame: job.frame,
                    faces,
                    preview: job.preview,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });
        Self {
            jobs: Some(tx),
            queued,
            handle: Some(handle),
        }
    }

    fn stopped(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Queues `job` unless the worker is saturated. Returns false when the
    /// job was dropped.
    pub fn try_submit(&self, job: DetectionJob) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        if self.stopped() {
            log::warn!("Local detection worker has stopped");
            return false;
        }
        match jobs.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Local detection worker has stopped");
                false
            }
        }
    }

    /// Queues `job` without waiting, taking out any job still queued to
    /// make room. The job being processed is left to finish.
    pub fn submit_replacing(&self, job: DetectionJob) -> Replaced {
        let mut replaced = Replaced {
            accepted: false,
            displaced: 0,
        };
        let Some(jobs) = &self.jobs else {
            return replaced;
        };
        if self.stopped() {
            log::warn!("Local detection worker has stopped");
            return replaced;
        }
        let mut job = job;
        loop {
            match jobs.try_send(job) {
                Ok(()) => {
                    replaced.accepted = true;
                    return replaced;
                }
                Err(TrySendError::Full(back)) => {
                    job = back;
                    if let Ok(old) = self.queued.try_recv() {
                        log::debug!("Replaced queued detection of frame {}", old.frame.index());
                        replaced.displaced += 1;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return replaced,
            }
        }
    }
}

impl Drop for LocalDetectionWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
