use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendError, Sender};
use tello::Drone;

use crate::capture::domain::device_control::{CaptureMode, Completion, DeviceControl, DeviceError};
use crate::shared::service_config::DeviceSettings;

/// Drone calls made by the command worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    /// Enters SDK mode. Sent once, before the first real command.
    Enable,
    /// Starts the video stream.
    VideoOn,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Command::Enable => "command",
            Command::VideoOn => "streamon",
        }
    }
}

struct Job {
    command: Command,
    completion: Completion,
}

/// Device control for a Tello drone, driven through the `tello` crate.
///
/// The drone session and its async runtime live on one worker thread.
/// Commands are queued to it and run one at a time, so each reply is
/// matched to the command that caused it.
pub struct TelloDeviceControl {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl TelloDeviceControl {
    pub fn connect(settings: &DeviceSettings) -> Result<Self, DeviceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let address = settings.address.clone();
        let reply_timeout = Duration::from_millis(settings.reply_timeout_ms.max(1));
        log::info!("Drone control on {address}");

        Self::spawn(move || {
            let mut drone = {
                let _entered = runtime.enter();
                Drone::new(&address).command_mode()
            };
            move |command: Command| {
                let call = async {
                    match command {
                        Command::Enable => drone.enable().await.map(drop).map_err(|e| format!("{e:?}")),
                        Command::VideoOn => drone.video_on().await.map(drop).map_err(|e| format!("{e:?}")),
                    }
                };
                match runtime.block_on(tokio::time::timeout(reply_timeout, call)) {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(reply)) => Err(DeviceError::Rejected {
                        command: command.name().to_string(),
                        reply,
                    }),
                    Err(_) => Err(DeviceError::Timeout),
                }
            }
        })
    }

    /// Starts the command worker. `open` runs on the worker and returns
    /// the function that executes one command.
    fn spawn<O, E>(open: O) -> Result<Self, DeviceError>
    where
        O: FnOnce() -> E + Send + 'static,
        E: FnMut(Command) -> Result<(), DeviceError>,
    {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let worker = std::thread::Builder::new()
            .name("device-control".into())
            .spawn(move || serve(rx, open()))?;
        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    fn enqueue(&self, command: Command, completion: Completion) {
        let job = Job {
            command,
            completion,
        };
        match &self.jobs {
            Some(jobs) => {
                if let Err(SendError(job)) = jobs.send(job) {
                    (job.completion)(Err(DeviceError::Disconnected));
                }
            }
            None => (job.completion)(Err(DeviceError::Disconnected)),
        }
    }
}

/// Runs queued jobs until the queue closes, entering SDK mode first. A
/// failed `Enable` fails the job that needed it and is retried with the
/// next one.
fn serve(jobs: Receiver<Job>, mut execute: impl FnMut(Command) -> Result<(), DeviceError>) {
    let mut enabled = false;
    for job in jobs {
        if !enabled {
            match execute(Command::Enable) {
                Ok(()) => enabled = true,
                Err(e) => {
                    (job.completion)(Err(e));
                    continue;
                }
            }
        }
        log::debug!("Drone command: {}", job.command.name());
        (job.completion)(execute(job.command));
    }
}

impl DeviceControl for TelloDeviceControl {
    fn set_indicator_lights(&self, _on: bool, completion: Completion) {
        completion(Err(DeviceError::Unsupported("indicator lights")));
    }

    fn set_capture_mode(&self, mode: CaptureMode, completion: Completion) {
        match mode {
            CaptureMode::Video => self.enqueue(Command::VideoOn, completion),
            CaptureMode::Photo => completion(Err(DeviceError::Unsupported("photo capture"))),
        }
    }
}

impl Drop for TelloDeviceControl {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
