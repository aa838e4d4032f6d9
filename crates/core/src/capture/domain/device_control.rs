use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureMode {
    Photo,
    Video,
}

/// Transport-level failure of a device command.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device rejected '{command}': {reply}")]
    Rejected { command: String, reply: String },
    #[error("no reply from device")]
    Timeout,
    #[error("device does not support {0}")]
    Unsupported(&'static str),
    #[error("device connection closed")]
    Disconnected,
}

pub type Completion = Box<dyn FnOnce(Result<(), DeviceError>) + Send>;

/// Fire-and-forget commands to the host device.
///
/// Calls return immediately; `completion` runs later, on any thread.
pub trait DeviceControl: Send + Sync {
    fn set_indicator_lights(&self, on: bool, completion: Completion);

    fn set_capture_mode(&self, mode: CaptureMode, completion: Completion);
}

/// Completion that only logs failures. Commands the device lacks are
/// logged at debug level.
pub fn log_failure(action: &'static str) -> Completion {
    Box::new(move |result| match result {
        Ok(()) => {}
        Err(e @ DeviceError::Unsupported(_)) => log::debug!("Device command '{action}' skipped: {e}"),
        Err(e) => log::warn!("Device command '{action}' failed: {e}"),
    })
}
