use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::capture::domain::device_control::{CaptureMode, Completion, DeviceControl};

/// Device control for setups without controllable hardware. Commands are
/// logged and always succeed.
#[derive(Default)]
pub struct LoggingDeviceControl {
    lights_on: AtomicBool,
    mode: Mutex<Option<CaptureMode>>,
}

impl LoggingDeviceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lights_on(&self) -> bool {
        self.lights_on.load(Ordering::Relaxed)
    }

    pub fn capture_mode(&self) -> Option<CaptureMode> {
        self.mode.lock().ok().and_then(|m| *m)
    }
}

impl DeviceControl for LoggingDeviceControl {
    fn set_indicator_lights(&self, on: bool, completion: Completion) {
        let was = self.lights_on.swap(on, Ordering::Relaxed);
        if was != on {
            log::info!("Indicator lights {}", if on { "on" } else { "off" });
        }
        completion(Ok(()));
    }

    fn set_capture_mode(&self, mode: CaptureMode, completion: Completion) {
        if let Ok(mut current) = self.mode.lock() {
            *current = Some(mode);
        }
        log::info!("Capture mode {mode:?}");
        completion(Ok(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_tracks_state_and_completes() {
        let device = LoggingDeviceControl::new();
        let completed = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&completed);
        device.set_indicator_lights(
            true,
            Box::new(move |r| {
                assert!(r.is_ok());
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(device.lights_on());

        let c = Arc::clone(&completed);
        device.set_capture_mode(
            CaptureMode::Photo,
            Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(device.capture_mode(), Some(CaptureMode::Photo));
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }
}
