use std::sync::{Arc, Mutex};

use crate::shared::frame::Frame;

/// Most recent frame of a live feed, shared between the feed thread and
/// whoever needs stills from it.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Frame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(Arc::new(frame));
        }
    }

    pub fn current(&self) -> Option<Arc<Frame>> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    /// Delivers a copy of the current frame to `callback` on another
    /// thread. `None` means no frame has arrived yet.
    pub fn snapshot<F>(&self, callback: F)
    where
        F: FnOnce(Option<Frame>) + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        std::thread::spawn(move || {
            let frame = slot
                .lock()
                .ok()
                .and_then(|s| s.clone())
                .map(|f| Frame::clone(&f));
            callback(frame);
        });
    }
}
