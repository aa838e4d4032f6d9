use std::path::PathBuf;

use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::video_feed::{FeedEvent, FeedSink, VideoFeed};
use crate::shared::frame::Frame;

/// Presents a single image file as a feed: one frame, then `Ended`.
pub struct StillImageFeed {
    path: PathBuf,
    started: bool,
}

impl StillImageFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started: false,
        }
    }

    pub fn load(&self) -> Result<Frame, CaptureError> {
        let img = image::open(&self.path).map_err(|e| CaptureError::Image {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(Frame::from_rgb_image(img.to_rgb8(), 0))
    }
}

impl VideoFeed for StillImageFeed {
    fn start(&mut self, mut sink: FeedSink) -> Result<(), CaptureError> {
        if self.started {
            return Err(CaptureError::AlreadyStarted);
        }
        let frame = self.load()?;
        self.started = true;
        std::thread::spawn(move || {
            sink(FeedEvent::Frame(frame));
            sink(FeedEvent::Ended);
        });
        Ok(())
    }

    fn stop(&mut self) {}
}
