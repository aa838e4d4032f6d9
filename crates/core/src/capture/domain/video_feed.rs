use crate::capture::domain::capture_error::CaptureError;
use crate::geometry::geometry_mapper::SourceOrientation;
use crate::shared::frame::Frame;

/// What a running feed pushes to its sink.
#[derive(Debug)]
pub enum FeedEvent {
    Frame(Frame),
    /// The source is exhausted. Nothing follows.
    Ended,
    /// Decoding stopped at this error. Nothing follows.
    Failed(CaptureError),
}

pub type FeedSink = Box<dyn FnMut(FeedEvent) + Send>;

/// Push-based source of decoded frames (drone downlink, camera, file).
///
/// `start` returns once the feed is running; frames are then delivered to
/// the sink from the feed's own thread.
pub trait VideoFeed: Send {
    fn start(&mut self, sink: FeedSink) -> Result<(), CaptureError>;

    /// Stops delivery. Safe to call more than once.
    fn stop(&mut self);

    /// Coordinate convention of this feed's frames.
    fn orientation(&self) -> SourceOrientation {
        SourceOrientation::Upright
    }
}
