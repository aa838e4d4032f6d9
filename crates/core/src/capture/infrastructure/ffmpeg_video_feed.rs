use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::video_feed::{FeedEvent, FeedSink, VideoFeed};
use crate::geometry::geometry_mapper::SourceOrientation;
use crate::shared::frame::Frame;

/// Decodes a video file or network stream (`udp://`, `rtsp://`, ...) via
/// ffmpeg-next and pushes RGB frames from a background thread.
///
/// With `realtime` set, frames are paced at the stream's frame rate so a
/// file behaves like a live downlink.
pub struct FfmpegVideoFeed {
    location: String,
    realtime: bool,
    orientation: SourceOrientation,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FfmpegVideoFeed {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            realtime: false,
            orientation: SourceOrientation::Upright,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn with_orientation(mut self, orientation: SourceOrientation) -> Self {
        self.orientation = orientation;
        self
    }
}

impl VideoFeed for FfmpegVideoFeed {
    fn start(&mut self, mut sink: FeedSink) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        self.stop.store(false, Ordering::Relaxed);

        // ffmpeg contexts are not Send, so the stream is opened on the
        // decode thread and the outcome reported back.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let location = self.location.clone();
        let realtime = self.realtime;
        let stop = Arc::clone(&self.stop);

        let handle = std::thread::Builder::new()
            .name("video-feed".into())
            .spawn(move || {
                let mut decoder = match StreamDecoder::open(&location) {
                    Ok(decoder) => {
                        let _ = ready_tx.send(Ok(()));
                        decoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                log::info!(
                    "Decoding {location} ({}x{}, {:.1} fps)",
                    decoder.width,
                    decoder.height,
                    decoder.fps
                );
                decoder.run(&mut sink, &stop, realtime);
            })
            .map_err(|e| CaptureError::Open {
                location: self.location.clone(),
                source: Box::new(e),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::Decode(
                "video feed thread exited before opening the stream".into(),
            )),
        }
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn orientation(&self) -> SourceOrientation {
        self.orientation
    }
}

impl Drop for FfmpegVideoFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

struct StreamDecoder {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    fps: f64,
    frame_index: usize,
}

impl StreamDecoder {
    fn open(location: &str) -> Result<Self, CaptureError> {
        let open_err = |e: ffmpeg_next::Error| CaptureError::Open {
            location: location.to_string(),
            source: Box::new(e),
        };
        ffmpeg_next::init().map_err(open_err)?;
        let ictx = ffmpeg_next::format::input(location).map_err(open_err)?;

        let (stream_index, fps, decoder) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or_else(|| CaptureError::NoVideoStream(location.to_string()))?;
            let rate = stream.rate();
            let fps = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            let decoder =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
                    .and_then(|ctx| ctx.decoder().video())
                    .map_err(|e| CaptureError::Decode(Box::new(e)))?;
            (stream.index(), fps, decoder)
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| CaptureError::Decode(Box::new(e)))?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            fps,
            frame_index: 0,
        })
    }

    fn frame_interval(&self, realtime: bool) -> Option<Duration> {
        (realtime && self.fps > 0.0).then(|| Duration::from_secs_f64(1.0 / self.fps))
    }

    fn run(&mut self, sink: &mut FeedSink, stop: &AtomicBool, realtime: bool) {
        let pacing = self.frame_interval(realtime).map(|i| (Instant::now(), i));
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let Some((stream, packet)) = self.ictx.packets().next() else {
                break;
            };
            if stream.index() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
                continue;
            }
            if !self.drain(sink, stop, pacing) {
                return;
            }
        }

        let _ = self.decoder.send_eof();
        if self.drain(sink, stop, pacing) {
            sink(FeedEvent::Ended);
        }
    }

    /// Pushes every frame the decoder has ready. Returns false when
    /// decoding must stop.
    fn drain(
        &mut self,
        sink: &mut FeedSink,
        stop: &AtomicBool,
        pacing: Option<(Instant, Duration)>,
    ) -> bool {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
                sink(FeedEvent::Failed(CaptureError::Decode(Box::new(e))));
                return false;
            }
            let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
            let frame = Frame::new(pixels, self.width, self.height, self.frame_index);

            if let Some((started, interval)) = pacing {
                let due = started + interval.mul_f64(self.frame_index as f64);
                let now = Instant::now();
                if due > now {
                    std::thread::sleep(due - now);
                }
            }
            self.frame_index += 1;
            sink(FeedEvent::Frame(frame));
        }
        true
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed RGB buffer,
/// dropping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
