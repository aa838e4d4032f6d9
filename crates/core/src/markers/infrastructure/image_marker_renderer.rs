use std::time::Instant;

use crate::markers::domain::face_marker::{FaceMarker, SCAN_BAR_HEIGHT};
use crate::markers::domain::marker_renderer::MarkerRenderer;
use crate::shared::frame::{Frame, CHANNELS};
use crate::shared::rect::Rect;

const DEFAULT_BORDER_WIDTH: u32 = 3;
/// Height of a label strip below the marker.
const LABEL_HEIGHT: f64 = 18.0;
const LABEL_GAP: f64 = 5.0;
/// Approximate glyph advance used to size label strips.
const LABEL_CHAR_WIDTH: f64 = 9.0;
const SCAN_COLOR: [u8; 3] = [255, 204, 0];
const LABEL_COLOR: [u8; 3] = [255, 59, 48];

/// CPU renderer that alpha-blends markers straight into frame pixels.
///
/// Borders use the marker colour at the marker's current opacity; labels
/// and the secondary label become solid red strips sized to their text,
/// and the activity indicator tints the whole box.
pub struct ImageMarkerRenderer {
    border_width: u32,
}

impl ImageMarkerRenderer {
    pub fn new(border_width: u32) -> Self {
        Self {
            border_width: border_width.max(1),
        }
    }
}

impl Default for ImageMarkerRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_BORDER_WIDTH)
    }
}

impl MarkerRenderer for ImageMarkerRenderer {
    fn render(
        &self,
        canvas: &mut Frame,
        markers: &[FaceMarker],
        now: Instant,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut painter = Painter::new(canvas);
        for marker in markers {
            let (frame, opacity) = marker.appearance(now);
            if frame.is_empty() || opacity <= 0.0 {
                continue;
            }
            let color = marker.color.rgb();

            if marker.activity.is_some() {
                painter.fill(&frame, color, opacity * 0.5);
            }
            painter.stroke(&frame, self.border_width as f64, color, opacity);

            if let Some(bars) = marker.scan_bars(now) {
                for y in [bars.top_y, bars.bottom_y] {
                    let bar = Rect::new(frame.x, frame.y + y, frame.width, SCAN_BAR_HEIGHT);
                    painter.fill(&bar, SCAN_COLOR, bars.opacity * 0.5);
                }
            }

            let mut label_y = frame.max_y() + LABEL_GAP;
            for text in [&marker.label, &marker.secondary_label].into_iter().flatten() {
                let strip = Rect::new(
                    frame.x,
                    label_y,
                    text.chars().count() as f64 * LABEL_CHAR_WIDTH,
                    LABEL_HEIGHT,
                );
                painter.fill(&strip, LABEL_COLOR, 1.0);
                label_y += LABEL_HEIGHT + 2.0;
            }
        }
        Ok(())
    }
}

/// Clipped alpha blending over a packed RGB buffer.
struct Painter<'a> {
    data: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> Painter<'a> {
    fn new(frame: &'a mut Frame) -> Self {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        Self {
            data: frame.data_mut(),
            width,
            height,
        }
    }

    /// Pixel bounds of `rect` clipped to the canvas, as `(x1, y1, x2, y2)`.
    fn clip(&self, rect: &Rect) -> Option<(usize, usize, usize, usize)> {
        let x1 = rect.x.max(0.0).round() as usize;
        let y1 = rect.y.max(0.0).round() as usize;
        let x2 = (rect.max_x().max(0.0).round() as usize).min(self.width);
        let y2 = (rect.max_y().max(0.0).round() as usize).min(self.height);
        (x2 > x1 && y2 > y1).then_some((x1, y1, x2, y2))
    }

    fn fill(&mut self, rect: &Rect, color: [u8; 3], alpha: f64) {
        let Some((x1, y1, x2, y2)) = self.clip(rect) else {
            return;
        };
        let a = alpha.clamp(0.0, 1.0);
        for y in y1..y2 {
            let row = y * self.width * CHANNELS;
            for x in x1..x2 {
                let offset = row + x * CHANNELS;
                for c in 0..CHANNELS {
                    let dst = self.data[offset + c] as f64;
                    self.data[offset + c] = (dst + (color[c] as f64 - dst) * a).round() as u8;
                }
            }
        }
    }

    fn stroke(&mut self, rect: &Rect, width: f64, color: [u8; 3], alpha: f64) {
        let w = width.min(rect.width / 2.0).min(rect.height / 2.0);
        let inner_h = rect.height - 2.0 * w;
        self.fill(&Rect::new(rect.x, rect.y, rect.width, w), color, alpha);
        self.fill(
            &Rect::new(rect.x, rect.max_y() - w, rect.width, w),
            color,
            alpha,
        );
        self.fill(&Rect::new(rect.x, rect.y + w, w, inner_h), color, alpha);
        self.fill(
            &Rect::new(rect.max_x() - w, rect.y + w, w, inner_h),
            color,
            alpha,
        );
    }
}
