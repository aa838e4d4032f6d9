//! BlazeFace face detector using ONNX Runtime via `ort`.
//!
//! The on-device detector behind the live overlay: bounding boxes only,
//! no landmarks, no identity.
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Fixed high-accuracy score threshold. Not user configurable.
pub const HIGH_ACCURACY_CONFIDENCE: f32 = 0.75;

const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + 6 keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(platform_providers())?
            .commit_from_file(model_path)?;
        log::info!("Loaded BlazeFace model from {}", model_path.display());
        Ok(Self {
            session,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
        let input_tensor = preprocess(frame, INPUT_SIZE).ok_or("Frame data does not match its dimensions")?;

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut candidates = decode(
            reg_data,
            score_data,
            &self.anchors,
            frame.width() as f32,
            frame.height() as f32,
        );
        Ok(nms(&mut candidates, NMS_IOU_THRESH))
    }
}

/// Nearest-neighbour resize to `size × size`, normalised to [0,1], NCHW.
fn preprocess(frame: &Frame, size: u32) -> Option<ndarray::Array4<f32>> {
    let src = frame.as_ndarray()?;
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }
    Some(tensor)
}

/// Two feature maps, 16×16 with 2 anchors per cell and 8×8 with 6.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}

#[derive(Clone, Debug)]
struct Candidate {
    rect: Rect,
    score: f32,
}

/// Decodes anchor-relative boxes above the confidence threshold into
/// frame pixel coordinates, clamped to the frame.
fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    frame_w: f32,
    frame_h: f32,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    let n = anchors.len().min(NUM_ANCHORS);

    for (i, &raw_score) in score_data.iter().enumerate().take(n) {
        let score = sigmoid(raw_score);
        if score < HIGH_ACCURACY_CONFIDENCE {
            continue;
        }
        let offset = i * REGRESSOR_STRIDE;
        if offset + 4 > reg_data.len() {
            break;
        }

        let anchor = anchors[i];
        let cx = anchor[0] + reg_data[offset] / INPUT_SIZE as f32;
        let cy = anchor[1] + reg_data[offset + 1] / INPUT_SIZE as f32;
        let w = reg_data[offset + 2] / INPUT_SIZE as f32;
        let h = reg_data[offset + 3] / INPUT_SIZE as f32;

        let x1 = ((cx - w / 2.0) * frame_w).max(0.0);
        let y1 = ((cy - h / 2.0) * frame_h).max(0.0);
        let x2 = ((cx + w / 2.0) * frame_w).min(frame_w);
        let y2 = ((cy + h / 2.0) * frame_h).min(frame_h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        out.push(Candidate {
            rect: Rect::from_corners(x1 as f64, y1 as f64, x2 as f64, y2 as f64),
            score,
        });
    }
    out
}

fn nms(candidates: &mut [Candidate], iou_thresh: f64) -> Vec<Rect> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Rect> = Vec::new();
    for c in candidates.iter() {
        if keep.iter().all(|k| k.iou(&c.rect) <= iou_thresh) {
            keep.push(c.rect);
        }
    }
    keep
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// CoreML on macOS, DirectML on Windows. ort falls back to CPU when the
/// provider cannot be registered.
fn platform_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[allow(unused_mut)]
    let mut providers = Vec::new();
    #[cfg(target_os = "macos")]
    providers.push(ort::execution_providers::CoreMLExecutionProvider::default().build());
    #[cfg(target_os = "windows")]
    providers.push(ort::execution_providers::DirectMLExecutionProvider::default().build());
    providers
}
