//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the frame into the 640×640 network input, decodes the three
//! anchor-free stride heads, and suppresses overlapping boxes with NMS.

use crate::frame::Frame;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting a frame into the square network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    new_w: u32,
    new_h: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, target);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            pad_x: (target - new_w) as f32 / 2.0,
            pad_y: (target - new_h) as f32 / 2.0,
            new_w,
            new_h,
        }
    }

    /// Map a point from network-input space back to original frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride: score, bbox, keypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
    confidence_threshold: f32,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path, confidence_threshold: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            confidence_threshold,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let outputs = discover_outputs(&output_names);
        tracing::debug!(?outputs, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            outputs,
            confidence_threshold,
        })
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = preprocess(frame);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let idx = self.outputs[slot];
            let extract = |i: usize, what: &str| {
                outputs[i]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let head = StrideHead {
                stride,
                scores: extract(idx.score, "scores")?,
                bboxes: extract(idx.bbox, "bboxes")?,
                kps: extract(idx.kps, "kps")?,
            };
            candidates.extend(head.decode(&letterbox, self.confidence_threshold));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Letterbox-resize a grayscale frame into a normalized NCHW tensor.
///
/// Padding uses the mean value, so it normalizes to exactly 0.0.
fn preprocess(frame: &Frame) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(frame.width(), frame.height(), SCRFD_INPUT_SIZE);
    let resized = imageops::resize(&frame.image, letterbox.new_w, letterbox.new_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let x_start = letterbox.pad_x.floor() as u32;
    let y_start = letterbox.pad_y.floor() as u32;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..SCRFD_INPUT_SIZE {
        for x in 0..SCRFD_INPUT_SIZE {
            let inside = x >= x_start
                && x < x_start + letterbox.new_w
                && y >= y_start
                && y < y_start + letterbox.new_h;
            let pixel = if inside {
                resized.get_pixel(x - x_start, y - y_start)[0] as f32
            } else {
                SCRFD_MEAN
            };

            let normalized = (pixel - SCRFD_MEAN) / SCRFD_STD;
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = normalized;
            }
        }
    }

    (tensor, letterbox)
}

/// Map output tensors to stride slots.
///
/// Exports name their heads either `score_8`, `bbox_16`, `kps_32`, ... or
/// with bare numbers; the latter follow the standard ordering
/// `[scores 8/16/32, bboxes 8/16/32, kps 8/16/32]`.
fn discover_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let by_name: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideOutputs {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match by_name {
        Some(found) => [found[0], found[1], found[2]],
        None => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            std::array::from_fn(|i| StrideOutputs {
                score: i,
                bbox: i + 3,
                kps: i + 6,
            })
        }
    }
}

/// Raw network outputs for one stride level.
struct StrideHead<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideHead<'_> {
    fn decode(&self, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let grid = SCRFD_INPUT_SIZE as usize / self.stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let step = self.stride as f32;

        let mut faces = Vec::new();
        for idx in 0..anchors {
            let score = self.scores.get(idx).copied().unwrap_or(0.0);
            if score <= threshold {
                continue;
            }

            let Some(d) = self.bboxes.get(idx * 4..idx * 4 + 4) else {
                continue;
            };

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.unmap(ax - d[0] * step, ay - d[1] * step);
            let (x2, y2) = letterbox.unmap(ax + d[2] * step, ay + d[3] * step);

            let landmarks = self.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
            });

            faces.push(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            });
        }
        faces
    }
}

/// Greedy non-maximum suppression; the result is sorted by confidence.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf, landmarks: None }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let result = nms(
            vec![
                make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
                make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
                make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        let confidences: Vec<f32> = result.iter().map(|b| b.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_keeps_disjoint_and_handles_empty() {
        let result = nms(
            vec![make_bbox(0.0, 0.0, 10.0, 10.0, 0.9), make_bbox(50.0, 50.0, 10.0, 10.0, 0.8)],
            0.4,
        );
        assert_eq!(result.len(), 2);
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(320, 240, 640);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert_eq!((lb.new_w, lb.new_h), (640, 480));
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);

        let (x, y) = lb.unmap(100.0 * 2.0, 50.0 * 2.0 + 80.0);
        assert!((x - 100.0).abs() < 1e-4 && (y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_padding_normalizes_to_zero() {
        let frame = Frame::from_gray(GrayImage::from_pixel(320, 160, Luma([255]))).unwrap();
        let (tensor, lb) = preprocess(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(lb.pad_y, 160.0);
        // top padding row
        assert_eq!(tensor[[0, 0, 0, 320]], 0.0);
        // image content
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 2, 320, 320]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_discover_outputs_named_shuffled() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let outputs = discover_outputs(&names);
        assert_eq!(outputs[0], StrideOutputs { score: 2, bbox: 0, kps: 1 });
        assert_eq!(outputs[2], StrideOutputs { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_discover_outputs_positional_fallback() {
        let names: Vec<String> = (400..409).map(|i: usize| i.to_string()).collect();
        let outputs = discover_outputs(&names);
        assert_eq!(outputs[1], StrideOutputs { score: 1, bbox: 4, kps: 7 });
    }

    #[test]
    fn test_decode_single_anchor() {
        // stride 32 grid is 20×20; anchor 2 sits in cell 1 → (32, 0)
        let anchors = 20 * 20 * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        scores[2] = 0.9;
        let mut bboxes = vec![0.0f32; anchors * 4];
        bboxes[8..12].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);
        let kps = vec![0.0f32; anchors * 10];

        let head = StrideHead { stride: 32, scores: &scores, bboxes: &bboxes, kps: &kps };
        let identity = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0, new_w: 640, new_h: 640 };
        let faces = head.decode(&identity, 0.5);

        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        assert_eq!((f.x, f.y, f.width, f.height), (16.0, 0.0, 32.0, 32.0));
        assert_eq!(f.landmarks.unwrap()[0], (32.0, 0.0));
    }
}
