//! The verification call: do two images show the same person?

use crate::alignment;
use crate::config::Config;
use crate::detector::{DetectorError, FaceDetector};
use crate::frame::{Frame, FrameError};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DistanceMetric, Embedding, Verification};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("no face detected in {}", .0.display())]
    NoFaceDetected(PathBuf),
}

/// Compares a probe image with a reference image.
///
/// Any `FnMut(&Path, &Path) -> Result<Verification, VerifyError>` is a verifier,
/// which lets callers plug in a stand-in for the ONNX pipeline.
pub trait Verifier {
    fn verify(&mut self, probe: &Path, reference: &Path) -> Result<Verification, VerifyError>;
}

impl<F> Verifier for F
where
    F: FnMut(&Path, &Path) -> Result<Verification, VerifyError>,
{
    fn verify(&mut self, probe: &Path, reference: &Path) -> Result<Verification, VerifyError> {
        self(probe, reference)
    }
}

/// SCRFD detection + ArcFace embedding verifier.
pub struct FaceVerifier {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    metric: DistanceMetric,
    threshold: f32,
    enforce_detection: bool,
    probe_cache: ProbeCache,
}

impl FaceVerifier {
    /// Load both models named by the config. Fails fast if either is missing.
    pub fn load(config: &Config) -> Result<Self, VerifyError> {
        let detector = FaceDetector::load(&config.detector_model_path(), config.detection_confidence)?;
        let recognizer = FaceRecognizer::load(&config.recognizer_model_path())?;

        tracing::info!(
            metric = %config.metric,
            threshold = config.effective_threshold(),
            enforce_detection = config.enforce_detection,
            "face verifier ready"
        );

        Ok(Self {
            detector,
            recognizer,
            metric: config.metric,
            threshold: config.effective_threshold(),
            enforce_detection: config.enforce_detection,
            probe_cache: ProbeCache::default(),
        })
    }

    /// Embed the most confident face in an image file.
    pub fn embed(&mut self, path: &Path) -> Result<Embedding, VerifyError> {
        embed_file(&mut self.detector, &mut self.recognizer, self.enforce_detection, path)
    }

    /// Detect faces without embedding them.
    pub fn detect(&mut self, path: &Path) -> Result<Vec<BoundingBox>, VerifyError> {
        let frame = Frame::open(path)?;
        Ok(self.detector.detect(&frame)?)
    }

    fn probe_embedding(&mut self, probe: &Path) -> Result<Embedding, VerifyError> {
        self.probe_cache.get_or_embed(probe, |path| {
            embed_file(&mut self.detector, &mut self.recognizer, self.enforce_detection, path)
        })
    }
}

fn embed_file(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    enforce_detection: bool,
    path: &Path,
) -> Result<Embedding, VerifyError> {
    let frame = Frame::open(path)?;
    let faces = detector.detect(&frame)?;
    let crop = select_crop(&frame, &faces, enforce_detection, path)?;
    Ok(recognizer.extract(&crop)?)
}

/// Pick the 112x112 crop to embed from detector output (most confident first).
///
/// Without a face, the whole image is resized when detection is not enforced.
/// A face the detector returned without landmarks cannot be aligned and counts
/// as no face.
pub fn select_crop(
    frame: &Frame,
    faces: &[BoundingBox],
    enforce_detection: bool,
    path: &Path,
) -> Result<GrayImage, VerifyError> {
    match faces.first() {
        Some(face) => {
            tracing::debug!(
                path = %path.display(),
                faces = faces.len(),
                confidence = face.confidence,
                "face detected"
            );
            match &face.landmarks {
                Some(landmarks) => Ok(alignment::align_face(frame, landmarks)),
                None => Err(VerifyError::NoFaceDetected(path.to_path_buf())),
            }
        }
        None if enforce_detection => Err(VerifyError::NoFaceDetected(path.to_path_buf())),
        None => {
            tracing::debug!(
                path = %path.display(),
                brightness = frame.avg_brightness(),
                "no face detected, embedding whole image"
            );
            Ok(alignment::resize_whole(frame))
        }
    }
}

/// Last probe embedded; a scan verifies the same probe against every entry.
#[derive(Debug, Default)]
struct ProbeCache {
    entry: Option<(PathBuf, Embedding)>,
}

impl ProbeCache {
    /// Cached embedding for `path`, or embed it and remember the result.
    /// Failures are not cached.
    fn get_or_embed(
        &mut self,
        path: &Path,
        embed: impl FnOnce(&Path) -> Result<Embedding, VerifyError>,
    ) -> Result<Embedding, VerifyError> {
        if let Some((cached, embedding)) = &self.entry {
            if cached == path {
                return Ok(embedding.clone());
            }
        }
        let embedding = embed(path)?;
        self.entry = Some((path.to_path_buf(), embedding.clone()));
        Ok(embedding)
    }
}

impl Verifier for FaceVerifier {
    fn verify(&mut self, probe: &Path, reference: &Path) -> Result<Verification, VerifyError> {
        let probe_embedding = self.probe_embedding(probe)?;
        let reference_embedding = self.embed(reference)?;

        let distance = self.metric.distance(&probe_embedding, &reference_embedding);
        let result = Verification::decide(distance, self.threshold, self.metric);

        tracing::debug!(
            reference = %reference.display(),
            distance,
            verified = result.verified,
            "verification"
        );
        Ok(result)
    }
}
