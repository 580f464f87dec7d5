//! facematch-core: face verification and database scan.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both running
//! via ONNX Runtime on the CPU, and scans a folder of reference images for the
//! first one showing the same person as a probe image.

pub mod alignment;
pub mod config;
pub mod detector;
pub mod frame;
pub mod recognizer;
pub mod scan;
pub mod score;
pub mod types;
pub mod verifier;

pub use config::{Config, ConfigError};
pub use scan::{scan_database, DatabaseMatch, ScanError, ScanReport, SkippedEntry};
pub use score::{FeatureBreakdown, MatchScore};
pub use types::{BoundingBox, DistanceMetric, Embedding, Verification};
pub use verifier::{FaceVerifier, Verifier, VerifyError};
