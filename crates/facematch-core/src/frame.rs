//! Grayscale image loading.
//!
//! Every model in the pipeline consumes single-channel frames; color input is
//! reduced to luma on load and replicated back to three channels at tensor time.

use image::GrayImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("cannot read image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image is empty (0x0)")]
    Empty,
}

/// A grayscale frame decoded from an image file or upload.
#[derive(Clone)]
pub struct Frame {
    pub image: GrayImage,
}

impl Frame {
    /// Decode an image file (any format the `image` crate recognizes) to grayscale.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let decoded = image::open(path).map_err(|source| FrameError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_gray(decoded.to_luma8())
    }

    pub fn from_gray(image: GrayImage) -> Result<Self, FrameError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::Empty);
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major luma bytes (width * height).
    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let data = self.data();
        if data.is_empty() {
            return 0.0;
        }
        data.iter().map(|&b| b as f32).sum::<f32>() / data.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_open_converts_color_to_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("white.png");
        RgbImage::from_pixel(4, 3, Rgb([255, 255, 255])).save(&path).unwrap();

        let frame = Frame::open(&path).unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.data().len(), 12);
        assert!((frame.avg_brightness() - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_open_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = Frame::open(&path).err().unwrap();
        assert!(matches!(err, FrameError::Decode { .. }));
        assert!(err.to_string().contains("notes.jpg"));
    }

    #[test]
    fn test_from_gray_rejects_empty() {
        assert!(matches!(Frame::from_gray(GrayImage::new(0, 0)), Err(FrameError::Empty)));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame::from_gray(GrayImage::from_pixel(2, 2, Luma([100]))).unwrap();
        assert!((frame.avg_brightness() - 100.0).abs() < 1e-6);
    }
}
