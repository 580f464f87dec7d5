//! Uploaded probe images: validation and temporary storage.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Extensions the upload form accepts.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unsupported file type '{0}': upload a jpg, jpeg or png image")]
    UnsupportedType(String),
    #[error("uploaded file is not a readable image: {0}")]
    NotAnImage(#[from] image::ImageError),
    #[error("cannot store uploaded image: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded image that passed validation.
pub struct Upload {
    pub file_name: String,
    /// Lowercased extension, one of [`ACCEPTED_EXTENSIONS`].
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Check the extension and that the bytes decode as an image.
    pub fn validate(file_name: &str, bytes: Vec<u8>) -> Result<Self, UploadError> {
        let extension = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(UploadError::UnsupportedType(extension));
        }

        image::load_from_memory(&bytes)?;

        Ok(Self {
            file_name: file_name.to_string(),
            extension,
            bytes,
        })
    }

    /// Write the image to a temporary file keeping its extension.
    ///
    /// The file is deleted when the returned handle is dropped.
    pub fn persist(&self) -> Result<NamedTempFile, UploadError> {
        let mut file = tempfile::Builder::new()
            .prefix("facematch-input-")
            .suffix(&format!(".{}", self.extension))
            .tempfile()?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        Ok(file)
    }
}

/// `data:` URI for embedding image bytes in a page.
pub fn data_uri(bytes: &[u8]) -> String {
    use base64::Engine as _;

    let mime = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 150, 100]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
