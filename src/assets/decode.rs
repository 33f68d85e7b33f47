use image::{ImageFormat, ImageReader};
use log::warn;
use std::path::Path;
use thiserror::Error;

/// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
#[derive(Clone)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("bytes", &self.pixels.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has zero dimensions ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("decoded buffer holds {actual} bytes, expected {expected} for RGBA8")]
    UnsupportedLayout { expected: usize, actual: usize },
}

impl DecodedImage {
    /// Rejects empty images and buffers that are not RGBA8 sized.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(DecodeError::ZeroDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(DecodeError::UnsupportedLayout {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

/// Turns an image file into RGBA8 pixels. Called from the decode thread only.
pub trait ImageDecoder: Send {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;
}

/// Decodes files from disk with the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct FileDecoder {
    /// Warn when a file's extension disagrees with its contents.
    pub warn_mismatch: bool,
}

impl FileDecoder {
    pub const fn new() -> Self {
        Self {
            warn_mismatch: true,
        }
    }
}

impl Default for FileDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn open_image_fallback(path: &Path, warn_mismatch: bool) -> Result<image::DynamicImage, DecodeError> {
    let hint = ImageFormat::from_path(path).ok();
    if let Some(fmt) = hint {
        let mut reader = ImageReader::open(path)?;
        reader.set_format(fmt);
        if let Ok(img) = reader.decode() {
            return Ok(img);
        }
    }

    let guessed = ImageReader::open(path)?.with_guessed_format()?;
    let guessed_fmt = guessed.format();
    if let (Some(hint_fmt), Some(real_fmt)) = (hint, guessed_fmt)
        && hint_fmt != real_fmt
        && warn_mismatch
    {
        warn!(
            "Graphic file '{}' is really {:?}",
            path.to_string_lossy(),
            real_fmt
        );
    }
    Ok(guessed.decode()?)
}

impl ImageDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let rgba = open_image_fallback(path, self.warn_mismatch)?.into_rgba8();
        let (width, height) = rgba.dimensions();
        let decoded = DecodedImage {
            pixels: rgba.into_raw(),
            width,
            height,
        };
        decoded.validate()?;
        Ok(decoded)
    }
}
