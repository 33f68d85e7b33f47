mod backends;

pub use crate::core::gfx::backends::{opengl, software};
use std::{fmt, num::NonZeroU64};
use thiserror::Error;

// --- Public Data Contract ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Linear,
    Nearest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerWrap {
    Clamp,
    Repeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub min_filter: SamplerFilter,
    pub mag_filter: SamplerFilter,
    pub wrap: SamplerWrap,
    /// When set, the min filter also blends between mip levels
    /// (`LINEAR_MIPMAP_LINEAR` for a linear min filter).
    pub mipmaps: bool,
}

impl SamplerDesc {
    /// The configuration every registry upload is created with.
    pub const fn texture() -> Self {
        Self {
            min_filter: SamplerFilter::Linear,
            mag_filter: SamplerFilter::Linear,
            wrap: SamplerWrap::Repeat,
            mipmaps: true,
        }
    }
}

impl Default for SamplerDesc {
    #[inline(always)]
    fn default() -> Self {
        Self {
            min_filter: SamplerFilter::Linear,
            mag_filter: SamplerFilter::Linear,
            wrap: SamplerWrap::Clamp,
            mipmaps: false,
        }
    }
}

/// Opaque identifier of a texture living on the graphics backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuHandle(NonZeroU64);

impl GpuHandle {
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline(always)]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("backend texture limit reached ({limit} textures)")]
    OutOfTextures { limit: usize },
    #[error("refusing to allocate a {width}x{height} texture")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected} for RGBA8")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("backend error: {0}")]
    Backend(String),
}

/// Checks that `pixels` is a tightly packed RGBA8 image of the given size.
pub fn validate_rgba(pixels: &[u8], width: u32, height: u32) -> Result<(), UploadError> {
    if width == 0 || height == 0 {
        return Err(UploadError::ZeroDimensions { width, height });
    }
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(UploadError::SizeMismatch {
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// The graphics side of the pipeline: turns decoded RGBA8 pixels into a
/// backend texture. Only ever driven from the thread owning the context.
pub trait TextureUploader {
    fn upload(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        sampler: SamplerDesc,
    ) -> Result<GpuHandle, UploadError>;
}

// --- Public API Facade ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    OpenGL,
    Software,
}

// An internal enum to hold the state for the active rendering backend.
enum BackendImpl {
    OpenGL(opengl::State),
    Software(software::State),
}

/// A public, opaque wrapper around the active rendering backend.
/// This hides backend-specific variants from the rest of the application.
pub struct Backend(BackendImpl);

impl Backend {
    /// CPU-resident textures. `max_textures` caps how many allocations succeed.
    pub fn software(max_textures: Option<usize>) -> Self {
        Self(BackendImpl::Software(software::init(max_textures)))
    }

    /// Wraps a GL context that is current on the calling thread.
    pub fn opengl(gl: glow::Context) -> Self {
        Self(BackendImpl::OpenGL(opengl::init(gl)))
    }

    pub const fn backend_type(&self) -> BackendType {
        match &self.0 {
            BackendImpl::OpenGL(_) => BackendType::OpenGL,
            BackendImpl::Software(_) => BackendType::Software,
        }
    }

    pub fn texture_count(&self) -> usize {
        match &self.0 {
            BackendImpl::OpenGL(state) => state.textures.len(),
            BackendImpl::Software(state) => state.textures.len(),
        }
    }

    /// Dimensions of a texture the backend holds, if the handle is live.
    pub fn texture_dims(&self, handle: GpuHandle) -> Option<(u32, u32)> {
        match &self.0 {
            BackendImpl::OpenGL(state) => state.textures.get(&handle).map(|t| (t.width, t.height)),
            BackendImpl::Software(state) => {
                software::texture(state, handle).map(|t| (t.image.width(), t.image.height()))
            }
        }
    }

    pub fn dispose_textures(&mut self) {
        match &mut self.0 {
            BackendImpl::OpenGL(state) => opengl::dispose_textures(state),
            BackendImpl::Software(state) => {
                // CPU textures are freed by dropping them.
                state.textures.clear();
            }
        }
    }
}

impl TextureUploader for Backend {
    fn upload(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        sampler: SamplerDesc,
    ) -> Result<GpuHandle, UploadError> {
        match &mut self.0 {
            BackendImpl::OpenGL(state) => opengl::create_texture(state, pixels, width, height, sampler),
            BackendImpl::Software(state) => {
                software::create_texture(state, pixels, width, height, sampler)
            }
        }
    }
}

// -- Boilerplate impls --
impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenGL => write!(f, "OpenGL"),
            Self::Software => write!(f, "Software"),
        }
    }
}
