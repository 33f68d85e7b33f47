//! Asynchronous texture cache: decode on a worker thread, upload on the render thread.

pub mod assets;
pub mod config;
pub mod core;

pub use assets::{
    AliasEvent, FileDecoder, RegistryOptions, TextureHandle, TextureRecord, TextureRegistry,
    TextureState,
};
pub use crate::core::gfx::{Backend, GpuHandle, SamplerDesc, TextureUploader};
