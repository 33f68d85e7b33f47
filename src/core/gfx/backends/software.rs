use crate::core::gfx::{GpuHandle, SamplerDesc, UploadError, validate_rgba};
use image::RgbaImage;
use log::info;
use std::collections::HashMap;

pub struct Texture {
    pub image: RgbaImage,
    pub sampler: SamplerDesc,
}

pub struct State {
    pub(crate) textures: HashMap<GpuHandle, Texture>,
    next_id: u64,
    max_textures: Option<usize>,
}

pub fn init(max_textures: Option<usize>) -> State {
    match max_textures {
        Some(limit) => info!("Initializing software texture backend (limit {limit} textures)..."),
        None => info!("Initializing software texture backend..."),
    }
    State {
        textures: HashMap::new(),
        next_id: 1,
        max_textures,
    }
}

pub fn create_texture(
    state: &mut State,
    pixels: &[u8],
    width: u32,
    height: u32,
    sampler: SamplerDesc,
) -> Result<GpuHandle, UploadError> {
    validate_rgba(pixels, width, height)?;
    if let Some(limit) = state.max_textures
        && state.textures.len() >= limit
    {
        return Err(UploadError::OutOfTextures { limit });
    }
    let image = RgbaImage::from_raw(width, height, pixels.to_vec())
        .ok_or_else(|| UploadError::Backend("pixel buffer rejected by RgbaImage".to_string()))?;
    let handle = GpuHandle::new(state.next_id)
        .ok_or_else(|| UploadError::Backend("texture id space exhausted".to_string()))?;
    state.next_id += 1;
    state.textures.insert(handle, Texture { image, sampler });
    Ok(handle)
}

pub fn texture(state: &State, handle: GpuHandle) -> Option<&Texture> {
    state.textures.get(&handle)
}
