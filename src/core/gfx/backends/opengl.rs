use crate::core::gfx::{GpuHandle, SamplerDesc, SamplerFilter, SamplerWrap, UploadError, validate_rgba};
use glow::{HasContext, PixelUnpackData};
use log::info;
use std::collections::HashMap;

// A handle to an OpenGL texture on the GPU.
#[derive(Debug, Clone, Copy)]
pub struct Texture {
    pub raw: glow::Texture,
    pub width: u32,
    pub height: u32,
}

pub struct State {
    pub gl: glow::Context,
    pub(crate) textures: HashMap<GpuHandle, Texture>,
}

pub fn init(gl: glow::Context) -> State {
    info!("Initializing OpenGL texture backend...");
    State {
        gl,
        textures: HashMap::new(),
    }
}

const fn min_filter_enum(sampler: SamplerDesc) -> u32 {
    match (sampler.min_filter, sampler.mipmaps) {
        (SamplerFilter::Linear, true) => glow::LINEAR_MIPMAP_LINEAR,
        (SamplerFilter::Nearest, true) => glow::NEAREST_MIPMAP_NEAREST,
        (SamplerFilter::Linear, false) => glow::LINEAR,
        (SamplerFilter::Nearest, false) => glow::NEAREST,
    }
}

const fn mag_filter_enum(filter: SamplerFilter) -> u32 {
    match filter {
        SamplerFilter::Linear => glow::LINEAR,
        SamplerFilter::Nearest => glow::NEAREST,
    }
}

const fn wrap_enum(wrap: SamplerWrap) -> u32 {
    match wrap {
        SamplerWrap::Clamp => glow::CLAMP_TO_EDGE,
        SamplerWrap::Repeat => glow::REPEAT,
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
    let gl = &state.gl;
    let wrap_mode = wrap_enum(sampler.wrap);
    unsafe {
        let t = gl.create_texture().map_err(UploadError::Backend)?;
        gl.bind_texture(glow::TEXTURE_2D, Some(t));

        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, 0);
        gl.pixel_store_i32(glow::UNPACK_SKIP_ROWS, 0);
        gl.pixel_store_i32(glow::UNPACK_SKIP_PIXELS, 0);

        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap_mode as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap_mode as i32);
        gl.tex_parameter_i32(
            glow::TEXTURE_2D,
            glow::TEXTURE_MIN_FILTER,
            min_filter_enum(sampler) as i32,
        );
        gl.tex_parameter_i32(
            glow::TEXTURE_2D,
            glow::TEXTURE_MAG_FILTER,
            mag_filter_enum(sampler.mag_filter) as i32,
        );

        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA8 as i32,
            width as i32,
            height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            PixelUnpackData::Slice(Some(pixels)),
        );
        if sampler.mipmaps {
            gl.generate_mipmap(glow::TEXTURE_2D);
        } else {
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_BASE_LEVEL, 0);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAX_LEVEL, 0);
        }
        gl.bind_texture(glow::TEXTURE_2D, None);

        let err = gl.get_error();
        if err != glow::NO_ERROR {
            gl.delete_texture(t);
            return Err(UploadError::Backend(format!("GL error 0x{err:04X} during upload")));
        }

        let Some(handle) = GpuHandle::new(u64::from(t.0.get())) else {
            gl.delete_texture(t);
            return Err(UploadError::Backend("driver returned texture name 0".to_string()));
        };
        state.textures.insert(
            handle,
            Texture {
                raw: t,
                width,
                height,
            },
        );
        Ok(handle)
    }
}

pub fn dispose_textures(state: &mut State) {
    let count = state.textures.len();
    unsafe {
        for (_, tex) in state.textures.drain() {
            state.gl.delete_texture(tex.raw);
        }
    }
    info!("Released {count} OpenGL textures.");
}
