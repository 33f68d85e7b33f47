pub mod gfx;
