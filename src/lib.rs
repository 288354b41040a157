//! Run fragment shaders against a drawable surface without OpenGL
//! boilerplate, via [glow].
//!
//! This crate handles program linking, quad geometry, uniform binding,
//! and render-target management so a caller can go from fragment source
//! to pixels in a few lines. It is not a scene graph or a rendering
//! engine: multi-pass pipelines are composed imperatively, one
//! [`Shader::draw`] call at a time.
//!
//! # Building blocks
//!
//! - [`Context`] — owns the device connection, the visible-surface
//!   target, and timing state.
//! - [`Shader`] — one compiled program; the vertex stage is synthesized
//!   automatically, so callers write fragment code only.
//! - [`RenderTarget`] — where a draw lands: the screen
//!   ([`ScreenTarget`]), an offscreen [`Framebuffer`], or a
//!   [`Doublebuffer`] that alternates two buffers to emulate
//!   read-while-write.
//! - [`UniformSource`] — anything bindable to a shader input: plain
//!   `f32`/`i32`/vector values, images ([`ImageUniform`]), framebuffer
//!   textures ([`TextureRef`]), timing ([`Context::time`],
//!   [`Context::delta`]), or a raw callback ([`CallbackUniform`]).
//!
//! # Shader dialects
//!
//! Fragment sources whose first line declares `#version 300` use GLSL
//! ES 3.00; everything else is treated as GLSL ES 1.00. The device
//! connection must therefore be OpenGL ES 3.0 class (GLES 3, WebGL 2, or
//! desktop GL with ES shader compatibility). Unless configured otherwise
//! at creation, every shader receives a `uv` varying carrying `[0, 1]²`
//! coordinates.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fragpaint::{Context, Framebuffer, Shader};
//!
//! # unsafe fn example(gl: Arc<glow::Context>) -> Result<(), fragpaint::Error> {
//! let ctx = unsafe { Context::new(gl, 800, 600) }?;
//!
//! // Pass 1: paint a gradient into an offscreen buffer.
//! let gradient = unsafe {
//!     Shader::new(
//!         &ctx,
//!         "precision highp float;
//!          varying vec2 uv;
//!          void main() { gl_FragColor = vec4(uv, 0.0, 1.0); }",
//!     )
//! }?;
//! let buffer = unsafe { Framebuffer::new(&ctx) }?;
//! unsafe { gradient.draw(&buffer, &[]) }?;
//!
//! // Pass 2: post-process the buffer onto the screen.
//! let invert = unsafe {
//!     Shader::new(
//!         &ctx,
//!         "precision highp float;
//!          varying vec2 uv;
//!          uniform sampler2D input_texture;
//!          void main() {
//!              vec4 c = texture2D(input_texture, uv);
//!              gl_FragColor = vec4(1.0 - c.rgb, 1.0);
//!          }",
//!     )
//! }?;
//! unsafe { invert.draw(ctx.screen(), &[("input_texture", &buffer)]) }?;
//! # Ok(())
//! # }
//! ```
//!
//! # Safety
//!
//! All methods that touch the device are `unsafe` because they issue raw
//! GL calls: the caller must keep the GL connection current on the
//! calling thread. The model is single-threaded throughout — nothing in
//! this crate is `Send` or locked.
//!
//! [glow]: https://docs.rs/glow

mod context;
mod doublebuffer;
mod error;
mod framebuffer;
mod shader;
mod shaders;
mod target;
mod types;
mod uniform;

pub use context::{Context, DeviceCaps};
pub use doublebuffer::Doublebuffer;
pub use error::{Error, MAX_COLOR_ATTACHMENTS, MAX_TEXTURE_UNITS};
pub use framebuffer::{Framebuffer, FramebufferOptions, TextureRef};
pub use shader::Shader;
pub use target::{RenderTarget, ScreenTarget};
pub use types::CoordSpace;
pub use uniform::{
    CallbackUniform, DeltaUniform, Filter, ImageUniform, TextureParams, TimeUniform,
    UniformSource, WrapMode,
};
