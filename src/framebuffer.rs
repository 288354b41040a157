//! Offscreen render targets backed by one or more device textures.

use std::cell::Cell;
use std::rc::Rc;

use glow::HasContext;

use crate::context::{Context, ContextShared};
use crate::error::{Error, MAX_COLOR_ATTACHMENTS};
use crate::shader::Shader;
use crate::target::RenderTarget;
use crate::types::{gl_size, RGBA32F_INTERNAL_FORMAT, RGBA8_INTERNAL_FORMAT};
use crate::uniform::{
    apply_texture_params, resolve_filter, resolve_wrap, TextureParams, UniformSource,
};

/// Construction options for a [`Framebuffer`].
#[derive(Copy, Clone, Debug)]
pub struct FramebufferOptions {
    /// Number of backing textures (color attachments). Fragment shaders
    /// may write any subset via indexed outputs.
    pub texture_count: u32,
    /// Factor applied to the surface dimensions to size the buffer.
    pub scale: f32,
    /// Request float-range storage, whose channel values are not clamped
    /// to `[0, 1]`. Falls back to capped 8-bit storage (with a warning)
    /// when the device lacks float render-target support.
    pub float_range: bool,
}

impl Default for FramebufferOptions {
    fn default() -> Self {
        Self {
            texture_count: 1,
            scale: 1.0,
            float_range: false,
        }
    }
}

/// Buffer dimensions for a surface size and scale factor.
pub(crate) fn scaled_size(surface: (u32, u32), scale: f32) -> (u32, u32) {
    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = |dim: u32| ((dim as f32 * scale).floor() as u32).max(1);
    (scaled(surface.0), scaled(surface.1))
}

pub(crate) struct FramebufferInner {
    shared: Rc<ContextShared>,
    fbo: glow::Framebuffer,
    textures: Vec<glow::Texture>,
    /// Dimensions the backing storage was last allocated at.
    size: Cell<(u32, u32)>,
    scale: f32,
    /// Effective numeric range, after the capability fallback.
    float_range: bool,
    destroyed: Cell<bool>,
}

impl FramebufferInner {
    fn texture_format(&self) -> (i32, u32) {
        if self.float_range {
            (RGBA32F_INTERNAL_FORMAT, glow::FLOAT)
        } else {
            (RGBA8_INTERNAL_FORMAT, glow::UNSIGNED_BYTE)
        }
    }

    /// Allocate storage for every backing texture at the given size and
    /// clear all attachments to transparent black.
    ///
    /// # Safety
    ///
    /// Requires a valid, current OpenGL context.
    unsafe fn allocate_storage(&self, (width, height): (u32, u32)) {
        let gl = self.shared.gl();
        let (internal_format, data_type) = self.texture_format();
        unsafe {
            for texture in &self.textures {
                gl.bind_texture(glow::TEXTURE_2D, Some(*texture));
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    internal_format,
                    gl_size(width),
                    gl_size(height),
                    0,
                    glow::RGBA,
                    data_type,
                    glow::PixelUnpackData::Slice(None),
                );
            }
            gl.bind_texture(glow::TEXTURE_2D, None);

            // Respecified storage is undefined until written; clear so a
            // freshly (re)initialized buffer reads as transparent black.
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.fbo));
            gl.clear_color(0.0, 0.0, 0.0, 0.0);
            gl.clear(glow::COLOR_BUFFER_BIT);
        }
        self.size.set((width, height));
    }

    /// Reinitialize the backing storage if the surface size (times the
    /// scale factor) has changed since the last initialization.
    ///
    /// # Safety
    ///
    /// Requires a valid, current OpenGL context.
    unsafe fn reconcile_size(&self) {
        let current = scaled_size(self.shared.surface_size(), self.scale);
        if current != self.size.get() {
            log::debug!(
                "framebuffer storage {}x{} -> {}x{}",
                self.size.get().0,
                self.size.get().1,
                current.0,
                current.1
            );
            unsafe { self.allocate_storage(current) };
        }
    }
}

/// An offscreen render target owning one or more backing textures.
///
/// The buffer tracks the surface's live size without an explicit resize
/// call: binding it after a surface-size change reinitializes the backing
/// storage at the new (scaled) size, losing the previous contents. Binding
/// with no intervening size change leaves the contents intact.
///
/// A `Framebuffer` is both a draw destination ([`RenderTarget`]) and a
/// texture input ([`UniformSource`], sampling backing texture 0; use
/// [`texture`](Self::texture) for the others).
pub struct Framebuffer {
    inner: Rc<FramebufferInner>,
}

impl Framebuffer {
    /// Create a single-texture, surface-sized, capped-range framebuffer.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns an error if device resources cannot be allocated.
    pub unsafe fn new(context: &Context) -> Result<Self, Error> {
        unsafe { Self::with_options(context, FramebufferOptions::default()) }
    }

    /// Create a framebuffer with explicit options.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlotIndex`] if `texture_count` exceeds the
    /// device's color-attachment range, or a device error if resources
    /// cannot be allocated.
    pub unsafe fn with_options(
        context: &Context,
        options: FramebufferOptions,
    ) -> Result<Self, Error> {
        unsafe { Self::from_shared(context.shared(), options) }
    }

    pub(crate) unsafe fn from_shared(
        shared: Rc<ContextShared>,
        options: FramebufferOptions,
    ) -> Result<Self, Error> {
        let texture_count = options.texture_count.max(1);
        if texture_count > MAX_COLOR_ATTACHMENTS {
            return Err(Error::InvalidSlotIndex {
                kind: "color attachment",
                index: texture_count - 1,
                limit: MAX_COLOR_ATTACHMENTS,
            });
        }

        let float_range = if options.float_range && !shared.caps().float_targets {
            log::warn!(
                "float-range framebuffer requested but the device cannot \
                 render to float textures; falling back to capped range"
            );
            false
        } else {
            options.float_range
        };

        let gl = shared.gl();
        let fbo =
            unsafe { gl.create_framebuffer() }.map_err(|e| Error::device("create framebuffer", e))?;
        let mut textures = Vec::with_capacity(texture_count as usize);
        for _ in 0..texture_count {
            let texture =
                unsafe { gl.create_texture() }.map_err(|e| Error::device("create texture", e))?;
            textures.push(texture);
        }

        let inner = Rc::new(FramebufferInner {
            shared,
            fbo,
            textures,
            size: Cell::new((0, 0)),
            scale: options.scale,
            float_range,
            destroyed: Cell::new(false),
        });

        // Attach texture i to output slot i and declare the full set of
        // active output slots so fragment stages may write any subset.
        unsafe {
            let gl = inner.shared.gl();
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(inner.fbo));
            let mut draw_buffers = Vec::with_capacity(texture_count as usize);
            for i in 0..texture_count {
                let slot = glow::COLOR_ATTACHMENT0 + i;
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    slot,
                    glow::TEXTURE_2D,
                    Some(inner.textures[i as usize]),
                    0,
                );
                draw_buffers.push(slot);
            }
            gl.draw_buffers(&draw_buffers);

            let size = scaled_size(inner.shared.surface_size(), inner.scale);
            inner.allocate_storage(size);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }

        Ok(Self { inner })
    }

    /// Number of backing textures.
    ///
    /// # Panics
    ///
    /// Panics if the attachment count exceeds `u32::MAX`, which is
    /// unreachable — construction caps it at the device attachment
    /// limit.
    #[must_use]
    pub fn texture_count(&self) -> u32 {
        u32::try_from(self.inner.textures.len()).expect("attachment count exceeds u32::MAX")
    }

    /// Whether the backing storage uses float (unclamped) numeric range,
    /// after any capability fallback.
    #[must_use]
    pub fn float_range(&self) -> bool {
        self.inner.float_range
    }

    /// A live view of backing texture `index` as a uniform source.
    ///
    /// The view binds whatever storage the framebuffer holds at draw
    /// time, with the buffer's numeric-range-aware default texture
    /// parameters; it does not copy the backing texture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlotIndex`] if `index` is not a backing
    /// texture of this framebuffer.
    pub fn texture(&self, index: u32) -> Result<TextureRef, Error> {
        if index as usize >= self.inner.textures.len() {
            return Err(Error::InvalidSlotIndex {
                kind: "color attachment",
                index,
                limit: self.texture_count(),
            });
        }
        Ok(TextureRef {
            inner: Rc::clone(&self.inner),
            index: index as usize,
            params: TextureParams::default(),
        })
    }

    /// Draw backing texture 0 to the visible surface.
    ///
    /// Convenience over the context's internal blit shader; equivalent to
    /// drawing a textured quad manually.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns an error if the blit draw fails.
    pub unsafe fn flush(&self, context: &Context) -> Result<(), Error> {
        unsafe { self.flush_texture(context, 0) }
    }

    /// Draw backing texture `index` to the visible surface.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlotIndex`] for an unknown index, or an
    /// error if the blit draw fails.
    pub unsafe fn flush_texture(&self, context: &Context, index: u32) -> Result<(), Error> {
        let texture = self.texture(index)?;
        unsafe { context.blit(&texture) }
    }

    /// Delete the framebuffer object and every backing texture.
    ///
    /// # Safety
    ///
    /// Must be called with the same GL context that created the buffer,
    /// and the buffer (and any [`TextureRef`] taken from it) must not be
    /// used afterwards.
    pub unsafe fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        let gl = self.inner.shared.gl();
        unsafe {
            gl.delete_framebuffer(self.inner.fbo);
            for texture in &self.inner.textures {
                gl.delete_texture(*texture);
            }
        }
    }
}

impl RenderTarget for Framebuffer {
    fn width(&self) -> u32 {
        scaled_size(self.inner.shared.surface_size(), self.inner.scale).0
    }

    fn height(&self) -> u32 {
        scaled_size(self.inner.shared.surface_size(), self.inner.scale).1
    }

    unsafe fn bind(&self) -> Result<(), Error> {
        unsafe {
            self.inner.reconcile_size();
            self.inner
                .shared
                .gl()
                .bind_framebuffer(glow::FRAMEBUFFER, Some(self.inner.fbo));
        }
        Ok(())
    }
}

impl UniformSource for Framebuffer {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        let texture = self.texture(0)?;
        unsafe { texture.apply(shader, location) }
    }
}

/// A live view of one backing texture of a [`Framebuffer`], bindable as a
/// `sampler2D` input.
#[derive(Clone)]
pub struct TextureRef {
    inner: Rc<FramebufferInner>,
    index: usize,
    params: TextureParams,
}

impl TextureRef {
    /// Replace the default texture parameters for this view.
    #[must_use]
    pub fn with_params(mut self, params: TextureParams) -> Self {
        self.params = params;
        self
    }
}

impl UniformSource for TextureRef {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        let unit = shader.claim_texture_unit()?;
        let gl = shader.gl();
        unsafe {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.inner.textures[self.index]));
            let filter = resolve_filter(self.params.filter, self.inner.float_range, shader.caps());
            apply_texture_params(gl, filter, resolve_wrap(self.params.wrap));
            gl.uniform_1_i32(Some(location), gl_size(unit));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scaled_size_full_scale_is_identity() {
        assert_eq!(scaled_size((800, 600), 1.0), (800, 600));
    }

    #[test]
    fn scaled_size_floors_fractional_results() {
        assert_eq!(scaled_size((801, 601), 0.5), (400, 300));
        assert_eq!(scaled_size((10, 10), 0.33), (3, 3));
    }

    #[test]
    fn scaled_size_never_reaches_zero() {
        assert_eq!(scaled_size((10, 10), 0.01), (1, 1));
        assert_eq!(scaled_size((0, 0), 1.0), (1, 1));
    }

    #[test]
    fn scaled_size_supersampling() {
        assert_eq!(scaled_size((100, 50), 2.0), (200, 100));
    }

    #[test]
    fn default_options() {
        let options = FramebufferOptions::default();
        assert_eq!(options.texture_count, 1);
        assert!((options.scale - 1.0).abs() < f32::EPSILON);
        assert!(!options.float_range);
    }
}
