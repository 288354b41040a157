//! The [`UniformSource`] capability and its leaf implementations.
//!
//! A uniform source is anything that can bind itself to a resolved shader
//! input during a draw call. Scalars and vectors implement the trait
//! directly; images, callbacks, and the timing wrappers are thin value
//! types with their own constructors. Framebuffer-backed sources live in
//! [`crate::framebuffer`] and [`crate::doublebuffer`].

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use glow::HasContext;
use image::RgbaImage;

use crate::context::{ContextShared, DeviceCaps};
use crate::error::Error;
use crate::shader::Shader;
use crate::types::gl_size;

/// A value capable of binding itself to a numbered shader input slot.
///
/// Sources that bind textures claim the next free texture unit from the
/// drawing [`Shader`], which resets its unit counter at the start of every
/// draw call.
pub trait UniformSource {
    /// Bind this value to the given resolved input location.
    ///
    /// # Safety
    ///
    /// Requires a valid, current OpenGL context, with the drawing shader's
    /// program in use.
    ///
    /// # Errors
    ///
    /// Returns an error if the source's device resources cannot be bound
    /// (for example, no texture units remain).
    unsafe fn apply(&self, shader: &Shader, location: &glow::UniformLocation)
        -> Result<(), Error>;
}

impl UniformSource for f32 {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe { shader.gl().uniform_1_f32(Some(location), *self) };
        Ok(())
    }
}

impl UniformSource for i32 {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe { shader.gl().uniform_1_i32(Some(location), *self) };
        Ok(())
    }
}

impl UniformSource for [f32; 2] {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe { shader.gl().uniform_2_f32(Some(location), self[0], self[1]) };
        Ok(())
    }
}

impl UniformSource for [f32; 3] {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe {
            shader
                .gl()
                .uniform_3_f32(Some(location), self[0], self[1], self[2]);
        }
        Ok(())
    }
}

impl UniformSource for [f32; 4] {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe {
            shader
                .gl()
                .uniform_4_f32(Some(location), self[0], self[1], self[2], self[3]);
        }
        Ok(())
    }
}

impl UniformSource for [i32; 2] {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe { shader.gl().uniform_2_i32(Some(location), self[0], self[1]) };
        Ok(())
    }
}

impl UniformSource for [i32; 3] {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe {
            shader
                .gl()
                .uniform_3_i32(Some(location), self[0], self[1], self[2]);
        }
        Ok(())
    }
}

impl UniformSource for [i32; 4] {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        unsafe {
            shader
                .gl()
                .uniform_4_i32(Some(location), self[0], self[1], self[2], self[3]);
        }
        Ok(())
    }
}

/// Texture filtering mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Linear interpolation between texels.
    Linear,
    /// Nearest-texel sampling.
    Nearest,
}

impl Filter {
    pub(crate) fn gl_enum(self) -> u32 {
        match self {
            Filter::Linear => glow::LINEAR,
            Filter::Nearest => glow::NEAREST,
        }
    }
}

/// Texture wrapping mode for coordinates outside `[0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WrapMode {
    /// Tile the texture.
    Repeat,
    /// Clamp to the edge texel.
    ClampToEdge,
    /// Tile with every other repetition mirrored.
    MirroredRepeat,
}

impl WrapMode {
    pub(crate) fn gl_enum(self) -> u32 {
        match self {
            WrapMode::Repeat => glow::REPEAT,
            WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
            WrapMode::MirroredRepeat => glow::MIRRORED_REPEAT,
        }
    }
}

/// Declarative texture parameters.
///
/// A `None` field means "use the default": linear filtering and mirrored
/// repeat. The mirrored-repeat default is deliberate — feedback-loop
/// shaders sampling slightly outside `[0, 1]` get continuous values at the
/// edges instead of smeared edge texels.
#[derive(Copy, Clone, Debug, Default)]
pub struct TextureParams {
    /// Filtering mode, or `None` for the default.
    pub filter: Option<Filter>,
    /// Wrapping mode, or `None` for the default.
    pub wrap: Option<WrapMode>,
}

/// Resolve the effective filter for a texture bind.
///
/// The default is linear, except on float-range textures when the device
/// cannot linearly sample them, where it silently downgrades to nearest.
/// An *explicit* linear request on such a device is honored (the sampled
/// result is device-dependent) and a diagnostic is emitted.
pub(crate) fn resolve_filter(
    requested: Option<Filter>,
    float_range: bool,
    caps: DeviceCaps,
) -> Filter {
    let unsupported = float_range && !caps.float_linear;
    match requested {
        Some(Filter::Linear) if unsupported => {
            log::warn!(
                "linear filtering requested on a float-range texture without \
                 device support; the sampled result is undefined"
            );
            Filter::Linear
        }
        Some(filter) => filter,
        None if unsupported => Filter::Nearest,
        None => Filter::Linear,
    }
}

/// Resolve the effective wrap mode for a texture bind.
pub(crate) fn resolve_wrap(requested: Option<WrapMode>) -> WrapMode {
    requested.unwrap_or(WrapMode::MirroredRepeat)
}

/// Apply filter and wrap parameters to the currently bound 2D texture.
///
/// # Safety
///
/// Requires a valid, current OpenGL context with a texture bound to
/// `TEXTURE_2D` on the active unit.
pub(crate) unsafe fn apply_texture_params(gl: &glow::Context, filter: Filter, wrap: WrapMode) {
    // GL constant values are small enough that the cast is always safe.
    #[expect(clippy::cast_possible_wrap)]
    unsafe {
        gl.tex_parameter_i32(
            glow::TEXTURE_2D,
            glow::TEXTURE_MIN_FILTER,
            filter.gl_enum() as i32,
        );
        gl.tex_parameter_i32(
            glow::TEXTURE_2D,
            glow::TEXTURE_MAG_FILTER,
            filter.gl_enum() as i32,
        );
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap.gl_enum() as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap.gl_enum() as i32);
    }
}

/// How an [`ImageUniform`] configures its texture after binding.
enum ImageSetup {
    Params(TextureParams),
    /// Escape hatch: raw device access for configurations the declarative
    /// record cannot express.
    Custom(Rc<dyn Fn(&glow::Context)>),
}

/// A raw image bound as a `sampler2D` input.
///
/// Pixel data is uploaded (synchronized) on every activation, so callers
/// may mutate the underlying image between draws by rebuilding the `Arc`
/// contents. The device-side texture is cached per drawing shader, keyed
/// by the `Arc`'s pointer identity, for the lifetime of that shader — the
/// cache has no eviction, so binding many distinct images to one
/// long-lived shader grows its cache without bound.
#[derive(Clone)]
pub struct ImageUniform {
    image: Arc<RgbaImage>,
    setup: Rc<ImageSetup>,
}

impl ImageUniform {
    /// Wrap an image with default texture parameters.
    #[must_use]
    pub fn new(image: Arc<RgbaImage>) -> Self {
        Self::with_params(image, TextureParams::default())
    }

    /// Wrap an image with explicit texture parameters.
    #[must_use]
    pub fn with_params(image: Arc<RgbaImage>, params: TextureParams) -> Self {
        Self {
            image,
            setup: Rc::new(ImageSetup::Params(params)),
        }
    }

    /// Wrap an image with a raw texture-setup callback.
    ///
    /// The callback runs after the texture is bound and uploaded, in place
    /// of the declarative parameter application, with direct access to the
    /// device context.
    #[must_use]
    pub fn with_setup(image: Arc<RgbaImage>, setup: impl Fn(&glow::Context) + 'static) -> Self {
        Self {
            image,
            setup: Rc::new(ImageSetup::Custom(Rc::new(setup))),
        }
    }
}

impl UniformSource for ImageUniform {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        let unit = shader.claim_texture_unit()?;
        let texture = unsafe { shader.image_texture(&self.image) }?;
        let gl = shader.gl();
        unsafe {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                crate::types::RGBA8_INTERNAL_FORMAT,
                gl_size(self.image.width()),
                gl_size(self.image.height()),
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(self.image.as_raw())),
            );
            match &*self.setup {
                ImageSetup::Params(params) => {
                    let filter = resolve_filter(params.filter, false, shader.caps());
                    apply_texture_params(gl, filter, resolve_wrap(params.wrap));
                }
                ImageSetup::Custom(setup) => setup(gl),
            }
            gl.uniform_1_i32(Some(location), gl_size(unit));
        }
        Ok(())
    }
}

/// An arbitrary-callback uniform source.
///
/// The callback receives the device context and the resolved input
/// location, and is responsible for the entire assignment.
pub struct CallbackUniform {
    callback: Box<dyn Fn(&glow::Context, &glow::UniformLocation)>,
}

impl CallbackUniform {
    /// Wrap a callback as a uniform source.
    #[must_use]
    pub fn new(callback: impl Fn(&glow::Context, &glow::UniformLocation) + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl UniformSource for CallbackUniform {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        (self.callback)(shader.gl(), location);
        Ok(())
    }
}

/// Elapsed time since [`Context`](crate::Context) construction, in seconds.
///
/// Created by [`Context::time`](crate::Context::time).
pub struct TimeUniform {
    pub(crate) shared: Rc<ContextShared>,
}

impl UniformSource for TimeUniform {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        let elapsed = self.shared.timing().time_at(Instant::now());
        unsafe { shader.gl().uniform_1_f32(Some(location), elapsed) };
        Ok(())
    }
}

/// Elapsed time since the previous delta activation, in seconds.
///
/// Created by [`Context::delta`](crate::Context::delta). The previous
/// activation is tracked per [`Context`](crate::Context), across every
/// shader using it; the first ever activation reports a nominal frame
/// interval of 1/60 s.
pub struct DeltaUniform {
    pub(crate) shared: Rc<ContextShared>,
}

impl UniformSource for DeltaUniform {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        let delta = self.shared.timing().delta_at(Instant::now());
        unsafe { shader.gl().uniform_1_f32(Some(location), delta) };
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FULL_CAPS: DeviceCaps = DeviceCaps {
        float_targets: true,
        float_linear: true,
    };
    const NO_LINEAR_CAPS: DeviceCaps = DeviceCaps {
        float_targets: true,
        float_linear: false,
    };

    #[test]
    fn default_filter_is_linear() {
        assert_eq!(resolve_filter(None, false, FULL_CAPS), Filter::Linear);
        assert_eq!(resolve_filter(None, true, FULL_CAPS), Filter::Linear);
    }

    #[test]
    fn default_filter_downgrades_on_unsamplable_float_texture() {
        assert_eq!(resolve_filter(None, true, NO_LINEAR_CAPS), Filter::Nearest);
        // Capped-range textures are unaffected by the missing capability.
        assert_eq!(resolve_filter(None, false, NO_LINEAR_CAPS), Filter::Linear);
    }

    #[test]
    fn explicit_linear_is_honored_without_support() {
        assert_eq!(
            resolve_filter(Some(Filter::Linear), true, NO_LINEAR_CAPS),
            Filter::Linear
        );
    }

    #[test]
    fn explicit_nearest_is_always_nearest() {
        assert_eq!(
            resolve_filter(Some(Filter::Nearest), false, FULL_CAPS),
            Filter::Nearest
        );
        assert_eq!(
            resolve_filter(Some(Filter::Nearest), true, NO_LINEAR_CAPS),
            Filter::Nearest
        );
    }

    #[test]
    fn default_wrap_is_mirrored_repeat() {
        assert_eq!(resolve_wrap(None), WrapMode::MirroredRepeat);
        assert_eq!(resolve_wrap(Some(WrapMode::Repeat)), WrapMode::Repeat);
        assert_eq!(
            resolve_wrap(Some(WrapMode::ClampToEdge)),
            WrapMode::ClampToEdge
        );
    }

    #[test]
    fn gl_enums_match_modes() {
        assert_eq!(Filter::Linear.gl_enum(), glow::LINEAR);
        assert_eq!(Filter::Nearest.gl_enum(), glow::NEAREST);
        assert_eq!(WrapMode::MirroredRepeat.gl_enum(), glow::MIRRORED_REPEAT);
    }
}
