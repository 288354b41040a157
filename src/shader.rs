//! Shader program lifecycle and the draw protocol.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use glow::HasContext;
use image::RgbaImage;

use crate::context::{Context, ContextShared, DeviceCaps};
use crate::error::Error;
use crate::shaders::{
    self, detect_dialect, synthesize_vertex_source, FLIP_UNIFORM, RESOLUTION_UNIFORM,
};
use crate::target::RenderTarget;
use crate::types::{gl_size, CoordSpace, SlotCounter};
use crate::uniform::UniformSource;

/// Varying list used when the caller requests no pixel-coordinate
/// varyings of their own.
const DEFAULT_COORDS: &[(&str, CoordSpace)] = &[(shaders::DEFAULT_COORD_NAME, CoordSpace::Unit)];

/// A compiled fragment-shader program, drawable onto any
/// [`RenderTarget`].
///
/// The vertex stage is synthesized from the fragment source's dialect and
/// the requested pixel-coordinate varyings; every draw renders exactly one
/// screen-filling quad.
///
/// Two caches live on each instance:
///
/// - resolved uniform locations, keyed by input name, filled on first
///   lookup;
/// - device textures for raw-image uniform sources, keyed by image
///   identity, one entry per distinct image ever bound to this shader.
///   This cache is never evicted — a long-lived shader that binds many
///   distinct images grows it without bound.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use fragpaint::{Context, Shader};
/// # unsafe fn example(gl: Arc<glow::Context>) -> Result<(), fragpaint::Error> {
/// let ctx = unsafe { Context::new(gl, 800, 600) }?;
/// let shader = unsafe {
///     Shader::new(
///         &ctx,
///         "precision highp float;
///          varying vec2 uv;
///          uniform float brightness;
///          void main() { gl_FragColor = vec4(uv * brightness, 0.0, 1.0); }",
///     )
/// }?;
/// unsafe { shader.draw(ctx.screen(), &[("brightness", &0.8_f32)]) }?;
/// # Ok(())
/// # }
/// ```
pub struct Shader {
    shared: Rc<ContextShared>,
    program: glow::Program,
    /// Input name → resolved location, cached after first lookup. `None`
    /// entries record names the program does not declare (or that the
    /// compiler optimized away), so they are only probed once.
    locations: RefCell<HashMap<String, Option<glow::UniformLocation>>>,
    /// Raw-image identity → device texture. See the type-level docs.
    image_textures: RefCell<HashMap<usize, glow::Texture>>,
    units: SlotCounter,
    /// Whether the synthesized vertex stage declared `u_resolution`.
    wants_resolution: bool,
}

impl Shader {
    /// Compile a shader from fragment source, with the default `uv`
    /// varying carrying `[0, 1]²` coordinates.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShaderCompilation`] if either stage fails to
    /// compile or the program fails to link; no partial shader is
    /// returned.
    pub unsafe fn new(context: &Context, fragment_src: &str) -> Result<Self, Error> {
        unsafe { Self::with_coords(context, fragment_src, &[]) }
    }

    /// Compile a shader from fragment source with explicitly named
    /// pixel-coordinate varyings.
    ///
    /// An empty `coords` slice falls back to the default `uv` varying so
    /// fragment code written against the default keeps working.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShaderCompilation`] on compile or link failure.
    pub unsafe fn with_coords(
        context: &Context,
        fragment_src: &str,
        coords: &[(&str, CoordSpace)],
    ) -> Result<Self, Error> {
        unsafe { Self::from_shared(context.shared(), fragment_src, coords) }
    }

    pub(crate) unsafe fn from_shared(
        shared: Rc<ContextShared>,
        fragment_src: &str,
        coords: &[(&str, CoordSpace)],
    ) -> Result<Self, Error> {
        let coords: Vec<(String, CoordSpace)> = if coords.is_empty() {
            DEFAULT_COORDS
                .iter()
                .map(|(name, space)| ((*name).to_owned(), *space))
                .collect()
        } else {
            coords
                .iter()
                .map(|(name, space)| ((*name).to_owned(), *space))
                .collect()
        };

        let dialect = detect_dialect(fragment_src);
        let vertex_src = synthesize_vertex_source(dialect, &coords);
        let wants_resolution = coords.iter().any(|(_, space)| *space == CoordSpace::Pixel);

        let program = unsafe { shaders::compile_program(shared.gl(), &vertex_src, fragment_src) }?;

        Ok(Self {
            shared,
            program,
            locations: RefCell::new(HashMap::new()),
            image_textures: RefCell::new(HashMap::new()),
            units: SlotCounter::default(),
            wants_resolution,
        })
    }

    /// Draw one screen-filling quad into `target` with the given uniform
    /// assignments.
    ///
    /// Input names that the program does not declare are silently
    /// ignored; omitted names keep whatever value the device retained
    /// from a previous draw with this program. Sources are activated in
    /// slice order, which is also the order image-backed sources claim
    /// texture units, starting from unit 0 on every call.
    ///
    /// If `target` is a [`Doublebuffer`](crate::Doublebuffer), its
    /// generation advances once after the draw is issued, so uniform
    /// sources reading the same buffer during this call see the
    /// pre-advance state.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be bound (device resource
    /// reinitialization failed), a uniform source fails to bind, or the
    /// draw exhausts the device's texture units.
    pub unsafe fn draw(
        &self,
        target: &dyn RenderTarget,
        uniforms: &[(&str, &dyn UniformSource)],
    ) -> Result<(), Error> {
        self.units.reset();

        let (width, height) = (target.width(), target.height());
        let gl = self.shared.gl();
        unsafe {
            target.bind()?;
            gl.viewport(0, 0, gl_size(width), gl_size(height));
            gl.use_program(Some(self.program));
        }

        for (name, source) in uniforms {
            if let Some(location) = unsafe { self.location(name) } {
                unsafe { source.apply(self, &location) }?;
            }
        }

        unsafe {
            if let Some(location) = self.location(FLIP_UNIFORM) {
                let flip = if target.flipped() { 1.0 } else { 0.0 };
                gl.uniform_1_f32(Some(&location), flip);
            }
            if self.wants_resolution {
                if let Some(location) = self.location(RESOLUTION_UNIFORM) {
                    #[expect(clippy::cast_precision_loss)]
                    gl.uniform_2_f32(Some(&location), width as f32, height as f32);
                }
            }

            gl.bind_vertex_array(Some(self.shared.quad_vao()));
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            gl.bind_vertex_array(None);
        }

        target.finish_draw();
        Ok(())
    }

    /// Resolve (and cache) the location of a named shader input.
    ///
    /// # Safety
    ///
    /// Requires a valid, current OpenGL context.
    unsafe fn location(&self, name: &str) -> Option<glow::UniformLocation> {
        if let Some(cached) = self.locations.borrow().get(name) {
            return cached.clone();
        }
        let location = unsafe { self.shared.gl().get_uniform_location(self.program, name) };
        self.locations
            .borrow_mut()
            .insert(name.to_owned(), location.clone());
        location
    }

    pub(crate) fn gl(&self) -> &glow::Context {
        self.shared.gl()
    }

    pub(crate) fn caps(&self) -> DeviceCaps {
        self.shared.caps()
    }

    /// Claim the next free texture unit for this draw call.
    pub(crate) fn claim_texture_unit(&self) -> Result<u32, Error> {
        self.units.claim()
    }

    /// Look up (or create) the device texture backing a raw image bound
    /// to this shader. The caller uploads pixel data after binding it.
    ///
    /// # Safety
    ///
    /// Requires a valid, current OpenGL context.
    pub(crate) unsafe fn image_texture(&self, image: &Arc<RgbaImage>) -> Result<glow::Texture, Error> {
        let key = Arc::as_ptr(image) as usize;
        if let Some(texture) = self.image_textures.borrow().get(&key) {
            return Ok(*texture);
        }
        let texture = unsafe { self.shared.gl().create_texture() }
            .map_err(|e| Error::device("create texture", e))?;
        self.image_textures.borrow_mut().insert(key, texture);
        Ok(texture)
    }

    /// Delete the program and every cached image texture.
    ///
    /// # Safety
    ///
    /// Must be called with the same GL context that created the shader,
    /// and the shader must not be used afterwards.
    pub unsafe fn destroy(&self) {
        let gl = self.shared.gl();
        unsafe {
            gl.delete_program(self.program);
            for texture in self.image_textures.borrow().values() {
                gl.delete_texture(*texture);
            }
        }
        self.image_textures.borrow_mut().clear();
    }
}
