//! The process-wide façade over the device connection.

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use glow::HasContext;

use crate::error::Error;
use crate::shader::Shader;
use crate::target::ScreenTarget;
use crate::types::{gl_size, Vertex, QUAD_VERTICES};
use crate::uniform::{DeltaUniform, TimeUniform, UniformSource};

/// Nominal frame interval reported by the first ever delta activation.
const NOMINAL_FRAME_INTERVAL: f32 = 1.0 / 60.0;

/// Fragment stage of the internal blit shader, written in the legacy
/// dialect so it compiles on every supported context.
const BLIT_FRAGMENT_SRC: &str = "\
precision mediump float;
varying vec2 uv;
uniform sampler2D u_texture;
void main() {
    gl_FragColor = texture2D(u_texture, uv);
}
";

/// Optional device capabilities detected at context construction.
///
/// Shortfalls never fail construction; they downgrade behavior (capped
/// numeric range, nearest filtering) with a [`log::warn!`] diagnostic.
#[derive(Copy, Clone, Debug)]
pub struct DeviceCaps {
    /// The device can render into float-range (unclamped) textures.
    pub float_targets: bool,
    /// The device can linearly sample float-range textures.
    pub float_linear: bool,
}

/// Probe the optional capabilities for a context.
///
/// Desktop GL has both in core since 3.0; embedded (GLES/WebGL-class)
/// contexts expose them as extensions.
fn probe_caps(is_embedded: bool, extensions: &HashSet<String>) -> DeviceCaps {
    if is_embedded {
        DeviceCaps {
            float_targets: extensions.contains("EXT_color_buffer_float")
                || extensions.contains("GL_EXT_color_buffer_float"),
            float_linear: extensions.contains("OES_texture_float_linear")
                || extensions.contains("GL_OES_texture_float_linear"),
        }
    } else {
        DeviceCaps {
            float_targets: true,
            float_linear: true,
        }
    }
}

/// Context-scoped timing state backing the `time`/`delta` uniform
/// sources.
///
/// Methods take the current instant as a parameter so the logic is
/// deterministic under test; the public wrappers pass [`Instant::now`].
pub(crate) struct TimingState {
    /// Wall-clock origin, fixed at context construction.
    origin: Instant,
    /// Instant of the previous delta activation on any shader using this
    /// context.
    last_delta: Cell<Option<Instant>>,
}

impl TimingState {
    fn new(origin: Instant) -> Self {
        Self {
            origin,
            last_delta: Cell::new(None),
        }
    }

    /// Seconds elapsed since context construction.
    pub fn time_at(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.origin).as_secs_f32()
    }

    /// Seconds elapsed since the previous delta activation, or the
    /// nominal frame interval on the first ever activation.
    pub fn delta_at(&self, now: Instant) -> f32 {
        match self.last_delta.replace(Some(now)) {
            Some(previous) => now.saturating_duration_since(previous).as_secs_f32(),
            None => NOMINAL_FRAME_INTERVAL,
        }
    }
}

/// State shared between the context and everything it hands out.
pub(crate) struct ContextShared {
    gl: Arc<glow::Context>,
    caps: DeviceCaps,
    /// Tracked surface dimensions; mutated only by
    /// [`Context::resize`](Context::resize).
    surface_size: Cell<(u32, u32)>,
    timing: TimingState,
    quad_vao: glow::VertexArray,
}

impl ContextShared {
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size.get()
    }

    pub fn timing(&self) -> &TimingState {
        &self.timing
    }

    pub fn quad_vao(&self) -> glow::VertexArray {
        self.quad_vao
    }
}

/// Convert a canvas-space Y coordinate (origin top-left, Y down) to
/// device space (origin bottom-left).
fn canvas_to_device_y(surface_height: u32, y: u32) -> u32 {
    surface_height.saturating_sub(y + 1)
}

/// The entry point: owns the device connection, the visible-surface
/// target, timing state, and the internal blit shader.
///
/// At most one context should exist per drawable surface; all operations
/// run on the thread that owns the GL connection (the model is
/// single-threaded and synchronous, correctness hinging on call ordering
/// rather than locking). There is no teardown API — a context lives as
/// long as its surface.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # unsafe fn example(gl: Arc<glow::Context>) -> Result<(), fragpaint::Error> {
/// let ctx = unsafe { fragpaint::Context::new(gl, 800, 600) }?;
/// let shader = unsafe {
///     fragpaint::Shader::new(
///         &ctx,
///         "precision highp float;
///          varying vec2 uv;
///          void main() { gl_FragColor = vec4(uv, 0.0, 1.0); }",
///     )
/// }?;
/// unsafe { shader.draw(ctx.screen(), &[]) }?;
/// # Ok(())
/// # }
/// ```
pub struct Context {
    shared: Rc<ContextShared>,
    screen: ScreenTarget,
    /// Reusable shader drawing one texture over the whole surface, used
    /// by the `flush` convenience calls.
    blit: Shader,
}

impl Context {
    /// Take ownership of a device connection for a surface of the given
    /// size.
    ///
    /// The caller creates the GL context (glutin, sdl2, a canvas on
    /// wasm — anything that can feed [`glow`]) and must keep it current
    /// on this thread for all subsequent calls. The context must be
    /// OpenGL ES 3.0 class: a GLES 3 / WebGL 2 connection, or a desktop
    /// GL 3.0+ connection with ES shader compatibility.
    ///
    /// # Safety
    ///
    /// `gl` must be valid and current, and must not be driven through
    /// another connection while this context is alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceAcquisition`] if the connection does not
    /// satisfy the required API level or device resources cannot be
    /// created.
    pub unsafe fn new(gl: Arc<glow::Context>, width: u32, height: u32) -> Result<Self, Error> {
        let version = gl.version();
        if version.major < 3 {
            return Err(Error::SurfaceAcquisition(format!(
                "OpenGL {}.{} is below the required 3.0",
                version.major, version.minor
            )));
        }
        let caps = probe_caps(version.is_embedded, gl.supported_extensions());

        // Set up the shared fullscreen-quad VAO with a single vec2
        // position attribute.
        let quad_vao = unsafe {
            let vao = gl
                .create_vertex_array()
                .map_err(|e| Error::device("create vertex array", e))?;
            let vbo = gl
                .create_buffer()
                .map_err(|e| Error::device("create buffer", e))?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&QUAD_VERTICES),
                glow::STATIC_DRAW,
            );
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(
                0,
                2,
                glow::FLOAT,
                false,
                // Vertex is 8 bytes — well within i32 range.
                #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                {
                    std::mem::size_of::<Vertex>() as i32
                },
                0,
            );
            gl.bind_vertex_array(None);

            vao
        };

        let shared = Rc::new(ContextShared {
            gl,
            caps,
            surface_size: Cell::new((width.max(1), height.max(1))),
            timing: TimingState::new(Instant::now()),
            quad_vao,
        });

        let blit = unsafe { Shader::from_shared(Rc::clone(&shared), BLIT_FRAGMENT_SRC, &[]) }?;
        let screen = ScreenTarget::new(Rc::clone(&shared));

        Ok(Self {
            shared,
            screen,
            blit,
        })
    }

    /// The visible surface as a render target.
    #[must_use]
    pub fn screen(&self) -> &ScreenTarget {
        &self.screen
    }

    /// The optional capabilities detected at construction.
    #[must_use]
    pub fn caps(&self) -> DeviceCaps {
        self.shared.caps()
    }

    /// Update the tracked surface dimensions after the surface changed
    /// size.
    ///
    /// Framebuffers are not touched here — each one reinitializes itself
    /// the next time it is bound.
    pub fn resize(&self, width: u32, height: u32) {
        self.shared
            .surface_size
            .set((width.max(1), height.max(1)));
    }

    /// Elapsed seconds since context construction, as a uniform source.
    #[must_use]
    pub fn time(&self) -> TimeUniform {
        TimeUniform {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Elapsed seconds since the previous delta activation, as a uniform
    /// source.
    ///
    /// The previous activation is tracked once per context, across all
    /// shaders using it; the first ever activation reports 1/60 s.
    #[must_use]
    pub fn delta(&self) -> DeltaUniform {
        DeltaUniform {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Read one pixel from the visible surface at canvas-space
    /// coordinates (origin top-left, Y down).
    ///
    /// This forces the device to finish all pending work first — a
    /// potentially significant stall. Essential for deterministic
    /// read-back (tests, color pickers); never call it in a hot
    /// per-frame loop.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    #[must_use]
    pub unsafe fn get_color_at(&self, x: u32, y: u32) -> [u8; 4] {
        let (_, height) = self.shared.surface_size();
        let device_y = canvas_to_device_y(height, y);
        let gl = self.shared.gl();
        let mut pixel = [0_u8; 4];
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.finish();
            gl.read_pixels(
                gl_size(x),
                gl_size(device_y),
                1,
                1,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(&mut pixel)),
            );
        }
        pixel
    }

    /// Draw `source` over the whole visible surface with the internal
    /// blit shader.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    pub(crate) unsafe fn blit(&self, source: &dyn UniformSource) -> Result<(), Error> {
        unsafe { self.blit.draw(&self.screen, &[("u_texture", source)]) }
    }

    pub(crate) fn shared(&self) -> Rc<ContextShared> {
        Rc::clone(&self.shared)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn time_measures_from_origin() {
        let origin = Instant::now();
        let timing = TimingState::new(origin);
        let t = timing.time_at(origin + Duration::from_millis(2500));
        assert!((t - 2.5).abs() < 1e-4);
    }

    #[test]
    fn first_delta_is_the_nominal_frame_interval() {
        let origin = Instant::now();
        let timing = TimingState::new(origin);
        let d = timing.delta_at(origin + Duration::from_secs(5));
        assert!((d - NOMINAL_FRAME_INTERVAL).abs() < f32::EPSILON);
    }

    #[test]
    fn delta_measures_since_previous_activation() {
        let origin = Instant::now();
        let timing = TimingState::new(origin);
        let _ = timing.delta_at(origin + Duration::from_secs(1));
        let d = timing.delta_at(origin + Duration::from_millis(1016));
        assert!((d - 0.016).abs() < 1e-4);
    }

    #[test]
    fn delta_state_is_shared_across_activations() {
        let origin = Instant::now();
        let timing = TimingState::new(origin);
        // Two sources backed by the same state observe one shared
        // "previous activation", not one each.
        let _ = timing.delta_at(origin + Duration::from_secs(1));
        let _ = timing.delta_at(origin + Duration::from_secs(2));
        let d = timing.delta_at(origin + Duration::from_secs(4));
        assert!((d - 2.0).abs() < 1e-4);
    }

    #[test]
    fn canvas_y_flips_to_device_space() {
        assert_eq!(canvas_to_device_y(10, 0), 9);
        assert_eq!(canvas_to_device_y(10, 9), 0);
        assert_eq!(canvas_to_device_y(600, 0), 599);
    }

    #[test]
    fn canvas_y_saturates_out_of_bounds() {
        assert_eq!(canvas_to_device_y(10, 10), 0);
        assert_eq!(canvas_to_device_y(0, 0), 0);
    }

    #[test]
    fn embedded_caps_come_from_extensions() {
        let mut extensions = HashSet::new();
        let caps = probe_caps(true, &extensions);
        assert!(!caps.float_targets);
        assert!(!caps.float_linear);

        extensions.insert("EXT_color_buffer_float".to_owned());
        let caps = probe_caps(true, &extensions);
        assert!(caps.float_targets);
        assert!(!caps.float_linear);

        extensions.insert("GL_OES_texture_float_linear".to_owned());
        let caps = probe_caps(true, &extensions);
        assert!(caps.float_linear);
    }

    #[test]
    fn desktop_caps_are_core() {
        let caps = probe_caps(false, &HashSet::new());
        assert!(caps.float_targets);
        assert!(caps.float_linear);
    }
}
