//! Read-while-write emulation over a pair of framebuffers.

use std::cell::{Cell, RefCell};

use crate::context::Context;
use crate::error::Error;
use crate::framebuffer::{Framebuffer, FramebufferOptions};
use crate::shader::Shader;
use crate::target::RenderTarget;
use crate::uniform::UniformSource;

/// Index of the buffer read at generation `generation`.
fn read_slot(generation: u64) -> usize {
    (generation % 2) as usize
}

/// Index of the buffer written at generation `generation`.
///
/// Always the buffer *not* currently read, so a draw never samples and
/// writes the identical backing texture in one call.
fn write_slot(generation: u64) -> usize {
    ((generation + 1) % 2) as usize
}

/// Two framebuffers exposed as one read/write-capable target.
///
/// GL forbids binding the same texture as both sampling source and render
/// target in one draw. A `Doublebuffer` sidesteps this by always writing
/// to the buffer not most recently read and flipping the roles after each
/// draw, giving the illusion of an in-place iterative update:
///
/// ```no_run
/// # use fragpaint::{Context, Doublebuffer, ImageUniform, Shader};
/// # unsafe fn example(
/// #     ctx: &Context,
/// #     step: &Shader,
/// #     initial: ImageUniform,
/// # ) -> Result<(), fragpaint::Error> {
/// let state = unsafe { Doublebuffer::new(ctx) }?;
/// state.seed(initial);
/// for _ in 0..100 {
///     unsafe { step.draw(&state, &[("state", &state)]) }?;
/// }
/// unsafe { state.flush(ctx) }?;
/// # Ok(())
/// # }
/// ```
///
/// Reading before the first draw requires a prior [`seed`](Self::seed);
/// afterwards, reads always return the output of the most recent draw.
pub struct Doublebuffer {
    buffers: [Framebuffer; 2],
    /// Count of draws issued into this target. Decides which backing
    /// buffer is read vs written.
    generation: Cell<u64>,
    /// Explicit read value for generation 0.
    seed: RefCell<Option<Box<dyn UniformSource>>>,
}

impl Doublebuffer {
    /// Create a surface-sized, capped-range double buffer.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns an error if device resources cannot be allocated.
    pub unsafe fn new(context: &Context) -> Result<Self, Error> {
        unsafe { Self::with_options(context, 1.0, false) }
    }

    /// Create a double buffer with an explicit scale factor and numeric
    /// range. Both backing buffers are single-texture and share the same
    /// configuration.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns an error if device resources cannot be allocated.
    pub unsafe fn with_options(
        context: &Context,
        scale: f32,
        float_range: bool,
    ) -> Result<Self, Error> {
        let options = FramebufferOptions {
            texture_count: 1,
            scale,
            float_range,
        };
        let buffers = unsafe {
            [
                Framebuffer::from_shared(context.shared(), options)?,
                Framebuffer::from_shared(context.shared(), options)?,
            ]
        };
        Ok(Self {
            buffers,
            generation: Cell::new(0),
            seed: RefCell::new(None),
        })
    }

    /// Set the explicit read value for generation 0 and rewind the
    /// generation counter to 0.
    ///
    /// Any uniform source works as a seed: an
    /// [`ImageUniform`](crate::ImageUniform), a
    /// [`TextureRef`](crate::TextureRef), or another buffer's view.
    pub fn seed(&self, source: impl UniformSource + 'static) {
        *self.seed.borrow_mut() = Some(Box::new(source));
        self.generation.set(0);
    }

    /// Number of draws issued into this target since creation (or the
    /// last [`seed`](Self::seed)).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn advance(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    /// Draw the current read buffer to the visible surface.
    ///
    /// Does not advance the generation counter.
    ///
    /// # Safety
    ///
    /// Requires the context's GL connection to be current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnseededBufferRead`] at generation 0 without a
    /// prior seed, or an error if the blit draw fails.
    pub unsafe fn flush(&self, context: &Context) -> Result<(), Error> {
        let generation = self.generation.get();
        if generation == 0 {
            match &*self.seed.borrow() {
                Some(seed) => unsafe { context.blit(seed.as_ref()) },
                None => Err(Error::UnseededBufferRead),
            }
        } else {
            let texture = self.buffers[read_slot(generation)].texture(0)?;
            unsafe { context.blit(&texture) }
        }
    }

    /// Delete both backing framebuffers.
    ///
    /// # Safety
    ///
    /// Must be called with the same GL context that created the buffer,
    /// and the buffer must not be used afterwards.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.buffers[0].destroy();
            self.buffers[1].destroy();
        }
    }
}

impl RenderTarget for Doublebuffer {
    fn width(&self) -> u32 {
        self.buffers[0].width()
    }

    fn height(&self) -> u32 {
        self.buffers[0].height()
    }

    unsafe fn bind(&self) -> Result<(), Error> {
        unsafe { self.buffers[write_slot(self.generation.get())].bind() }
    }

    fn finish_draw(&self) {
        self.advance();
    }
}

impl UniformSource for Doublebuffer {
    unsafe fn apply(
        &self,
        shader: &Shader,
        location: &glow::UniformLocation,
    ) -> Result<(), Error> {
        let generation = self.generation.get();
        if generation == 0 {
            match &*self.seed.borrow() {
                Some(seed) => unsafe { seed.apply(shader, location) },
                None => Err(Error::UnseededBufferRead),
            }
        } else {
            let texture = self.buffers[read_slot(generation)].texture(0)?;
            unsafe { texture.apply(shader, location) }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_slots_never_coincide() {
        for generation in 0..16 {
            assert_ne!(read_slot(generation), write_slot(generation));
        }
    }

    #[test]
    fn generation_zero_writes_the_second_buffer() {
        // The seed (or nothing) is read at generation 0, so the first draw
        // lands in buffer 1 and the first post-draw read comes from it.
        assert_eq!(write_slot(0), 1);
        assert_eq!(read_slot(1), 1);
    }

    #[test]
    fn each_draw_reads_the_previous_draws_output() {
        for generation in 0..16_u64 {
            assert_eq!(read_slot(generation + 1), write_slot(generation));
        }
    }

    #[test]
    fn roles_alternate_every_generation() {
        assert_eq!(write_slot(1), 0);
        assert_eq!(write_slot(2), 1);
        assert_eq!(read_slot(2), 0);
        assert_eq!(read_slot(3), 1);
    }
}
