//! The [`RenderTarget`] capability and the visible-surface target.

use std::rc::Rc;

use glow::HasContext;

use crate::context::ContextShared;
use crate::error::Error;

/// Anything a draw call can render into.
///
/// Implemented by [`ScreenTarget`] (the visible surface),
/// [`Framebuffer`](crate::Framebuffer), and
/// [`Doublebuffer`](crate::Doublebuffer).
pub trait RenderTarget {
    /// Current width of the target in pixels.
    fn width(&self) -> u32;

    /// Current height of the target in pixels.
    fn height(&self) -> u32;

    /// Whether rendering into this target is vertically flipped.
    ///
    /// The visible surface is flipped (GL's origin is bottom-left, the
    /// canvas-space origin is top-left); offscreen buffers are not, so a
    /// buffer rendered and then sampled as a texture reads the right way
    /// up.
    fn flipped(&self) -> bool {
        false
    }

    /// Make this target the active draw destination.
    ///
    /// # Safety
    ///
    /// Requires a valid, current OpenGL context.
    ///
    /// # Errors
    ///
    /// Returns an error if the target's device resources cannot be
    /// (re)initialized.
    unsafe fn bind(&self) -> Result<(), Error>;

    /// Hook invoked after a draw into this target has been issued.
    ///
    /// The default implementation does nothing; [`Doublebuffer`] advances
    /// its generation counter here.
    ///
    /// [`Doublebuffer`]: crate::Doublebuffer
    fn finish_draw(&self) {}
}

/// The visible surface as a render target.
///
/// Width and height track the live surface dimensions recorded on the
/// [`Context`](crate::Context) (see [`Context::resize`]); binding restores
/// the default framebuffer.
///
/// [`Context::resize`]: crate::Context::resize
pub struct ScreenTarget {
    shared: Rc<ContextShared>,
}

impl ScreenTarget {
    pub(crate) fn new(shared: Rc<ContextShared>) -> Self {
        Self { shared }
    }
}

impl RenderTarget for ScreenTarget {
    fn width(&self) -> u32 {
        self.shared.surface_size().0
    }

    fn height(&self) -> u32 {
        self.shared.surface_size().1
    }

    fn flipped(&self) -> bool {
        true
    }

    unsafe fn bind(&self) -> Result<(), Error> {
        unsafe {
            self.shared.gl().bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        Ok(())
    }
}
