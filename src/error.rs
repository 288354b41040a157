//! Error types for context, shader, and buffer operations.

/// Number of texture units a draw call may claim (units `0..32`).
pub const MAX_TEXTURE_UNITS: u32 = 32;

/// Number of color attachments a framebuffer may declare (slots `0..16`).
pub const MAX_COLOR_ATTACHMENTS: u32 = 16;

/// Errors reported by this crate.
///
/// Every variant is fatal to the call that produced it and reflects either
/// a one-time setup problem or a caller sequencing mistake; none of them
/// benefit from retrying. Capability shortfalls (missing float-texture
/// support) are *not* errors — they downgrade behavior and emit a
/// [`log::warn!`] diagnostic instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable device connection could be established on the surface, or
    /// the device became unavailable while allocating a resource.
    #[error("failed to acquire rendering surface: {0}")]
    SurfaceAcquisition(String),

    /// A shader stage failed to compile, or the program failed to link.
    ///
    /// The message carries the device compiler's diagnostic output.
    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// A [`Doublebuffer`](crate::Doublebuffer) was read at generation 0
    /// without a prior `seed` call.
    #[error("double buffer read at generation 0 without a seed")]
    UnseededBufferRead,

    /// A texture-unit or color-attachment index fell outside the
    /// device-defined range.
    #[error("{kind} index {index} out of range 0..{limit}")]
    InvalidSlotIndex {
        /// What kind of slot was indexed (`"texture unit"` or
        /// `"color attachment"`).
        kind: &'static str,
        /// The offending index.
        index: u32,
        /// The exclusive upper bound for this slot kind.
        limit: u32,
    },
}

impl Error {
    /// Wrap a device resource-allocation failure.
    pub(crate) fn device(what: &str, message: impl std::fmt::Display) -> Self {
        Error::SurfaceAcquisition(format!("{what}: {message}"))
    }
}
