//! Shared plain-data types: quad geometry, coordinate spaces, and the
//! per-draw texture-unit counter.

use std::cell::Cell;

use bytemuck::{Pod, Zeroable};

use crate::error::{Error, MAX_TEXTURE_UNITS};

/// GL internal format for capped RGBA8 textures, pre-cast to the `i32`
/// that `tex_image_2d` expects.
#[expect(clippy::cast_possible_wrap)]
pub(crate) const RGBA8_INTERNAL_FORMAT: i32 = glow::RGBA8 as i32;

/// GL internal format for float-range RGBA32F textures, pre-cast like
/// [`RGBA8_INTERNAL_FORMAT`].
#[expect(clippy::cast_possible_wrap)]
pub(crate) const RGBA32F_INTERNAL_FORMAT: i32 = glow::RGBA32F as i32;

/// A vertex of the fullscreen quad, ready for the GPU.
#[derive(Copy, Clone, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct Vertex {
    pub position: [f32; 2],
}

/// The one and only geometry this crate draws: a quad covering clip space
/// `[-1, 1]²`, issued as a 4-vertex triangle strip.
pub(crate) const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-1.0, -1.0],
    },
    Vertex {
        position: [1.0, -1.0],
    },
    Vertex {
        position: [-1.0, 1.0],
    },
    Vertex {
        position: [1.0, 1.0],
    },
];

/// Coordinate space of a pixel-coordinate varying synthesized into the
/// vertex stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoordSpace {
    /// Normalized coordinates in `[0, 1]²`.
    Unit,
    /// Pixel coordinates in `[0, width) × [0, height)`.
    Pixel,
}

/// Texture-unit counter, reset to 0 at the start of every draw call.
///
/// Image-backed uniform sources claim units in activation order; the
/// counter enforces the device's fixed number of texture units.
#[derive(Default)]
pub(crate) struct SlotCounter(Cell<u32>);

impl SlotCounter {
    pub fn reset(&self) {
        self.0.set(0);
    }

    /// Claim the next free texture unit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlotIndex`] once all units are taken.
    pub fn claim(&self) -> Result<u32, Error> {
        let unit = self.0.get();
        if unit >= MAX_TEXTURE_UNITS {
            return Err(Error::InvalidSlotIndex {
                kind: "texture unit",
                index: unit,
                limit: MAX_TEXTURE_UNITS,
            });
        }
        self.0.set(unit + 1);
        Ok(unit)
    }
}

/// Convert a `u32` to `i32` for GL API calls.
///
/// # Panics
///
/// Panics if `value > i32::MAX`. In practice, this is unreachable for
/// normal viewport dimensions and image sizes.
pub(crate) fn gl_size(value: u32) -> i32 {
    i32::try_from(value).expect("dimension exceeds i32::MAX")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn slot_counter_claims_in_order() {
        let counter = SlotCounter::default();
        counter.reset();
        assert_eq!(counter.claim().unwrap(), 0);
        assert_eq!(counter.claim().unwrap(), 1);
        assert_eq!(counter.claim().unwrap(), 2);
    }

    #[test]
    fn slot_counter_reset_starts_over() {
        let counter = SlotCounter::default();
        counter.claim().unwrap();
        counter.claim().unwrap();
        counter.reset();
        assert_eq!(counter.claim().unwrap(), 0);
    }

    #[test]
    fn slot_counter_rejects_unit_32() {
        let counter = SlotCounter::default();
        for expected in 0..MAX_TEXTURE_UNITS {
            assert_eq!(counter.claim().unwrap(), expected);
        }
        match counter.claim() {
            Err(Error::InvalidSlotIndex { index, limit, .. }) => {
                assert_eq!(index, MAX_TEXTURE_UNITS);
                assert_eq!(limit, MAX_TEXTURE_UNITS);
            }
            other => panic!("expected InvalidSlotIndex, got {other:?}"),
        }
    }
}
