use crate::error::{RenderError, Result};

/// Below this capacity a buffer roughly doubles; above it, it grows by half.
pub const BUFFER_GROWTH_THRESHOLD: usize = 152;

/// Same policy for the per-shape vertex accumulator, which switches later.
pub const ACCUMULATOR_GROWTH_THRESHOLD: usize = 164;

/// Largest element count a buffer may hold.
pub const MAX_CAPACITY: usize = i32::MAX as usize;

/// Capacity to grow to from `capacity` so that at least `min` elements fit.
///
/// `(capacity + 1) * 2` below `threshold`, `(capacity / 2) * 3` from it on.
/// When that overflows or still falls short, `min` is used as is.
pub fn grow_capacity(capacity: usize, min: usize, threshold: usize) -> Result<usize> {
    if min > MAX_CAPACITY {
        return Err(RenderError::capacity("buffer growth", min, MAX_CAPACITY));
    }

    let grown = if capacity < threshold {
        capacity.checked_add(1).and_then(|c| c.checked_mul(2))
    } else {
        (capacity / 2).checked_mul(3)
    };

    Ok(match grown {
        Some(n) if n >= min && n <= MAX_CAPACITY => n,
        _ => min,
    })
}
