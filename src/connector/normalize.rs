//! Config normalization.
//!
//! Every tunable knob left at its zero value is replaced by a backend default
//! before the config reaches a driver. Explicit non-zero values are kept.

/// Fill zero-valued fields with defaults.
///
/// Implementations must be pure and idempotent.
pub trait Normalize: Sized {
    fn normalize(self) -> Self;
}

/// Replace `field` with `default` if it holds its type's zero value.
pub fn fill<T: Default + PartialEq>(field: &mut T, default: T) {
    if *field == T::default() {
        *field = default;
    }
}
