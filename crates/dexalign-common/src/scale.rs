//! Scale indices and checked narrowing conversions.
//!
//! A scale value is stored as its position on the attribute's ordered
//! scale. DEXi scales are tiny (a handful of values, 127 at the absolute
//! most), so `u8` is the storage type everywhere: option matrices, utility
//! table digits and evaluator stacks.

use crate::error::{Error, ErrorKind};

/// Position of a value on an attribute scale.
pub type ScaleIndex = u8;

/// Hard cap on the number of values of one scale.
pub const MAX_SCALE_SIZE: usize = 127;

/// A scale must hold at least one value and at most [`MAX_SCALE_SIZE`].
pub fn is_valid_scale_size(n: usize) -> bool {
    (1..=MAX_SCALE_SIZE).contains(&n)
}

/// Narrow an `i64` into a [`ScaleIndex`], reporting `NumericCast` when the
/// value falls outside `0..=127`.
pub fn to_scale_index(value: i64) -> Result<ScaleIndex, Error> {
    if (0..=MAX_SCALE_SIZE as i64).contains(&value) {
        Ok(value as ScaleIndex)
    } else {
        Err(Error::new(ErrorKind::NumericCast)
            .with_message(format!("{value} is not a scale index")))
    }
}

/// Narrow an `i64` into an `i32`, for department and year columns.
pub fn to_i32(value: i64) -> Result<i32, Error> {
    i32::try_from(value).map_err(|_| {
        Error::new(ErrorKind::NumericCast)
            .with_message(format!("{value} does not fit a 32-bit integer"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_size_bounds() {
        assert!(!is_valid_scale_size(0));
        assert!(is_valid_scale_size(1));
        assert!(is_valid_scale_size(127));
        assert!(!is_valid_scale_size(128));
    }

    #[test]
    fn narrowing_rejects_out_of_range() {
        assert_eq!(to_scale_index(3).unwrap(), 3);
        assert!(to_scale_index(-1).is_err());
        assert!(to_scale_index(128).is_err());
        assert!(to_i32(i64::MAX).is_err());
        assert_eq!(to_i32(-7).unwrap(), -7);
    }
}
