//! Integer math utilities for deterministic path costs.
//!
//! Path costs feed the open-set ordering, so every peer in a lockstep game
//! must compute them bit-for-bit identically. Nothing here touches floating
//! point.

/// Integer square root, rounded down.
///
/// Uses binary search so the result never depends on platform float
/// behaviour.
#[must_use]
pub fn isqrt_u64(value: u64) -> u64 {
    if value < 2 {
        return value;
    }

    // sqrt(u64::MAX) < 2^32, so the answer fits in [1, 2^32).
    let mut low: u64 = 1;
    let mut high: u64 = 1 << 32;

    while high - low > 1 {
        let mid = low + (high - low) / 2;
        match mid.checked_mul(mid) {
            Some(sq) if sq <= value => low = mid,
            _ => high = mid,
        }
    }

    low
}

/// Length of the vector `(x, y)`, rounded down.
#[must_use]
pub fn i_hypot(x: i32, y: i32) -> u32 {
    let x = i64::from(x);
    let y = i64::from(y);
    isqrt_u64((x * x + y * y) as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isqrt_small_values() {
        assert_eq!(isqrt_u64(0), 0);
        assert_eq!(isqrt_u64(1), 1);
        assert_eq!(isqrt_u64(2), 1);
        assert_eq!(isqrt_u64(3), 1);
        assert_eq!(isqrt_u64(4), 2);
        assert_eq!(isqrt_u64(99), 9);
        assert_eq!(isqrt_u64(100), 10);
    }

    #[test]
    fn test_isqrt_large_values() {
        assert_eq!(isqrt_u64(u64::MAX), u64::from(u32::MAX));
        let root: u64 = 3_037_000_499;
        assert_eq!(isqrt_u64(root * root), root);
        assert_eq!(isqrt_u64(root * root - 1), root - 1);
    }

    #[test]
    fn test_hypot() {
        assert_eq!(i_hypot(3, 4), 5);
        assert_eq!(i_hypot(-3, 4), 5);
        assert_eq!(i_hypot(0, 0), 0);
        // One diagonal tile: 140 * sqrt(2) = 197.99
        assert_eq!(i_hypot(140, 140), 197);
    }
}
