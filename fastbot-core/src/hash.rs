//! Component hashing used by [`crate::widget::Widget`] and
//! [`crate::state::State`]. Every function here is a pure, deterministic
//! 64-bit hash; nothing allocates beyond what the caller already owns.

use xxhash_rust::xxh3::xxh3_64;

/// Hash a UTF-8 string component. Used for class name, resource-id,
/// text, content-desc and activity name.
pub fn hash_str(s: &str) -> u64 {
    xxh3_64(s.as_bytes())
}

/// Hash a small integer component (operate mask, scroll type tag, index).
pub fn hash_u64(v: u64) -> u64 {
    xxh3_64(&v.to_le_bytes())
}

/// Base composite hash, always present regardless of the active
/// [`crate::widget::WidgetKeyMask`].
///
/// `((h_class XOR (h_rid << 4)) >> 2) XOR (((127 * h_op) << 1) XOR ((256 * h_scroll) << 3)) >> 1`
///
/// Computed with wrapping arithmetic: the source hashes are already
/// uniformly distributed 64-bit values, so overflow here is routine, not
/// exceptional — exactly how the original C++ (plain `unsigned long`
/// arithmetic) behaves.
pub fn base_composite(h_class: u64, h_rid: u64, h_op: u64, h_scroll: u64) -> u64 {
    let a = (h_class ^ (h_rid.wrapping_shl(4))).wrapping_shr(2);
    let b = ((h_op.wrapping_mul(127).wrapping_shl(1)) ^ (h_scroll.wrapping_mul(256).wrapping_shl(3)))
        .wrapping_shr(1);
    a ^ b
}

/// State hash composition: `activity_hash * 31 << 5 XOR (combine_hash(widgets) << 1)`.
pub fn state_composite(h_activity: u64, h_widgets: u64) -> u64 {
    let a = h_activity.wrapping_mul(31).wrapping_shl(5);
    let b = h_widgets.wrapping_shl(1);
    a ^ b
}

/// Unordered combine (XOR fold) over widget hashes — order-insensitive.
pub fn combine_unordered<I: IntoIterator<Item = u64>>(hashes: I) -> u64 {
    hashes.into_iter().fold(0u64, |acc, h| acc ^ h)
}

/// Ordered combine (rotate-and-mix fold). Callers must sort the input by
/// hash first so the fold is deterministic across runs.
pub fn combine_ordered<I: IntoIterator<Item = u64>>(hashes: I) -> u64 {
    hashes.into_iter().fold(0u64, |acc, h| acc.rotate_left(1) ^ h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_unordered_is_order_insensitive() {
        let a = combine_unordered([1u64, 2, 3]);
        let b = combine_unordered([3u64, 1, 2]);
        assert_eq!(a, b);
    }

    #[test]
    fn combine_ordered_is_order_sensitive() {
        let a = combine_ordered([1u64, 2, 3]);
        let b = combine_ordered([3u64, 1, 2]);
        assert_ne!(a, b);
    }

    #[test]
    fn base_composite_is_deterministic() {
        let x = base_composite(1, 2, 3, 4);
        let y = base_composite(1, 2, 3, 4);
        assert_eq!(x, y);
    }
}
