//! Size classes for the segregated free lists.
//!
//! Blocks are bucketed into twenty roughly exponential classes. The
//! class for a size is found by dividing by the base granularity (16
//! bytes, the minimum block size) and then halving until the quotient
//! reaches 1 or the last class is hit; class 19 catches everything
//! above the largest explicit threshold.

/// Number of size-class buckets.
pub const NUM_CLASSES: usize = 20;

/// Base granularity in bytes; class 0 covers sizes up to twice this.
pub const GRANULARITY: usize = 16;

/// Computes the class index for a block of `size` total bytes.
///
/// Sizes below the granularity map to class 0; each subsequent class
/// covers roughly twice the range of the previous one.
#[must_use]
pub fn class_index(size: usize) -> usize {
    let mut quotient = size / GRANULARITY;
    let mut index = 0;
    while quotient > 1 && index < NUM_CLASSES - 1 {
        quotient >>= 1;
        index += 1;
    }
    index
}
