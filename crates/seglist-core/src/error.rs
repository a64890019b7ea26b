//! Allocator error types.

use thiserror::Error;

/// The single failure mode of the allocator: the heap-growth primitive
/// could not supply the requested bytes.
///
/// Growth failure is permanent for the triggering call; the allocator's
/// state is untouched and remains consistent, so the caller may retry
/// with a smaller request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("out of memory: requested {requested} bytes, heap at {heap_bytes} of {limit} byte limit")]
    OutOfMemory {
        /// Bytes requested from the growth primitive.
        requested: usize,
        /// Arena size at the time of the failed request.
        heap_bytes: usize,
        /// Configured growth limit.
        limit: usize,
    },
}
