//! Growable byte arena.
//!
//! The arena is the single contiguous region backing every block. It
//! only ever grows: `grow` appends zeroed bytes and returns the offset
//! of the new region, modelling the heap-growth primitive (`sbrk`-like,
//! monotonic, no shrink, no unmap). A configurable byte limit stands in
//! for physical exhaustion so out-of-memory paths are testable.
//!
//! All addressing is by byte offset from the arena base. Word accessors
//! read and write 4-byte little-endian words; offsets passed to them
//! must lie inside the arena (internal callers guarantee this via the
//! block layout invariants).

use crate::error::AllocError;
use crate::tag::Tag;

/// Word size in bytes: one boundary tag or one free-list link.
pub const WORD: usize = 4;

/// Largest arena the 4-byte offset words can address, aligned down to
/// the double-word unit.
pub const MAX_ARENA_BYTES: usize = u32::MAX as usize & !0x7;

/// The contiguous heap region plus its growth bound.
///
/// Tags and free-list links are 4-byte words, so every offset in the
/// heap must fit in a `u32`; the growth bound is capped at
/// [`MAX_ARENA_BYTES`] no matter what limit is configured.
#[derive(Debug)]
pub struct Arena {
    bytes: Vec<u8>,
    limit: usize,
}

impl Arena {
    /// Creates an empty arena that may grow up to `limit` total bytes
    /// (capped at [`MAX_ARENA_BYTES`]).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: limit.min(MAX_ARENA_BYTES),
        }
    }

    /// Current arena size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the arena has not yet been grown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Configured growth limit in bytes.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Appends `bytes` zeroed bytes, returning the offset where the new
    /// region starts.
    ///
    /// Fails without changing the arena when the limit would be
    /// exceeded; a failed grow is permanent for that request.
    pub fn grow(&mut self, bytes: usize) -> Result<usize, AllocError> {
        let start = self.bytes.len();
        let grown = start.checked_add(bytes).filter(|&n| n <= self.limit);
        if grown.is_none() {
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                heap_bytes: start,
                limit: self.limit,
            });
        }
        self.bytes.resize(start + bytes, 0);
        Ok(start)
    }

    /// Reads the 4-byte word at `at`.
    #[must_use]
    pub fn read_word(&self, at: usize) -> u32 {
        let mut raw = [0u8; WORD];
        raw.copy_from_slice(&self.bytes[at..at + WORD]);
        u32::from_le_bytes(raw)
    }

    /// Writes the 4-byte word at `at`.
    pub fn write_word(&mut self, at: usize, word: u32) {
        self.bytes[at..at + WORD].copy_from_slice(&word.to_le_bytes());
    }

    /// Reads the boundary tag stored at `at`.
    #[must_use]
    pub fn read_tag(&self, at: usize) -> Tag {
        Tag::from_raw(self.read_word(at))
    }

    /// Writes a boundary tag at `at`.
    pub fn write_tag(&mut self, at: usize, tag: Tag) {
        self.write_word(at, tag.raw());
    }

    /// Borrows `len` payload bytes starting at `at`.
    #[must_use]
    pub fn slice(&self, at: usize, len: usize) -> &[u8] {
        &self.bytes[at..at + len]
    }

    /// Mutably borrows `len` payload bytes starting at `at`.
    pub fn slice_mut(&mut self, at: usize, len: usize) -> &mut [u8] {
        &mut self.bytes[at..at + len]
    }

    /// Copies `len` bytes from offset `src` to offset `dst`.
    ///
    /// Ranges may overlap; used by reallocate to move payload contents.
    pub fn copy(&mut self, src: usize, dst: usize, len: usize) {
        self.bytes.copy_within(src..src + len, dst);
    }
}
