//! Allocator facade: heap layout, coalescing, placement.
//!
//! `SegList` owns the arena and the segregated free lists and is the
//! sole mutator of block metadata. The heap begins with one pad word
//! and an allocated, zero-payload prologue block, and ends with a
//! zero-size allocated epilogue tag marking the current arena bound;
//! both sentinels exist so the coalescer can read boundary tags on
//! either side of any real block without edge cases.
//!
//! Addresses returned to callers are payload offsets. Offset 0 is the
//! null offset: the pad word lives there, so no payload can.

use crate::arena::Arena;
use crate::error::AllocError;
use crate::free_list::FreeLists;
use crate::tag::Tag;

/// Word size in bytes (one tag or link field).
pub const WSIZE: usize = 4;

/// Double-word alignment unit in bytes.
pub const DSIZE: usize = 8;

/// Default heap-extension amount in bytes.
pub const CHUNK_SIZE: usize = 4096;

/// Smallest legal block: header, footer, and two link words.
pub const MIN_BLOCK_SIZE: usize = 16;

// Payload offset of the first real block, just past the pad word and
// the prologue header/footer pair.
const FIRST_BLOCK: usize = 4 * WSIZE;

/// Construction-time knobs for a heap instance.
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    /// Bytes added per default extension (and the initial seed size).
    pub chunk_size: usize,
    /// Hard cap on total arena bytes; growth past it fails. Values
    /// above [`crate::arena::MAX_ARENA_BYTES`] are clamped, since every
    /// heap offset must fit in a 4-byte word.
    pub heap_limit: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            heap_limit: usize::MAX,
        }
    }
}

/// A segregated-free-list heap.
///
/// One value is one independent heap; all state lives here, so separate
/// instances never interfere and unit tests get a fresh heap per case.
/// Single-threaded by construction; see [`crate::sync::SharedSegList`]
/// for the externally synchronized variant.
#[derive(Debug)]
pub struct SegList {
    pub(crate) arena: Arena,
    pub(crate) free_lists: FreeLists,
    config: HeapConfig,
}

impl SegList {
    /// Creates and initializes a heap with default configuration.
    pub fn new() -> Result<Self, AllocError> {
        Self::with_config(HeapConfig::default())
    }

    /// Creates and initializes a heap.
    ///
    /// Lays down the pad word, prologue, and epilogue sentinels, then
    /// seeds usable space with one default-size extension. Fails if the
    /// configured limit cannot cover the initial layout.
    pub fn with_config(config: HeapConfig) -> Result<Self, AllocError> {
        // A chunk below the minimum block size could not hold even one
        // block between the sentinels, and a chunk above the tag
        // capacity could never be written into a header word.
        let config = HeapConfig {
            chunk_size: config.chunk_size.clamp(MIN_BLOCK_SIZE, Tag::MAX_SIZE),
            ..config
        };
        let mut heap = Self {
            arena: Arena::new(config.heap_limit),
            free_lists: FreeLists::new(),
            config,
        };

        let base = heap.arena.grow(4 * WSIZE)?;
        heap.arena.write_word(base, 0);
        heap.arena.write_tag(base + WSIZE, Tag::new(DSIZE, true));
        heap.arena.write_tag(base + 2 * WSIZE, Tag::new(DSIZE, true));
        heap.arena.write_tag(base + 3 * WSIZE, Tag::new(0, true));

        heap.extend(config.chunk_size / WSIZE)?;
        Ok(heap)
    }

    /// Allocates `size` usable bytes, returning the payload offset.
    ///
    /// Returns `None` for a zero-size request or when the heap cannot
    /// grow far enough to satisfy it; a failed allocation leaves the
    /// heap unchanged.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        if size == 0 || size > Tag::MAX_SIZE {
            return None;
        }
        let asize = adjust_size(size);
        if asize > Tag::MAX_SIZE {
            // Unrepresentable in a tag word; no heap could serve it.
            return None;
        }

        if let Some(bp) = self.free_lists.find(&self.arena, asize) {
            self.place(bp, asize);
            return Some(bp);
        }

        let extend_bytes = asize.max(self.config.chunk_size);
        let bp = self.extend(extend_bytes / WSIZE).ok()?;
        self.place(bp, asize);
        Some(bp)
    }

    /// Releases the block at payload offset `bp`.
    ///
    /// The null offset (0) is a no-op. Clears the allocated flag in
    /// header and footer, then coalesces with any free neighbors.
    pub fn release(&mut self, bp: usize) {
        if bp == 0 {
            return;
        }

        let size = self.block_size(bp);
        self.arena.write_tag(bp - WSIZE, Tag::new(size, false));
        self.arena.write_tag(bp + size - DSIZE, Tag::new(size, false));
        self.coalesce(bp);
    }

    /// Resizes the allocation at `bp` to `size` usable bytes.
    ///
    /// `bp == 0` behaves as [`allocate`](Self::allocate); `size == 0`
    /// behaves as [`release`](Self::release) and returns `None`.
    /// Otherwise a new block is always allocated, the first
    /// `min(old payload, size)` bytes are copied across, and the old
    /// block is released. No in-place grow or shrink is attempted even
    /// when the existing block already fits; that keeps the operation a
    /// single code path at the cost of a copy.
    pub fn reallocate(&mut self, bp: usize, size: usize) -> Option<usize> {
        if size == 0 {
            self.release(bp);
            return None;
        }
        if bp == 0 {
            return self.allocate(size);
        }

        let new_bp = self.allocate(size)?;
        let copy_len = self.payload_size(bp).min(size);
        self.arena.copy(bp, new_bp, copy_len);
        self.release(bp);
        Some(new_bp)
    }

    /// Usable payload bytes of the allocated block at `bp`.
    #[must_use]
    pub fn payload_size(&self, bp: usize) -> usize {
        self.block_size(bp) - DSIZE
    }

    /// Borrows the payload bytes of the block at `bp`.
    #[must_use]
    pub fn payload(&self, bp: usize) -> &[u8] {
        self.arena.slice(bp, self.payload_size(bp))
    }

    /// Mutably borrows the payload bytes of the block at `bp`.
    pub fn payload_mut(&mut self, bp: usize) -> &mut [u8] {
        let len = self.payload_size(bp);
        self.arena.slice_mut(bp, len)
    }

    /// Total arena size in bytes.
    #[must_use]
    pub fn heap_bytes(&self) -> usize {
        self.arena.len()
    }

    /// The configuration this heap was built with.
    #[must_use]
    pub fn config(&self) -> HeapConfig {
        self.config
    }

    // Grows the heap by `words` words (rounded up to keep double-word
    // alignment), tags the new region as one free block, rewrites the
    // epilogue past it, and coalesces with a free block that may have
    // ended at the old epilogue. Returns the merged block's offset.
    fn extend(&mut self, words: usize) -> Result<usize, AllocError> {
        let words = if words % 2 == 1 {
            words.saturating_add(1)
        } else {
            words
        };
        let size = words.saturating_mul(WSIZE);
        if size > Tag::MAX_SIZE {
            // The region's header word could not hold this size.
            return Err(AllocError::OutOfMemory {
                requested: size,
                heap_bytes: self.arena.len(),
                limit: self.arena.limit(),
            });
        }

        // The old epilogue tag becomes the new block's header slot.
        let bp = self.arena.grow(size)?;
        self.arena.write_tag(bp - WSIZE, Tag::new(size, false));
        self.arena.write_tag(bp + size - DSIZE, Tag::new(size, false));
        self.arena.write_tag(bp + size - WSIZE, Tag::new(0, true));

        Ok(self.coalesce(bp))
    }

    // Merges the free block at `bp` with free physical neighbors, then
    // links the result into the matching size class. Returns the merged
    // block's payload offset (the predecessor's when merging backward).
    fn coalesce(&mut self, bp: usize) -> usize {
        let prev_free = !self.arena.read_tag(bp - DSIZE).is_allocated();
        let next = self.next_block(bp);
        let next_free = !self.arena.read_tag(next - WSIZE).is_allocated();
        let size = self.block_size(bp);

        let (start, merged) = match (prev_free, next_free) {
            (false, false) => (bp, size),
            (false, true) => {
                self.free_lists.remove(&mut self.arena, next);
                (bp, size + self.block_size(next))
            }
            (true, false) => {
                let prev = self.prev_block(bp);
                self.free_lists.remove(&mut self.arena, prev);
                (prev, size + self.block_size(prev))
            }
            (true, true) => {
                let prev = self.prev_block(bp);
                self.free_lists.remove(&mut self.arena, prev);
                self.free_lists.remove(&mut self.arena, next);
                (prev, size + self.block_size(prev) + self.block_size(next))
            }
        };

        self.arena.write_tag(start - WSIZE, Tag::new(merged, false));
        self.arena
            .write_tag(start + merged - DSIZE, Tag::new(merged, false));
        self.free_lists.insert(&mut self.arena, start, merged);
        start
    }

    // Converts the free block at `bp` into an allocated block of
    // `asize` bytes, splitting off the tail as a new free block when it
    // can stand alone. A remainder below the minimum block size could
    // never hold its own metadata and links, so the whole block is
    // consumed instead.
    fn place(&mut self, bp: usize, asize: usize) {
        let csize = self.block_size(bp);
        let remainder = csize - asize;
        self.free_lists.remove(&mut self.arena, bp);

        if remainder >= MIN_BLOCK_SIZE {
            self.arena.write_tag(bp - WSIZE, Tag::new(asize, true));
            self.arena
                .write_tag(bp + asize - DSIZE, Tag::new(asize, true));
            let rest = bp + asize;
            self.arena.write_tag(rest - WSIZE, Tag::new(remainder, false));
            self.arena
                .write_tag(rest + remainder - DSIZE, Tag::new(remainder, false));
            self.free_lists.insert(&mut self.arena, rest, remainder);
        } else {
            self.arena.write_tag(bp - WSIZE, Tag::new(csize, true));
            self.arena
                .write_tag(bp + csize - DSIZE, Tag::new(csize, true));
        }
    }

    pub(crate) fn block_size(&self, bp: usize) -> usize {
        self.arena.read_tag(bp - WSIZE).size()
    }

    pub(crate) fn next_block(&self, bp: usize) -> usize {
        bp + self.block_size(bp)
    }

    fn prev_block(&self, bp: usize) -> usize {
        bp - self.arena.read_tag(bp - DSIZE).size()
    }

    pub(crate) fn first_block(&self) -> usize {
        FIRST_BLOCK
    }
}

// Rounds a request up to cover header/footer overhead and double-word
// alignment; never below the minimum block size.
fn adjust_size(size: usize) -> usize {
    if size <= DSIZE {
        2 * DSIZE
    } else {
        DSIZE * ((size + DSIZE + (DSIZE - 1)) / DSIZE)
    }
}
