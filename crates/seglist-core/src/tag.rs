//! Boundary tag codec.
//!
//! A block's header and footer are each one 4-byte word packing the
//! block's total size together with its allocated flag. Alignment
//! guarantees the low 3 bits of any valid size are zero, so the size
//! occupies all but those bits and the allocated flag lives in bit 0.
//! These are pure encode/decode helpers; they assume a well-formed word
//! and perform no bounds checking of their own.

/// One boundary tag word: size plus allocated flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

impl Tag {
    /// Largest block size one tag word can represent.
    pub const MAX_SIZE: usize = SIZE_MASK as usize;

    /// Packs a block size and allocated flag into one word.
    ///
    /// `size` must be a multiple of the double-word unit (8), so its low
    /// 3 bits are zero and cannot collide with the flag bits.
    #[must_use]
    pub fn new(size: usize, allocated: bool) -> Self {
        debug_assert_eq!(size & 0x7, 0, "block size must be 8-byte aligned");
        Self(size as u32 | u32::from(allocated))
    }

    /// Total block size in bytes, header and footer included.
    #[must_use]
    pub fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    /// Whether the block is allocated.
    #[must_use]
    pub fn is_allocated(self) -> bool {
        self.0 & ALLOC_BIT != 0
    }

    /// The raw word, as stored in the arena.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Reconstructs a tag from a raw arena word.
    #[must_use]
    pub fn from_raw(word: u32) -> Self {
        Self(word)
    }
}
