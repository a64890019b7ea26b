//! Per-class intrusive free lists.
//!
//! Each size class keeps one doubly linked, unsorted list of free
//! blocks. The links live inside the free payloads themselves: the
//! successor offset occupies the first payload word and the predecessor
//! offset the second, overlapping what would be user data. Offset 0 is
//! the list terminator; it can never name a payload because the arena
//! begins with the alignment pad and prologue sentinel.
//!
//! Insert pushes at the head and delete splices by the block's own
//! links, so both are O(1); no list ever needs to be searched to remove
//! a block.

use crate::arena::{Arena, WORD};
use crate::size_class::{class_index, NUM_CLASSES};

const NIL: u32 = 0;

/// Head offsets for the twenty size-class lists.
#[derive(Debug)]
pub struct FreeLists {
    heads: [u32; NUM_CLASSES],
}

impl FreeLists {
    /// Creates the store with every class empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heads: [NIL; NUM_CLASSES],
        }
    }

    /// Empties every class list.
    pub fn clear(&mut self) {
        self.heads = [NIL; NUM_CLASSES];
    }

    /// Pushes the free block at payload offset `bp` onto the list for
    /// `size`, linking it ahead of the previous head.
    pub fn insert(&mut self, arena: &mut Arena, bp: usize, size: usize) {
        let class = class_index(size);
        let head = self.heads[class];

        set_succ(arena, bp, head);
        if head != NIL {
            set_pred(arena, head as usize, bp as u32);
        }
        set_pred(arena, bp, NIL);
        self.heads[class] = bp as u32;
    }

    /// Splices the free block at payload offset `bp` out of its list.
    ///
    /// The class is recomputed from the block's own header, so the
    /// caller only needs the payload offset.
    pub fn remove(&mut self, arena: &mut Arena, bp: usize) {
        let size = arena.read_tag(bp - WORD).size();
        let class = class_index(size);
        let pred = pred(arena, bp);
        let succ = succ(arena, bp);

        if pred != NIL {
            set_succ(arena, pred as usize, succ);
        } else {
            self.heads[class] = succ;
        }
        if succ != NIL {
            set_pred(arena, succ as usize, pred);
        }
    }

    /// Finds a free block whose size is at least `asize`.
    ///
    /// Scans the class computed for `asize` first-fit, then falls
    /// through to larger classes, accepting the first candidate found
    /// there. This is deliberately not a best-fit search; it bounds the
    /// scan cost at the price of occasionally looser packing.
    #[must_use]
    pub fn find(&self, arena: &Arena, asize: usize) -> Option<usize> {
        for class in class_index(asize)..NUM_CLASSES {
            let mut bp = self.heads[class];
            while bp != NIL && asize > arena.read_tag(bp as usize - WORD).size() {
                bp = succ(arena, bp as usize);
            }
            if bp != NIL {
                return Some(bp as usize);
            }
        }
        None
    }

    /// Collects every (class, payload offset) pair currently linked.
    ///
    /// Used by the heap checker to verify the free-list / free-block
    /// bijection; walking is bounded by the number of free blocks.
    #[must_use]
    pub fn collect(&self, arena: &Arena) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (class, &head) in self.heads.iter().enumerate() {
            let mut bp = head;
            while bp != NIL {
                out.push((class, bp as usize));
                bp = succ(arena, bp as usize);
            }
        }
        out
    }
}

impl Default for FreeLists {
    fn default() -> Self {
        Self::new()
    }
}

fn succ(arena: &Arena, bp: usize) -> u32 {
    arena.read_word(bp)
}

fn set_succ(arena: &mut Arena, bp: usize, to: u32) {
    arena.write_word(bp, to);
}

fn pred(arena: &Arena, bp: usize) -> u32 {
    arena.read_word(bp + WORD)
}

fn set_pred(arena: &mut Arena, bp: usize, to: u32) {
    arena.write_word(bp + WORD, to);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;

    // Lays out a fake free block of `size` bytes whose payload starts
    // at `bp`, writing only the header the store reads back.
    fn fake_block(arena: &mut Arena, bp: usize, size: usize) {
        arena.write_tag(bp - WORD, Tag::new(size, false));
    }

    fn arena_with_room() -> Arena {
        let mut arena = Arena::new(usize::MAX);
        arena.grow(4096).unwrap();
        arena
    }

    #[test]
    fn test_insert_then_find() {
        let mut arena = arena_with_room();
        let mut lists = FreeLists::new();
        fake_block(&mut arena, 16, 64);
        lists.insert(&mut arena, 16, 64);

        assert_eq!(lists.find(&arena, 48), Some(16));
        assert_eq!(lists.find(&arena, 64), Some(16));
        assert_eq!(lists.find(&arena, 72), None);
    }

    #[test]
    fn test_insert_pushes_at_head() {
        let mut arena = arena_with_room();
        let mut lists = FreeLists::new();
        fake_block(&mut arena, 16, 32);
        fake_block(&mut arena, 64, 32);
        lists.insert(&mut arena, 16, 32);
        lists.insert(&mut arena, 64, 32);

        let linked = lists.collect(&arena);
        assert_eq!(linked, vec![(1, 64), (1, 16)]);
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let mut arena = arena_with_room();
        let mut lists = FreeLists::new();
        for bp in [16, 64, 112] {
            fake_block(&mut arena, bp, 32);
            lists.insert(&mut arena, bp, 32);
        }

        // List order is 112, 64, 16; remove the middle first.
        lists.remove(&mut arena, 64);
        assert_eq!(lists.collect(&arena), vec![(1, 112), (1, 16)]);
        lists.remove(&mut arena, 112);
        assert_eq!(lists.collect(&arena), vec![(1, 16)]);
        lists.remove(&mut arena, 16);
        assert!(lists.collect(&arena).is_empty());
    }

    #[test]
    fn test_find_falls_through_to_larger_class() {
        let mut arena = arena_with_room();
        let mut lists = FreeLists::new();
        // A 256-byte block sits in class 4; a 24-byte request starts
        // its search in class 0 and must fall through.
        fake_block(&mut arena, 128, 256);
        lists.insert(&mut arena, 128, 256);

        assert_eq!(lists.find(&arena, 24), Some(128));
    }

    #[test]
    fn test_find_first_fit_within_class() {
        let mut arena = arena_with_room();
        let mut lists = FreeLists::new();
        // Both land in class 1 (32..64); head order is 112 then 16.
        fake_block(&mut arena, 16, 48);
        fake_block(&mut arena, 112, 32);
        lists.insert(&mut arena, 16, 48);
        lists.insert(&mut arena, 112, 32);

        // A 40-byte request skips the 32-byte head and takes the 48.
        assert_eq!(lists.find(&arena, 40), Some(16));
        // A 32-byte request takes the head immediately.
        assert_eq!(lists.find(&arena, 32), Some(112));
    }

    #[test]
    fn test_clear_empties_every_class() {
        let mut arena = arena_with_room();
        let mut lists = FreeLists::new();
        fake_block(&mut arena, 16, 64);
        lists.insert(&mut arena, 16, 64);
        lists.clear();
        assert!(lists.collect(&arena).is_empty());
        assert_eq!(lists.find(&arena, 16), None);
    }
}
