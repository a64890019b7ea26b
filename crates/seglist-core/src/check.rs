//! Whole-heap invariant scan.
//!
//! Walks every block between the prologue and epilogue sentinels and
//! cross-checks the segregated free lists against what the walk found.
//! The allocator never runs this on its own hot paths; it exists for
//! tests, the trace harness, and debugging, where a structural problem
//! should be reported the moment it appears rather than as corruption
//! three operations later.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::allocator::{SegList, DSIZE, MIN_BLOCK_SIZE, WSIZE};
use crate::tag::Tag;

/// A structural defect found during a heap scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapViolation {
    #[error("prologue sentinel damaged: header {header:#x}, footer {footer:#x}")]
    BadPrologue { header: u32, footer: u32 },
    #[error("block at {bp} is not double-word aligned")]
    Misaligned { bp: usize },
    #[error("block at {bp} has illegal size {size}")]
    BadSize { bp: usize, size: usize },
    #[error("block at {bp}: header {header:#x} disagrees with footer {footer:#x}")]
    TagMismatch { bp: usize, header: u32, footer: u32 },
    #[error("adjacent free blocks at {bp} and {next}")]
    AdjacentFree { bp: usize, next: usize },
    #[error("block walk overran the arena at offset {bp}")]
    WalkOverrun { bp: usize },
    #[error("epilogue sentinel missing or damaged at offset {at}")]
    BadEpilogue { at: usize },
    #[error("free block at {bp} is not linked in any free list")]
    UnlistedFreeBlock { bp: usize },
    #[error("free list entry at {bp} does not name a free block")]
    StaleListEntry { bp: usize },
    #[error("free list entry at {bp} appears more than once")]
    DuplicateListEntry { bp: usize },
    #[error("free list entry at {bp} is filed under class {listed}, expected {expected}")]
    WrongClass {
        bp: usize,
        listed: usize,
        expected: usize,
    },
}

/// Snapshot of heap occupancy produced by a successful scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeapReport {
    /// Total arena bytes, sentinels included.
    pub heap_bytes: usize,
    /// Live (allocated) blocks between the sentinels.
    pub allocated_blocks: usize,
    /// Bytes held by allocated blocks, metadata included.
    pub allocated_bytes: usize,
    /// Free blocks between the sentinels.
    pub free_blocks: usize,
    /// Bytes held by free blocks, metadata included.
    pub free_bytes: usize,
    /// Size of the largest free block, or 0 when none exist.
    pub largest_free_block: usize,
}

impl SegList {
    /// Scans the whole heap, returning occupancy counts or the first
    /// structural violation found.
    ///
    /// Verifies, in order: the prologue sentinel, per-block alignment
    /// and size legality, header/footer agreement on every block, the
    /// no-adjacent-free invariant, the epilogue sentinel and byte
    /// accounting, and finally that the free lists name exactly the
    /// physically free blocks, each once, in the right class.
    pub fn check_heap(&self) -> Result<HeapReport, HeapViolation> {
        let prologue = Tag::new(DSIZE, true);
        let header = self.arena.read_tag(WSIZE);
        let footer = self.arena.read_tag(2 * WSIZE);
        if header != prologue || footer != prologue {
            return Err(HeapViolation::BadPrologue {
                header: header.raw(),
                footer: footer.raw(),
            });
        }

        let mut report = HeapReport {
            heap_bytes: self.arena.len(),
            allocated_blocks: 0,
            allocated_bytes: 0,
            free_blocks: 0,
            free_bytes: 0,
            largest_free_block: 0,
        };
        let mut free_blocks = BTreeSet::new();
        let mut prev_free: Option<usize> = None;

        let mut bp = self.first_block();
        loop {
            // Reading the header at bp - WSIZE needs bp <= arena end;
            // the epilogue itself sits exactly there.
            if bp > self.arena.len() {
                return Err(HeapViolation::WalkOverrun { bp });
            }
            let header = self.arena.read_tag(bp - WSIZE);
            if header.size() == 0 {
                break;
            }

            if bp % DSIZE != 0 {
                return Err(HeapViolation::Misaligned { bp });
            }
            let size = header.size();
            if size % DSIZE != 0 || size < MIN_BLOCK_SIZE || bp + size > self.arena.len() {
                return Err(HeapViolation::BadSize { bp, size });
            }
            let footer = self.arena.read_tag(bp + size - DSIZE);
            if footer != header {
                return Err(HeapViolation::TagMismatch {
                    bp,
                    header: header.raw(),
                    footer: footer.raw(),
                });
            }

            if header.is_allocated() {
                report.allocated_blocks += 1;
                report.allocated_bytes += size;
                prev_free = None;
            } else {
                if let Some(prev) = prev_free {
                    return Err(HeapViolation::AdjacentFree { bp: prev, next: bp });
                }
                report.free_blocks += 1;
                report.free_bytes += size;
                report.largest_free_block = report.largest_free_block.max(size);
                free_blocks.insert(bp);
                prev_free = Some(bp);
            }

            bp += size;
        }

        // The walk must land exactly on the epilogue word, which also
        // proves no bytes leaked between the sentinels.
        let epilogue_at = bp - WSIZE;
        if bp != self.arena.len() || !self.arena.read_tag(epilogue_at).is_allocated() {
            return Err(HeapViolation::BadEpilogue { at: epilogue_at });
        }

        let mut listed = BTreeSet::new();
        for (class, bp) in self.free_lists.collect(&self.arena) {
            if !listed.insert(bp) {
                return Err(HeapViolation::DuplicateListEntry { bp });
            }
            if !free_blocks.contains(&bp) {
                return Err(HeapViolation::StaleListEntry { bp });
            }
            let expected = crate::size_class::class_index(self.block_size(bp));
            if class != expected {
                return Err(HeapViolation::WrongClass {
                    bp,
                    listed: class,
                    expected,
                });
            }
        }
        if let Some(&bp) = free_blocks.difference(&listed).next() {
            return Err(HeapViolation::UnlistedFreeBlock { bp });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::CHUNK_SIZE;

    #[test]
    fn test_fresh_heap_passes() {
        let heap = SegList::new().unwrap();
        let report = heap.check_heap().unwrap();
        assert_eq!(report.heap_bytes, 4 * WSIZE + CHUNK_SIZE);
        assert_eq!(report.free_blocks, 1);
        assert_eq!(report.free_bytes, CHUNK_SIZE);
        assert_eq!(report.allocated_blocks, 0);
        assert_eq!(report.largest_free_block, CHUNK_SIZE);
    }

    #[test]
    fn test_scan_accounts_for_every_byte() {
        let mut heap = SegList::new().unwrap();
        let a = heap.allocate(100).unwrap();
        let _b = heap.allocate(200).unwrap();
        heap.release(a);

        let report = heap.check_heap().unwrap();
        // Pad + prologue (16) + all blocks + epilogue word.
        assert_eq!(
            4 * WSIZE + report.allocated_bytes + report.free_bytes,
            report.heap_bytes
        );
    }

    #[test]
    fn test_detects_tag_mismatch() {
        let mut heap = SegList::new().unwrap();
        let bp = heap.allocate(32).unwrap();
        let size = heap.block_size(bp);
        // Corrupt the footer the way a payload overrun would.
        heap.arena
            .write_tag(bp + size - DSIZE, Tag::new(size, false));

        match heap.check_heap() {
            Err(HeapViolation::TagMismatch { bp: at, .. }) => assert_eq!(at, bp),
            other => panic!("expected TagMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_detects_adjacent_free_blocks() {
        let mut heap = SegList::new().unwrap();
        let bp = heap.allocate(32).unwrap();
        let size = heap.block_size(bp);
        // Flip the allocated bit by hand without coalescing or listing:
        // the scan must flag the two free neighbors before it ever gets
        // to list membership.
        heap.arena.write_tag(bp - WSIZE, Tag::new(size, false));
        heap.arena
            .write_tag(bp + size - DSIZE, Tag::new(size, false));

        match heap.check_heap() {
            Err(HeapViolation::AdjacentFree { .. }) => {}
            other => panic!("expected AdjacentFree, got {other:?}"),
        }
    }

    #[test]
    fn test_detects_unlisted_free_block() {
        let mut heap = SegList::new().unwrap();
        let a = heap.allocate(32).unwrap();
        let _b = heap.allocate(32).unwrap();
        heap.release(a);
        // Unlink everything without touching the tags.
        heap.free_lists.clear();

        match heap.check_heap() {
            Err(HeapViolation::UnlistedFreeBlock { bp }) => assert_eq!(bp, a),
            other => panic!("expected UnlistedFreeBlock, got {other:?}"),
        }
    }

    #[test]
    fn test_report_after_heavy_traffic() {
        let mut heap = SegList::new().unwrap();
        let mut live = Vec::new();
        for i in 0..64 {
            if let Some(bp) = heap.allocate(16 + (i % 7) * 24) {
                live.push(bp);
            }
        }
        for bp in live.drain(..).step_by(2) {
            heap.release(bp);
        }
        let report = heap.check_heap().unwrap();
        assert!(report.allocated_blocks > 0);
        assert!(report.free_blocks > 0);
    }
}
