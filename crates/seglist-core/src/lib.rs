//! # seglist-core
//!
//! A segregated-free-list heap allocator in safe Rust.
//!
//! The allocator manages a single contiguous, append-only byte arena.
//! Every block carries boundary tags (a header word before the payload
//! and a footer word after it), free blocks are threaded onto one of
//! twenty size-class lists via link words stored inside their payloads,
//! and physically adjacent free blocks are always coalesced.
//!
//! Addresses handed to callers are byte offsets into the arena, not raw
//! pointers; offset 0 is the null offset. No `unsafe` code is permitted
//! at the crate level.

#![deny(unsafe_code)]

pub mod arena;
pub mod check;
pub mod error;
pub mod free_list;
pub mod size_class;
pub mod sync;
pub mod tag;

mod allocator;

pub use allocator::{HeapConfig, SegList, CHUNK_SIZE, DSIZE, MIN_BLOCK_SIZE, WSIZE};
pub use check::{HeapReport, HeapViolation};
pub use error::AllocError;
pub use sync::SharedSegList;
