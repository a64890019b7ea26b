//! Trace-driven harness for the seglist allocator.
//!
//! This crate provides:
//! - Trace model: JSON traces of allocate/release/reallocate operations
//! - Trace generation: deterministic pseudo-random workloads from a seed
//! - Execution: run a trace against a fresh heap with per-operation
//!   validation (alignment, overlap, canary integrity, realloc prefix)
//! - Reporting: machine-readable run summaries and JSONL structured logs

#![forbid(unsafe_code)]

pub mod logging;
pub mod runner;
pub mod trace;

pub use runner::{RunReport, RunnerConfig, RunnerError, TraceRunner};
pub use trace::{Trace, TraceOp};
