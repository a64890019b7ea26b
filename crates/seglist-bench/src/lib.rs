//! Benchmark-only crate; see `benches/alloc_bench.rs`.
