//! Trace loading, saving, and generation.
//!
//! A trace is a named sequence of allocator operations keyed by caller
//! ids; the runner maps ids to heap offsets as it executes. Traces are
//! plain JSON so failing workloads can be checked in as regression
//! fixtures.

use serde::{Deserialize, Serialize};

/// One allocator operation in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TraceOp {
    /// Allocate `size` bytes and bind the result to `id`.
    Alloc { id: u64, size: usize },
    /// Release the allocation bound to `id`.
    Free { id: u64 },
    /// Reallocate the allocation bound to `id` to `size` bytes.
    Realloc { id: u64, size: usize },
}

/// A replayable allocator workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Schema version.
    pub version: String,
    /// Workload name, echoed into reports and logs.
    pub name: String,
    /// Operations in execution order.
    pub ops: Vec<TraceOp>,
}

impl Trace {
    /// Parses a trace from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes the trace to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Loads a trace from a file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let trace = Self::from_json(&content)?;
        Ok(trace)
    }

    /// Generates a deterministic pseudo-random workload.
    ///
    /// The same `(seed, op_count, max_size)` triple always yields the
    /// same trace, so stress runs are reproducible without carrying an
    /// RNG dependency. Roughly half the operations allocate; the rest
    /// split between frees and reallocs of live ids, including the
    /// occasional zero-size realloc to exercise the release path.
    #[must_use]
    pub fn generate(seed: u64, op_count: usize, max_size: usize) -> Self {
        let mut rng = seed;
        let mut next_id: u64 = 1;
        let mut live: Vec<u64> = Vec::new();
        let mut ops = Vec::with_capacity(op_count);

        for _ in 0..op_count {
            let r = lcg(&mut rng);
            let roll = r % 10;
            if live.is_empty() || roll < 5 {
                let id = next_id;
                next_id += 1;
                let size = ((r >> 8) as usize % max_size) + 1;
                live.push(id);
                ops.push(TraceOp::Alloc { id, size });
            } else if roll < 8 {
                let idx = (r >> 4) as usize % live.len();
                let id = live.swap_remove(idx);
                ops.push(TraceOp::Free { id });
            } else {
                let idx = (r >> 4) as usize % live.len();
                let id = live[idx];
                // One in sixteen reallocs shrinks to zero, which frees.
                let size = if r % 16 == 0 {
                    live.swap_remove(idx);
                    0
                } else {
                    ((r >> 16) as usize % max_size) + 1
                };
                ops.push(TraceOp::Realloc { id, size });
            }
        }

        Self {
            version: "v1".to_string(),
            name: format!("generated-{seed:#018x}"),
            ops,
        }
    }
}

fn lcg(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let trace = Trace {
            version: "v1".to_string(),
            name: "smoke".to_string(),
            ops: vec![
                TraceOp::Alloc { id: 1, size: 64 },
                TraceOp::Realloc { id: 1, size: 128 },
                TraceOp::Free { id: 1 },
            ],
        };
        let json = trace.to_json().unwrap();
        let back = Trace::from_json(&json).unwrap();
        assert_eq!(back.ops, trace.ops);
        assert_eq!(back.name, "smoke");
    }

    #[test]
    fn test_op_json_shape() {
        let json = r#"{"op":"alloc","id":7,"size":32}"#;
        let op: TraceOp = serde_json::from_str(json).unwrap();
        assert_eq!(op, TraceOp::Alloc { id: 7, size: 32 });
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = Trace::generate(42, 500, 512);
        let b = Trace::generate(42, 500, 512);
        assert_eq!(a.ops, b.ops);
        assert_eq!(a.ops.len(), 500);
    }

    #[test]
    fn test_generate_only_touches_live_ids() {
        let trace = Trace::generate(7, 2000, 256);
        let mut live = std::collections::HashSet::new();
        for op in &trace.ops {
            match *op {
                TraceOp::Alloc { id, size } => {
                    assert!(size > 0);
                    assert!(live.insert(id), "id {id} allocated twice");
                }
                TraceOp::Free { id } => {
                    assert!(live.remove(&id), "freed dead id {id}");
                }
                TraceOp::Realloc { id, size } => {
                    assert!(live.contains(&id), "realloc of dead id {id}");
                    if size == 0 {
                        live.remove(&id);
                    }
                }
            }
        }
    }
}
