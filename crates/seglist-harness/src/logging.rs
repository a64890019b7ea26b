//! Structured JSONL logging for harness runs.
//!
//! One JSON object per line, one line per logged event. The schema is
//! deliberately flat so log files diff cleanly and can be filtered with
//! standard line tools.

use std::io::Write;

use serde::Serialize;

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Info,
    Warn,
    Error,
}

/// Canonical structured log entry for one harness event.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Monotonic sequence number within the run.
    pub seq: u64,
    /// Severity level.
    pub level: LogLevel,
    /// Event kind (`alloc`, `free`, `realloc`, `heap_check`, ...).
    pub event: &'static str,
    /// Index of the trace operation, if the event belongs to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_index: Option<usize>,
    /// Caller id involved in the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Heap offset involved in the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Size involved in the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Machine-readable outcome label (`ok`, `null`, `oom`, `violation`).
    pub outcome: &'static str,
    /// Free-form details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Writes JSONL log lines to any sink.
pub struct LogEmitter {
    out: Box<dyn Write>,
    seq: u64,
}

impl LogEmitter {
    /// Creates an emitter over an arbitrary writer.
    #[must_use]
    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out, seq: 0 }
    }

    /// Creates an emitter appending to a file, truncating any previous
    /// contents.
    pub fn to_file(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits one entry, assigning it the next sequence number.
    pub fn emit(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        self.seq += 1;
        entry.seq = self.seq;
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.out, "{line}")
    }
}

impl LogEntry {
    /// A blank entry for `event` at `level`; the emitter fills in `seq`.
    #[must_use]
    pub fn new(level: LogLevel, event: &'static str, outcome: &'static str) -> Self {
        Self {
            seq: 0,
            level,
            event,
            op_index: None,
            id: None,
            offset: None,
            size: None,
            outcome,
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_writes_one_json_line_per_entry() {
        let buf: Vec<u8> = Vec::new();
        let cell = std::sync::Arc::new(std::sync::Mutex::new(buf));

        struct Sink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for Sink {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut emitter = LogEmitter::new(Box::new(Sink(cell.clone())));
        let mut entry = LogEntry::new(LogLevel::Trace, "alloc", "ok");
        entry.id = Some(3);
        entry.size = Some(64);
        emitter.emit(entry).unwrap();
        emitter
            .emit(LogEntry::new(LogLevel::Info, "heap_check", "ok"))
            .unwrap();

        let out = String::from_utf8(cell.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["seq"], 1);
        assert_eq!(first["event"], "alloc");
        assert_eq!(first["id"], 3);
        // Unset optional fields are omitted entirely.
        assert!(first.get("offset").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["seq"], 2);
        assert_eq!(second["level"], "info");
    }
}
