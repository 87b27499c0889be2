//! ---
//! jtc_section: "03-telemetry-session"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Telemetry decoding and session orchestration."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
//! Deterministic text rendering of a [`TelemetryRecord`].
//!
//! The layout is fixed: a header block with every scalar field, an optional
//! sync marker, deletions, end-of-markers, then one key line and one typed
//! value line per entry. Keys that arrive before `__prefix__` without being
//! reserved (`__`) or absolute (`/`) are flagged inline with a
//! `Missing prefix for sensor: <path>` line right after the offending entry.
//! Flagging never changes what else is rendered.

use std::fmt;

use crate::record::{TelemetryRecord, TelemetryValue, PREFIX_KEY};

pub const STATS_BANNER: &str = "-------- STATS --------";
pub const SYNC_RESPONSE_MARKER: &str = "Received sync_response";
pub const MISSING_PREFIX: &str = "Missing prefix for sensor";

const RESERVED_MARKER: &str = "__";
const PATH_SEPARATOR: char = '/';

/// Per-record prefix state. Create one per record; never share across records.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixTracker {
    seen: bool,
}

impl PrefixTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next key; returns `true` when the key breaks prefix ordering.
    pub fn observe(&mut self, key: &str) -> bool {
        if key == PREFIX_KEY {
            self.seen = true;
            return false;
        }
        !self.seen && !key.starts_with(RESERVED_MARKER) && !key.starts_with(PATH_SEPARATOR)
    }
}

/// Indices of the entries that arrived before `__prefix__` and needed it.
pub fn prefix_violations(record: &TelemetryRecord) -> Vec<usize> {
    let mut tracker = PrefixTracker::new();
    record
        .kv
        .iter()
        .enumerate()
        .filter_map(|(index, kv)| tracker.observe(&kv.key).then_some(index))
        .collect()
}

impl TelemetryValue {
    /// Label used on the value line.
    pub fn label(&self) -> &'static str {
        match self {
            TelemetryValue::Double(_) => "double_value",
            TelemetryValue::Int(_) => "int_value",
            TelemetryValue::Uint(_) => "uint_value",
            TelemetryValue::Sint(_) => "sint_value",
            TelemetryValue::Bool(_) => "bool_value",
            TelemetryValue::Str(_) => "str_value",
            TelemetryValue::Bytes(_) => "bytes_value",
            TelemetryValue::Unrecognized { .. } => "default",
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.label();
        match self {
            TelemetryValue::Double(v) if v.is_nan() => write!(f, "{label}: NaN"),
            TelemetryValue::Double(v) if v.is_infinite() => {
                let sign = if v.is_sign_positive() { '+' } else { '-' };
                write!(f, "{label}: {sign}Inf")
            }
            TelemetryValue::Double(v) => write!(f, "{label}: {v:.6}"),
            TelemetryValue::Int(v) | TelemetryValue::Sint(v) => write!(f, "{label}: {v}"),
            TelemetryValue::Uint(v) => write!(f, "{label}: {v}"),
            TelemetryValue::Bool(v) => write!(f, "{label}: {v}"),
            TelemetryValue::Str(v) => write!(f, "{label}: {v}"),
            TelemetryValue::Bytes(v) => write!(f, "{label}: {}", String::from_utf8_lossy(v)),
            TelemetryValue::Unrecognized { raw } => write!(f, "{label}: {raw}"),
        }
    }
}

/// Borrowing renderer; `to_string()` yields the decoded text.
#[derive(Debug, Clone, Copy)]
pub struct RecordText<'a>(pub &'a TelemetryRecord);

impl fmt::Display for RecordText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        writeln!(f, "{STATS_BANNER}")?;
        writeln!(f, "system_id: {}", record.system_id)?;
        writeln!(f, "component_id: {}", record.component_id)?;
        writeln!(f, "sub_component_id: {}", record.sub_component_id)?;
        writeln!(f, "path: {}", record.path)?;
        writeln!(f, "sequence_number: {}", record.sequence_number)?;
        writeln!(f, "timestamp: {}", record.timestamp)?;
        writeln!(f, "sync_response: {}", record.sync_response)?;
        if record.sync_response {
            writeln!(f, "{SYNC_RESPONSE_MARKER}")?;
        }
        for deletion in &record.deletions {
            writeln!(f, "Delete: {}", deletion.path)?;
        }
        for marker in &record.end_of_markers {
            writeln!(f, "EOM: {marker}")?;
        }

        let mut tracker = PrefixTracker::new();
        for kv in &record.kv {
            writeln!(f, "  key: {}", kv.key)?;
            writeln!(f, "  {}", kv.value)?;
            if tracker.observe(&kv.key) {
                writeln!(f, "{MISSING_PREFIX}: {}", record.path)?;
            }
        }
        Ok(())
    }
}

/// Text of one record plus the number of prefix diagnostics it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    text: String,
    missing_prefix: usize,
}

impl DecodedRecord {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn missing_prefix(&self) -> usize {
        self.missing_prefix
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Decode one record. Pure: the same record always yields the same text.
pub fn decode(record: &TelemetryRecord) -> DecodedRecord {
    DecodedRecord {
        text: RecordText(record).to_string(),
        missing_prefix: prefix_violations(record).len(),
    }
}
