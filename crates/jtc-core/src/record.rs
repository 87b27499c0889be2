//! ---
//! jtc_section: "03-telemetry-session"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Telemetry decoding and session orchestration."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
use jtc_schemas::telemetry::{self as proto, key_value};

/// Reserved key establishing the path context for the keys that follow it.
pub const PREFIX_KEY: &str = "__prefix__";

/// Typed value of one key/value entry. Exactly one case per entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryValue {
    Double(f64),
    Int(i64),
    Uint(u64),
    Sint(i64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    /// No populated variant on the wire.
    Unrecognized { raw: String },
}

impl From<Option<key_value::Value>> for TelemetryValue {
    fn from(value: Option<key_value::Value>) -> Self {
        match value {
            Some(key_value::Value::DoubleValue(v)) => TelemetryValue::Double(v),
            Some(key_value::Value::IntValue(v)) => TelemetryValue::Int(v),
            Some(key_value::Value::UintValue(v)) => TelemetryValue::Uint(v),
            Some(key_value::Value::SintValue(v)) => TelemetryValue::Sint(v),
            Some(key_value::Value::BoolValue(v)) => TelemetryValue::Bool(v),
            Some(key_value::Value::StrValue(v)) => TelemetryValue::Str(v),
            Some(key_value::Value::BytesValue(v)) => TelemetryValue::Bytes(v),
            None => TelemetryValue::Unrecognized {
                raw: "<nil>".to_owned(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: TelemetryValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: TelemetryValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl From<proto::KeyValue> for KeyValue {
    fn from(kv: proto::KeyValue) -> Self {
        Self {
            key: kv.key,
            value: kv.value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub path: String,
}

/// One decoded-from-the-wire telemetry update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryRecord {
    pub system_id: String,
    pub component_id: u32,
    pub sub_component_id: u32,
    pub path: String,
    pub sequence_number: u64,
    pub timestamp: u64,
    pub sync_response: bool,
    pub deletions: Vec<Deletion>,
    /// End-of-marker paths, present when the subscription asked for them.
    pub end_of_markers: Vec<String>,
    pub kv: Vec<KeyValue>,
}

impl From<proto::OpenConfigData> for TelemetryRecord {
    fn from(data: proto::OpenConfigData) -> Self {
        Self {
            system_id: data.system_id,
            component_id: data.component_id,
            sub_component_id: data.sub_component_id,
            path: data.path,
            sequence_number: data.sequence_number,
            timestamp: data.timestamp,
            sync_response: data.sync_response,
            deletions: data
                .delete
                .into_iter()
                .map(|d| Deletion { path: d.path })
                .collect(),
            end_of_markers: data.eom.into_iter().map(|e| e.path).collect(),
            kv: data.kv.into_iter().map(KeyValue::from).collect(),
        }
    }
}
