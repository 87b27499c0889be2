//! ---
//! jtc_section: "03-telemetry-session"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Telemetry decoding and session orchestration."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
//! Record model, decoder, and session loop for the JTC telemetry client.

pub mod decoder;
pub mod record;
pub mod session;

pub use decoder::{decode, prefix_violations, DecodedRecord, PrefixTracker};
pub use record::{Deletion, KeyValue, TelemetryRecord, TelemetryValue, PREFIX_KEY};
pub use session::{
    receive_records, RecordSource, ReceiveSummary, Session, SessionOutcome, SessionReport,
    SessionState,
};
