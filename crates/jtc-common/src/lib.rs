//! ---
//! jtc_section: "01-core-functionality"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Shared primitives consumed by the session engine and the CLI."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
//! Shared primitives for the JTC telemetry client workspace.
//! This crate exposes configuration loading, tracing initialisation, and the
//! stage-tagged error type every session component reports through.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    CredentialBundle, FileConfig, LoggingConfig, RecordLimit, SensorSubscription, SessionConfig,
    SessionConfigBuilder,
};
pub use error::{SessionError, SessionStage};
pub use logging::{init_tracing, LogFormat};
