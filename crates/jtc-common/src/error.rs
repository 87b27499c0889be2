//! ---
//! jtc_section: "01-core-functionality"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Shared primitives consumed by the session engine and the CLI."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed source error carried across crate boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Session stage in which a fatal condition was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStage {
    Configuration,
    Transport,
    Authentication,
    Subscription,
    Receiving,
    Output,
}

impl SessionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::Configuration => "configuration",
            SessionStage::Transport => "transport",
            SessionStage::Authentication => "authentication",
            SessionStage::Subscription => "subscription",
            SessionStage::Receiving => "receiving",
            SessionStage::Output => "output",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every fatal condition a session can end with. End-of-stream is not an error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
    #[error("unable to read credential file {path}")]
    Credential {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid credential material: {reason}")]
    CredentialMaterial {
        reason: String,
        #[source]
        source: BoxError,
    },
    #[error("could not connect to {endpoint}")]
    Transport {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("login exchange failed")]
    Auth {
        #[source]
        source: BoxError,
    },
    #[error("login rejected for user {user}")]
    LoginRejected { user: String },
    #[error("could not open telemetry subscription")]
    Subscription {
        #[source]
        source: BoxError,
    },
    #[error("telemetry stream failed after {received} record(s)")]
    Stream {
        received: u64,
        #[source]
        source: BoxError,
    },
    #[error("session cancelled after {received} record(s)")]
    Cancelled { received: u64 },
    #[error("failed writing decoded output")]
    Output(#[from] std::io::Error),
}

impl SessionError {
    pub fn config(reason: impl Into<String>) -> Self {
        SessionError::Config {
            reason: reason.into(),
        }
    }

    /// Stage that raised the error.
    pub fn stage(&self) -> SessionStage {
        match self {
            SessionError::Config { .. }
            | SessionError::Credential { .. }
            | SessionError::CredentialMaterial { .. } => SessionStage::Configuration,
            SessionError::Transport { .. } => SessionStage::Transport,
            SessionError::Auth { .. } | SessionError::LoginRejected { .. } => {
                SessionStage::Authentication
            }
            SessionError::Subscription { .. } => SessionStage::Subscription,
            SessionError::Stream { .. } | SessionError::Cancelled { .. } => SessionStage::Receiving,
            SessionError::Output(_) => SessionStage::Output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_variants() {
        assert_eq!(
            SessionError::config("no host").stage(),
            SessionStage::Configuration
        );
        assert_eq!(
            SessionError::LoginRejected { user: "lab".into() }.stage(),
            SessionStage::Authentication
        );
        assert_eq!(
            SessionError::Cancelled { received: 3 }.stage(),
            SessionStage::Receiving
        );
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        assert_eq!(SessionError::from(io).stage(), SessionStage::Output);
    }

    #[test]
    fn stream_error_keeps_source() {
        let source = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = SessionError::Stream {
            received: 1,
            source: Box::new(source),
        };
        assert_eq!(err.to_string(), "telemetry stream failed after 1 record(s)");
        let source = std::error::Error::source(&err).expect("source retained");
        assert_eq!(source.to_string(), "reset");
    }
}
