//! ---
//! jtc_section: "05-networking-external-interfaces"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "gRPC transport, login, and subscription surfaces."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
//! Network-facing half of a telemetry session.
//!
//! The three modules are used strictly in order: [`transport::connect`]
//! yields a channel, [`auth::login`] gates the session on the device's login
//! check, and [`subscription::subscribe`] opens the record stream.
#![warn(missing_docs)]

pub mod auth;
pub mod subscription;
pub mod transport;

pub use auth::{login, AuthResult};
pub use subscription::{subscribe, subscription_request, RecordStream, StreamHeaders, Subscription};
pub use transport::{connect, ConnectedTransport, TransportSecurity, INITIAL_WINDOW_SIZE};
