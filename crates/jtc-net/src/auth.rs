//! ---
//! jtc_section: "05-networking-external-interfaces"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "gRPC transport, login, and subscription surfaces."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
use jtc_common::error::SessionError;
use jtc_schemas::authentication::LoginRequest;
use jtc_schemas::LoginClient;
use tonic::transport::Channel;
use tonic::Request;
use tracing::{debug, warn};

/// Outcome of the device's login check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthResult {
    /// `true` when the device accepted the credentials.
    pub success: bool,
}

/// Run the single `LoginCheck` round trip. No retry; a transport failure is
/// returned as [`SessionError::Auth`]. A rejected login is returned as
/// `Ok(AuthResult { success: false })` and gating is left to the caller.
pub async fn login(
    channel: &Channel,
    username: &str,
    secret: &str,
    client_id: &str,
) -> Result<AuthResult, SessionError> {
    let mut client = LoginClient::new(channel.clone());
    let request = Request::new(LoginRequest {
        user_name: username.to_owned(),
        password: secret.to_owned(),
        client_id: client_id.to_owned(),
    });
    debug!(user = %username, client_id = %client_id, "sending login check");
    let reply = client
        .login_check(request)
        .await
        .map_err(|status| SessionError::Auth {
            source: Box::new(status),
        })?
        .into_inner();
    let result = AuthResult {
        success: reply.result,
    };
    if !result.success {
        warn!(user = %username, "device rejected login");
    }
    Ok(result)
}
