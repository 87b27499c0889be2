//! ---
//! jtc_section: "05-networking-external-interfaces"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "gRPC transport, login, and subscription surfaces."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::path::Path;

use jtc_common::config::{CredentialBundle, SessionConfig};
use jtc_common::error::SessionError;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::{debug, info};

/// HTTP/2 stream and connection window. Large enough that bursts of records
/// from the device do not stall on flow control.
pub const INITIAL_WINDOW_SIZE: u32 = 512 * 1024;

/// Security mode of the channel, derived only from credential-bundle presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    /// Client certificate + key presented, peer validated against the CA bundle.
    MutualTls,
    /// Unauthenticated, unencrypted HTTP/2.
    Cleartext,
}

impl TransportSecurity {
    /// Select the mode for a session.
    pub fn for_config(config: &SessionConfig) -> Self {
        match config.credentials() {
            Some(_) => TransportSecurity::MutualTls,
            None => TransportSecurity::Cleartext,
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            TransportSecurity::MutualTls => "https",
            TransportSecurity::Cleartext => "http",
        }
    }
}

impl fmt::Display for TransportSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSecurity::MutualTls => f.write_str("mutual TLS"),
            TransportSecurity::Cleartext => f.write_str("clear text"),
        }
    }
}

/// Open channel plus the facts the session reports about it.
#[derive(Debug, Clone)]
pub struct ConnectedTransport {
    /// Channel shared by the login and telemetry clients.
    pub channel: Channel,
    /// Security mode the channel was built with.
    pub security: TransportSecurity,
    /// URI the channel was dialled on.
    pub endpoint: String,
}

/// URI for the configured device.
pub fn endpoint_uri(config: &SessionConfig) -> String {
    format!(
        "{}://{}",
        TransportSecurity::for_config(config).scheme(),
        config.authority()
    )
}

/// Build the endpoint without dialling. Credential files are read here so a
/// bad bundle fails before any network activity.
pub fn build_endpoint(config: &SessionConfig) -> Result<Endpoint, SessionError> {
    let uri = endpoint_uri(config);
    let mut endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|err| SessionError::config(format!("invalid endpoint {uri}: {err}")))?
        .initial_stream_window_size(INITIAL_WINDOW_SIZE)
        .initial_connection_window_size(INITIAL_WINDOW_SIZE)
        .connect_timeout(config.connect_timeout());

    if let Some(bundle) = config.credentials() {
        let tls = client_tls_config(bundle, config.host())?;
        endpoint = endpoint
            .tls_config(tls)
            .map_err(|err| SessionError::CredentialMaterial {
                reason: "unable to build TLS connector".to_owned(),
                source: Box::new(err),
            })?;
    }
    Ok(endpoint)
}

/// Mutual-TLS settings for `bundle`; the peer must present a certificate
/// valid for `host`.
pub fn client_tls_config(
    bundle: &CredentialBundle,
    host: &str,
) -> Result<ClientTlsConfig, SessionError> {
    let cert = read_pem(bundle.client_cert())?;
    let key = read_pem(bundle.client_key())?;
    let ca = read_pem(bundle.ca_bundle())?;
    debug!(
        client_cert = %bundle.client_cert().display(),
        ca_bundle = %bundle.ca_bundle().display(),
        "loaded credential bundle"
    );
    Ok(ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(ca))
        .identity(Identity::from_pem(cert, key))
        .domain_name(host))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, SessionError> {
    fs::read(path).map_err(|source| SessionError::Credential {
        path: path.to_path_buf(),
        source,
    })
}

/// Dial the device. Any failure here ends the session before login.
pub async fn connect(config: &SessionConfig) -> Result<ConnectedTransport, SessionError> {
    let security = TransportSecurity::for_config(config);
    let endpoint = build_endpoint(config)?;
    let uri = endpoint.uri().to_string();
    let channel = endpoint
        .connect()
        .await
        .map_err(|err| SessionError::Transport {
            endpoint: uri.clone(),
            source: Box::new(err),
        })?;
    info!(endpoint = %uri, security = %security, "transport ready");
    Ok(ConnectedTransport {
        channel,
        security,
        endpoint: uri,
    })
}
