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
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::error::SessionError;
use crate::logging::LogFormat;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 32767;
pub const DEFAULT_RESOURCE: &str = "/interfaces";
pub const DEFAULT_SAMPLE_FREQUENCY_MS: u64 = 1000;
pub const DEFAULT_USER: &str = "testuser";
pub const DEFAULT_CLIENT_ID: &str = "1";
pub const DEFAULT_MAX_RECORDS: u64 = 1;

/// File names expected inside a credential directory.
pub const CLIENT_CERT_FILE: &str = "client.crt";
pub const CLIENT_KEY_FILE: &str = "client.key";
pub const CA_BUNDLE_FILE: &str = "CA.crt";

fn default_sample_interval() -> Duration {
    Duration::from_millis(DEFAULT_SAMPLE_FREQUENCY_MS)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// One sensor path together with the sampling interval requested for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSubscription {
    path: String,
    sample_interval: Duration,
}

impl SensorSubscription {
    pub fn new(path: impl Into<String>, sample_interval: Duration) -> Self {
        Self {
            path: path.into(),
            sample_interval,
        }
    }

    pub fn from_millis(path: impl Into<String>, millis: u64) -> Self {
        Self::new(path, Duration::from_millis(millis))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Sampling interval as carried on the wire. Saturates at `u32::MAX`;
    /// [`SessionConfigBuilder::build`] rejects intervals that would saturate.
    pub fn sample_frequency_ms(&self) -> u32 {
        u32::try_from(self.sample_interval.as_millis()).unwrap_or(u32::MAX)
    }
}

impl Default for SensorSubscription {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE, default_sample_interval())
    }
}

/// Client certificate, private key and CA bundle used for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    client_cert: PathBuf,
    client_key: PathBuf,
    ca_bundle: PathBuf,
}

impl CredentialBundle {
    pub fn new(
        client_cert: impl Into<PathBuf>,
        client_key: impl Into<PathBuf>,
        ca_bundle: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client_cert: client_cert.into(),
            client_key: client_key.into(),
            ca_bundle: ca_bundle.into(),
        }
    }

    /// Bundle rooted at `dir` using the `client.crt`, `client.key`, `CA.crt` layout.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join(CLIENT_CERT_FILE),
            dir.join(CLIENT_KEY_FILE),
            dir.join(CA_BUNDLE_FILE),
        )
    }

    pub fn client_cert(&self) -> &Path {
        &self.client_cert
    }

    pub fn client_key(&self) -> &Path {
        &self.client_key
    }

    pub fn ca_bundle(&self) -> &Path {
        &self.ca_bundle
    }

    /// Confirm every file of the bundle exists.
    pub fn validate(&self) -> Result<(), SessionError> {
        for path in [&self.client_cert, &self.client_key, &self.ca_bundle] {
            if !path.is_file() {
                return Err(SessionError::Credential {
                    path: path.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "credential file missing"),
                });
            }
        }
        Ok(())
    }
}

/// Upper bound on decoded records for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLimit {
    Bounded(u64),
    Unbounded,
}

impl RecordLimit {
    /// A count is always a bound; `0` decodes nothing.
    pub fn from_count(count: u64) -> Self {
        RecordLimit::Bounded(count)
    }

    pub fn allows(&self, received: u64) -> bool {
        match self {
            RecordLimit::Bounded(max) => received < *max,
            RecordLimit::Unbounded => true,
        }
    }
}

impl Default for RecordLimit {
    fn default() -> Self {
        RecordLimit::Bounded(DEFAULT_MAX_RECORDS)
    }
}

impl fmt::Display for RecordLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLimit::Bounded(max) => write!(f, "{max}"),
            RecordLimit::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Immutable description of one telemetry session.
///
/// Built once at startup through [`SessionConfig::builder`] and only read
/// afterwards. The presence of a [`CredentialBundle`] is the only thing that
/// selects an encrypted transport.
#[derive(Clone)]
pub struct SessionConfig {
    host: String,
    port: u16,
    username: String,
    secret: String,
    client_id: String,
    subscriptions: Vec<SensorSubscription>,
    record_limit: RecordLimit,
    credentials: Option<CredentialBundle>,
    connect_timeout: Duration,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn subscriptions(&self) -> &[SensorSubscription] {
        &self.subscriptions
    }

    pub fn record_limit(&self) -> RecordLimit {
        self.record_limit
    }

    pub fn credentials(&self) -> Option<&CredentialBundle> {
        self.credentials.as_ref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn is_encrypted(&self) -> bool {
        self.credentials.is_some()
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("subscriptions", &self.subscriptions)
            .field("record_limit", &self.record_limit)
            .field("credentials", &self.credentials)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Collects session settings from defaults, a config file and CLI flags.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: u16,
    username: String,
    secret: String,
    client_id: String,
    subscriptions: Option<Vec<SensorSubscription>>,
    record_limit: RecordLimit,
    credentials: Option<CredentialBundle>,
    connect_timeout: Duration,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            username: DEFAULT_USER.to_owned(),
            secret: String::new(),
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            subscriptions: None,
            record_limit: RecordLimit::default(),
            credentials: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl SessionConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Replace the subscription list.
    pub fn subscriptions(mut self, subscriptions: Vec<SensorSubscription>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    pub fn add_subscription(mut self, subscription: SensorSubscription) -> Self {
        self.subscriptions
            .get_or_insert_with(Vec::new)
            .push(subscription);
        self
    }

    pub fn record_limit(mut self, limit: RecordLimit) -> Self {
        self.record_limit = limit;
        self
    }

    pub fn credentials(mut self, bundle: Option<CredentialBundle>) -> Self {
        self.credentials = bundle;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overlay every value the file sets. Values the file leaves out keep
    /// whatever the builder already holds.
    pub fn apply_file(mut self, file: &FileConfig) -> Result<Self, SessionError> {
        let session = &file.session;
        if let Some(host) = &session.host {
            self.host = host.clone();
        }
        if let Some(port) = session.port {
            self.port = port;
        }
        if let Some(user) = &session.user {
            self.username = user.clone();
        }
        if let Some(client_id) = &session.client_id {
            self.client_id = client_id.clone();
        }
        if let Some(max_records) = session.max_records {
            self.record_limit = RecordLimit::from_count(max_records);
        }
        if session.unbounded {
            self.record_limit = RecordLimit::Unbounded;
        }
        if let Some(timeout) = session.connect_timeout {
            self.connect_timeout = timeout;
        }
        if !file.subscriptions.is_empty() {
            self.subscriptions = Some(
                file.subscriptions
                    .iter()
                    .map(|entry| SensorSubscription::new(&entry.path, entry.sample_frequency))
                    .collect(),
            );
        }
        if let Some(credentials) = &file.credentials {
            self.credentials = Some(credentials.to_bundle()?);
        }
        Ok(self)
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        if self.host.trim().is_empty() {
            return Err(SessionError::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(SessionError::config("port must not be zero"));
        }
        if self.username.is_empty() {
            return Err(SessionError::config("username must not be empty"));
        }
        let subscriptions = self
            .subscriptions
            .unwrap_or_else(|| vec![SensorSubscription::default()]);
        if subscriptions.is_empty() {
            return Err(SessionError::config(
                "at least one sensor path must be subscribed",
            ));
        }
        for subscription in &subscriptions {
            if subscription.path().trim().is_empty() {
                return Err(SessionError::config("sensor path must not be empty"));
            }
            if u32::try_from(subscription.sample_interval().as_millis()).is_err() {
                return Err(SessionError::config(format!(
                    "sample frequency for {} exceeds {} ms",
                    subscription.path(),
                    u32::MAX
                )));
            }
        }
        if let Some(bundle) = &self.credentials {
            bundle.validate()?;
        }
        Ok(SessionConfig {
            host: self.host,
            port: self.port,
            username: self.username,
            secret: self.secret,
            client_id: self.client_id,
            subscriptions,
            record_limit: self.record_limit,
            credentials: self.credentials,
            connect_timeout: self.connect_timeout,
        })
    }
}

/// On-disk TOML overlay for the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionEntry>,
    #[serde(default)]
    pub credentials: Option<CredentialsSection>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`FileConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedFileConfig {
    pub config: FileConfig,
    pub source: PathBuf,
}

impl FileConfig {
    pub const ENV_CONFIG_PATH: &str = "JTC_CONFIG";

    /// Load the explicit path if given, else the `JTC_CONFIG` path if set.
    /// Running without any config file is normal.
    pub fn load_optional(explicit: Option<&Path>) -> Result<Option<LoadedFileConfig>> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var(Self::ENV_CONFIG_PATH)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        };
        let Some(path) = path else {
            return Ok(None);
        };
        let config = Self::from_path(&path)?;
        Ok(Some(LoadedFileConfig {
            config,
            source: path,
        }))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

impl std::str::FromStr for FileConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        toml::from_str(content).with_context(|| "failed to parse configuration")
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub max_records: Option<u64>,
    /// Receive until the device closes the stream; overrides `max_records`.
    #[serde(default)]
    pub unbounded: bool,
    #[serde(default, rename = "connect_timeout_secs")]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub connect_timeout: Option<Duration>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub path: String,
    #[serde(default = "default_sample_interval", rename = "sample_frequency_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sample_frequency: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsSection {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
}

impl CredentialsSection {
    /// Explicit paths take precedence over the directory layout.
    pub fn to_bundle(&self) -> Result<CredentialBundle, SessionError> {
        match (&self.client_cert, &self.client_key, &self.ca_bundle) {
            (Some(cert), Some(key), Some(ca)) => Ok(CredentialBundle::new(cert, key, ca)),
            (None, None, None) => match &self.directory {
                Some(dir) => Ok(CredentialBundle::from_dir(dir)),
                None => Err(SessionError::config(
                    "credentials section needs a directory or all three file paths",
                )),
            },
            _ => Err(SessionError::config(
                "credentials section must set client_cert, client_key and ca_bundle together",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for a rolling daily log file. Console-only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionStage;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_cli_surface() {
        let config = SessionConfig::builder().build().unwrap();
        assert_eq!(config.host(), DEFAULT_HOST);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.username(), DEFAULT_USER);
        assert_eq!(config.client_id(), DEFAULT_CLIENT_ID);
        assert_eq!(config.record_limit(), RecordLimit::Bounded(1));
        assert_eq!(config.subscriptions().len(), 1);
        assert_eq!(config.subscriptions()[0].path(), DEFAULT_RESOURCE);
        assert_eq!(config.subscriptions()[0].sample_frequency_ms(), 1000);
        assert!(!config.is_encrypted());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let config = SessionConfig::builder()
            .secret("hunter2")
            .build()
            .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn empty_subscription_list_is_rejected() {
        let err = SessionConfig::builder()
            .subscriptions(Vec::new())
            .build()
            .unwrap_err();
        assert_eq!(err.stage(), SessionStage::Configuration);
    }

    #[test]
    fn oversized_sample_interval_is_rejected() {
        let err = SessionConfig::builder()
            .subscriptions(vec![SensorSubscription::from_millis(
                "/interfaces",
                u64::from(u32::MAX) + 1,
            )])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("/interfaces"));
    }

    #[test]
    fn missing_credential_file_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CLIENT_CERT_FILE), "cert").unwrap();
        fs::write(dir.path().join(CLIENT_KEY_FILE), "key").unwrap();
        let err = SessionConfig::builder()
            .credentials(Some(CredentialBundle::from_dir(dir.path())))
            .build()
            .unwrap_err();
        match err {
            SessionError::Credential { path, .. } => assert!(path.ends_with(CA_BUNDLE_FILE)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn complete_bundle_selects_encryption() {
        let dir = tempdir().unwrap();
        for name in [CLIENT_CERT_FILE, CLIENT_KEY_FILE, CA_BUNDLE_FILE] {
            fs::write(dir.path().join(name), "pem").unwrap();
        }
        let config = SessionConfig::builder()
            .credentials(Some(CredentialBundle::from_dir(dir.path())))
            .build()
            .unwrap();
        assert!(config.is_encrypted());
    }

    #[test]
    fn record_limit_zero_allows_nothing() {
        assert_eq!(RecordLimit::from_count(0), RecordLimit::Bounded(0));
        assert!(!RecordLimit::from_count(0).allows(0));
        assert!(RecordLimit::Unbounded.allows(u64::MAX - 1));
        let limit = RecordLimit::from_count(2);
        assert!(limit.allows(1));
        assert!(!limit.allows(2));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let config = SessionConfig::builder()
            .host("2001:db8::1")
            .port(50051)
            .build()
            .unwrap();
        assert_eq!(config.authority(), "[2001:db8::1]:50051");
    }

    #[test]
    fn file_overlay_replaces_only_what_it_sets() {
        let file: FileConfig = r#"
            [session]
            host = "r1.lab"
            max_records = 0
            connect_timeout_secs = 3

            [[subscriptions]]
            path = "/interfaces"
            sample_frequency_ms = 2000

            [[subscriptions]]
            path = "/components"
        "#
        .parse()
        .unwrap();
        let config = SessionConfig::builder()
            .username("lab")
            .apply_file(&file)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.host(), "r1.lab");
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.username(), "lab");
        assert_eq!(config.record_limit(), RecordLimit::Bounded(0));
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.subscriptions()[0].sample_frequency_ms(), 2000);
        assert_eq!(config.subscriptions()[1].path(), "/components");
        assert_eq!(
            config.subscriptions()[1].sample_frequency_ms(),
            DEFAULT_SAMPLE_FREQUENCY_MS as u32
        );
    }

    #[test]
    fn unbounded_switch_overrides_max_records() {
        let file: FileConfig = r#"
            [session]
            max_records = 5
            unbounded = true
        "#
        .parse()
        .unwrap();
        let config = SessionConfig::builder()
            .apply_file(&file)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.record_limit(), RecordLimit::Unbounded);
    }

    #[test]
    fn partial_credential_paths_are_rejected() {
        let section = CredentialsSection {
            client_cert: Some("a.crt".into()),
            ..CredentialsSection::default()
        };
        assert!(section.to_bundle().is_err());
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jtc.toml");
        fs::write(&path, "[logging]\nformat = \"structured-json\"\n").unwrap();
        let loaded = FileConfig::load_optional(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.logging.format, LogFormat::StructuredJson);
    }
}
