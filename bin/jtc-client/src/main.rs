//! ---
//! jtc_section: "05-networking-external-interfaces"
//! jtc_subsection: "binary"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Binary entrypoint for the JTC telemetry client."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use jtc_common::config::{
    CredentialBundle, FileConfig, RecordLimit, SensorSubscription, SessionConfigBuilder,
    DEFAULT_RESOURCE, DEFAULT_SAMPLE_FREQUENCY_MS,
};
use jtc_common::error::SessionError;
use jtc_common::logging::{init_tracing, LogFormat};
use jtc_common::LoggingConfig;
use jtc_core::Session;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod prompt;

const SERVICE_NAME: &str = "jtc-client";

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Subscribe to Junos OpenConfig telemetry and print decoded records",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "COUNT",
        help = "Records to receive before exiting [default: 1]"
    )]
    loops: Option<u64>,

    #[arg(
        long,
        conflicts_with = "loops",
        help = "Receive until the device closes the stream"
    )]
    unbounded: bool,

    #[arg(long, help = "Device address [default: 127.0.0.1]")]
    host: Option<String>,

    #[arg(long, help = "Device gRPC port [default: 32767]")]
    port: Option<u16>,

    #[arg(
        long = "resource",
        value_name = "PATH",
        action = ArgAction::Append,
        help = "Sensor path to subscribe; repeat for several [default: /interfaces]"
    )]
    resources: Vec<String>,

    #[arg(
        long,
        value_name = "MS",
        help = "Sample frequency in milliseconds [default: 1000]"
    )]
    smpfreq: Option<u64>,

    #[arg(long, help = "Login user [default: testuser]")]
    user: Option<String>,

    #[arg(long, help = "Client id sent with the login check [default: 1]")]
    cid: Option<String>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory holding client.crt, client.key and CA.crt; empty for clear text"
    )]
    certdir: Option<String>,

    #[arg(long, value_name = "FILE", help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", help = "Log format: pretty or structured-json")]
    log_format: Option<LogFormat>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,
}

impl Cli {
    /// Overlay command-line values on `builder`. Flags win over the file.
    fn apply(
        &self,
        mut builder: SessionConfigBuilder,
        file: Option<&FileConfig>,
    ) -> Result<SessionConfigBuilder, SessionError> {
        if let Some(host) = &self.host {
            builder = builder.host(host);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(user) = &self.user {
            builder = builder.username(user);
        }
        if let Some(cid) = &self.cid {
            builder = builder.client_id(cid);
        }
        if let Some(loops) = self.loops {
            builder = builder.record_limit(RecordLimit::from_count(loops));
        }
        if self.unbounded {
            builder = builder.record_limit(RecordLimit::Unbounded);
        }
        if let Some(paths) = self.subscription_paths(file) {
            let millis = self.smpfreq.unwrap_or(DEFAULT_SAMPLE_FREQUENCY_MS);
            builder = builder.subscriptions(
                paths
                    .into_iter()
                    .map(|path| SensorSubscription::from_millis(path, millis))
                    .collect(),
            );
        }
        match &self.certdir {
            Some(dir) if dir.is_empty() => builder = builder.credentials(None),
            Some(dir) => builder = builder.credentials(Some(CredentialBundle::from_dir(dir))),
            None => {}
        }
        Ok(builder)
    }

    /// Paths to re-subscribe when a flag touches subscriptions. `--smpfreq`
    /// alone re-times whatever the file (or the default) subscribes.
    fn subscription_paths(&self, file: Option<&FileConfig>) -> Option<Vec<String>> {
        if !self.resources.is_empty() {
            return Some(self.resources.clone());
        }
        if self.smpfreq.is_none() {
            return None;
        }
        let from_file: Vec<String> = file
            .map(|file| file.subscriptions.iter().map(|entry| entry.path.clone()).collect())
            .unwrap_or_default();
        if from_file.is_empty() {
            Some(vec![DEFAULT_RESOURCE.to_owned()])
        } else {
            Some(from_file)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{} {}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let loaded = FileConfig::load_optional(cli.config.as_deref())?;
    let file = loaded.as_ref().map(|loaded| &loaded.config);

    let mut logging = file
        .map(|file| file.logging.clone())
        .unwrap_or_else(LoggingConfig::default);
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    init_tracing(SERVICE_NAME, &logging)?;
    if let Some(loaded) = &loaded {
        info!(config_path = %loaded.source.display(), "configuration file loaded");
    }

    let mut builder = SessionConfigBuilder::default();
    if let Some(file) = file {
        builder = builder.apply_file(file)?;
    }
    let builder = cli.apply(builder, file)?;

    let secret = prompt::read_secret("Enter Password: ").context("unable to read password")?;
    let config = builder.secret(secret).build()?;
    info!(
        endpoint = %config.authority(),
        user = %config.username(),
        paths = config.subscriptions().len(),
        limit = %config.record_limit(),
        encrypted = config.is_encrypted(),
        "starting telemetry session"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling session");
            interrupt.cancel();
        }
    });

    let mut session = Session::new(config, cancel);
    let mut stdout = io::stdout();
    let report = session
        .run(&mut stdout)
        .await
        .map_err(|err| {
            let stage = err.stage();
            anyhow::Error::new(err).context(format!("session failed during {stage}"))
        })?;
    info!(
        records = report.records(),
        outcome = ?report.outcome(),
        missing_prefix = report.summary.missing_prefix,
        "session complete"
    );
    Ok(())
}
