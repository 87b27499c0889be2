//! ---
//! jtc_section: "03-telemetry-session"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Telemetry decoding and session orchestration."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
//! Sequential driver for one telemetry session.
//!
//! A [`Session`] walks `Init → TransportReady → Authenticated → Subscribed →
//! Receiving → Terminated` exactly once. The receive loop itself lives in
//! [`receive_records`] and works over any [`RecordSource`], so the record
//! bound and cancellation are ordinary loop conditions.

use std::fmt;
use std::io::Write;

use async_trait::async_trait;
use jtc_common::config::{RecordLimit, SessionConfig};
use jtc_common::error::SessionError;
use jtc_net::{RecordStream, StreamHeaders, TransportSecurity};
use jtc_schemas::telemetry::OpenConfigData;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder::{decode, DecodedRecord};
use crate::record::TelemetryRecord;

pub const HEADERS_BANNER: &str = "-------- gRPC OC Headers from Junos --------";
pub const TRANSPORT_BANNER: &str = "-------- Transport --------";
pub const END_OF_STREAM: &str = "End (EOF) detected";

/// Pull-based producer of wire records.
///
/// `Ok(Some(_))` is a record, `Ok(None)` is a clean end of stream and `Err`
/// is a receive failure. Nothing is yielded after `Ok(None)` or `Err`.
#[async_trait]
pub trait RecordSource: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn next_record(&mut self) -> Result<Option<OpenConfigData>, Self::Error>;
}

#[async_trait]
impl RecordSource for RecordStream {
    type Error = tonic::Status;

    async fn next_record(&mut self) -> Result<Option<OpenConfigData>, Self::Error> {
        self.message().await
    }
}

/// Session lifecycle. Ordering follows the lifecycle; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Init,
    TransportReady,
    Authenticated,
    Subscribed,
    Receiving,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::TransportReady => "transport-ready",
            SessionState::Authenticated => "authenticated",
            SessionState::Subscribed => "subscribed",
            SessionState::Receiving => "receiving",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why a successful receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The device closed the stream.
    EndOfStream,
    /// The configured record count was reached.
    LimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub records: u64,
    /// Prefix diagnostics emitted across all records.
    pub missing_prefix: u64,
    pub outcome: SessionOutcome,
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub security: TransportSecurity,
    pub headers: StreamHeaders,
    pub summary: ReceiveSummary,
}

impl SessionReport {
    pub fn records(&self) -> u64 {
        self.summary.records
    }

    pub fn outcome(&self) -> SessionOutcome {
        self.summary.outcome
    }
}

/// Pull records from `source` until it ends, `limit` is reached, or `cancel`
/// fires. Every record is decoded with `decoder` and written to `out` before
/// the next one is requested.
pub async fn receive_records<S, D, W>(
    source: &mut S,
    limit: RecordLimit,
    decoder: D,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<ReceiveSummary, SessionError>
where
    S: RecordSource,
    D: Fn(&TelemetryRecord) -> DecodedRecord,
    W: Write + ?Sized,
{
    let mut records = 0u64;
    let mut missing_prefix = 0u64;

    while limit.allows(records) {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(SessionError::Cancelled { received: records });
            }
            next = source.next_record() => next,
        };

        match next {
            Ok(Some(data)) => {
                let record = TelemetryRecord::from(data);
                let decoded = decoder(&record);
                if decoded.missing_prefix() > 0 {
                    warn!(
                        path = %record.path,
                        sequence = record.sequence_number,
                        violations = decoded.missing_prefix(),
                        "record keys arrived without a prefix"
                    );
                }
                out.write_all(decoded.text().as_bytes())?;
                out.flush()?;
                records += 1;
                missing_prefix += decoded.missing_prefix() as u64;
                debug!(
                    received = records,
                    sequence = record.sequence_number,
                    "record decoded"
                );
            }
            Ok(None) => {
                writeln!(out, "{END_OF_STREAM}")?;
                out.flush()?;
                info!(received = records, "device closed the telemetry stream");
                return Ok(ReceiveSummary {
                    records,
                    missing_prefix,
                    outcome: SessionOutcome::EndOfStream,
                });
            }
            Err(err) => {
                warn!(received = records, error = %err, "telemetry receive failed");
                return Err(SessionError::Stream {
                    received: records,
                    source: Box::new(err),
                });
            }
        }
    }

    info!(received = records, limit = %limit, "record limit reached");
    Ok(ReceiveSummary {
        records,
        missing_prefix,
        outcome: SessionOutcome::LimitReached,
    })
}

/// Header and transport block written before the first record.
pub fn write_banner<W: Write + ?Sized>(
    out: &mut W,
    headers: &StreamHeaders,
    security: TransportSecurity,
) -> std::io::Result<()> {
    writeln!(out, "{HEADERS_BANNER}")?;
    for (key, value) in headers.iter() {
        writeln!(out, "  {key}: {value}")?;
    }
    writeln!(out, "{TRANSPORT_BANNER}")?;
    match security {
        TransportSecurity::MutualTls => writeln!(out, "  Running with mutual TLS")?,
        TransportSecurity::Cleartext => writeln!(out, "  Running clear text")?,
    }
    out.flush()
}

/// One telemetry session against one device.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    cancel: CancellationToken,
    state: SessionState,
}

impl Session {
    pub fn new(config: SessionConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Drive the session to completion, writing decoded text to `out`.
    ///
    /// The channel is opened here and dropped before returning on every path.
    /// Whatever the result, the session ends in [`SessionState::Terminated`].
    pub async fn run<W>(&mut self, out: &mut W) -> Result<SessionReport, SessionError>
    where
        W: Write + ?Sized,
    {
        if self.state != SessionState::Init {
            return Err(SessionError::config(format!(
                "session already ran (state {})",
                self.state
            )));
        }

        let result = self.drive(out).await;
        let from = self.state;
        self.advance(SessionState::Terminated);
        match &result {
            Ok(report) => info!(
                records = report.records(),
                outcome = ?report.outcome(),
                "session terminated"
            ),
            Err(err) => error!(
                stage = %err.stage(),
                state = %from,
                error = %err,
                "session failed"
            ),
        }
        result
    }

    async fn drive<W>(&mut self, out: &mut W) -> Result<SessionReport, SessionError>
    where
        W: Write + ?Sized,
    {
        let cancel = self.cancel.clone();
        let (transport, mut subscription) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(SessionError::Cancelled { received: 0 });
            }
            established = self.establish() => established?,
        };

        write_banner(out, &subscription.headers, transport.security)?;
        self.advance(SessionState::Receiving);

        let summary = receive_records(
            &mut subscription.stream,
            self.config.record_limit(),
            decode,
            out,
            &self.cancel,
        )
        .await?;

        Ok(SessionReport {
            security: transport.security,
            headers: subscription.headers,
            summary,
        })
    }

    async fn establish(
        &mut self,
    ) -> Result<(jtc_net::ConnectedTransport, jtc_net::Subscription), SessionError> {
        let transport = jtc_net::connect(&self.config).await?;
        self.advance(SessionState::TransportReady);

        let auth = jtc_net::login(
            &transport.channel,
            self.config.username(),
            self.config.secret(),
            self.config.client_id(),
        )
        .await?;
        if !auth.success {
            return Err(SessionError::LoginRejected {
                user: self.config.username().to_owned(),
            });
        }
        self.advance(SessionState::Authenticated);

        let subscription =
            jtc_net::subscribe(&transport.channel, self.config.subscriptions()).await?;
        self.advance(SessionState::Subscribed);
        Ok((transport, subscription))
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "{} -> {}", self.state, next);
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use jtc_schemas::telemetry::{key_value, KeyValue};

    #[derive(Debug)]
    struct ScriptError(&'static str);

    impl fmt::Display for ScriptError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for ScriptError {}

    /// Scripted source; an exhausted script behaves like a stream that never ends.
    struct Scripted {
        steps: VecDeque<Result<Option<OpenConfigData>, ScriptError>>,
        pulls: usize,
    }

    impl Scripted {
        fn new(steps: Vec<Result<Option<OpenConfigData>, ScriptError>>) -> Self {
            Self {
                steps: steps.into(),
                pulls: 0,
            }
        }
    }

    #[async_trait]
    impl RecordSource for Scripted {
        type Error = ScriptError;

        async fn next_record(&mut self) -> Result<Option<OpenConfigData>, Self::Error> {
            self.pulls += 1;
            match self.steps.pop_front() {
                Some(step) => step,
                None => std::future::pending().await,
            }
        }
    }

    fn data(seq: u64) -> OpenConfigData {
        OpenConfigData {
            system_id: "r1".into(),
            component_id: 2,
            path: "/interfaces".into(),
            sequence_number: seq,
            timestamp: 1000 + seq,
            kv: vec![KeyValue {
                key: "state/oper-status".into(),
                value: Some(key_value::Value::StrValue("UP".into())),
            }],
            ..OpenConfigData::default()
        }
    }

    fn stats_blocks(out: &[u8]) -> usize {
        String::from_utf8_lossy(out)
            .lines()
            .filter(|line| *line == crate::decoder::STATS_BANNER)
            .count()
    }

    #[tokio::test]
    async fn end_of_stream_before_limit_is_success() {
        let mut source = Scripted::new(vec![Ok(Some(data(1))), Ok(Some(data(2))), Ok(None)]);
        let mut out = Vec::new();
        let summary = receive_records(
            &mut source,
            RecordLimit::Bounded(10),
            decode,
            &mut out,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.outcome, SessionOutcome::EndOfStream);
        assert_eq!(summary.missing_prefix, 2);
        assert_eq!(stats_blocks(&out), 2);
        assert!(String::from_utf8_lossy(&out).ends_with("End (EOF) detected\n"));
    }

    #[tokio::test]
    async fn limit_stops_pulling() {
        let mut source = Scripted::new(vec![
            Ok(Some(data(1))),
            Ok(Some(data(2))),
            Ok(Some(data(3))),
        ]);
        let mut out = Vec::new();
        let summary = receive_records(
            &mut source,
            RecordLimit::Bounded(2),
            decode,
            &mut out,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.outcome, SessionOutcome::LimitReached);
        assert_eq!(summary.records, 2);
        assert_eq!(source.pulls, 2);
        assert!(!String::from_utf8_lossy(&out).contains(END_OF_STREAM));
    }

    #[tokio::test]
    async fn zero_count_pulls_nothing() {
        let mut source = Scripted::new(vec![Ok(Some(data(1))), Ok(Some(data(2)))]);
        let mut out = Vec::new();
        let summary = receive_records(
            &mut source,
            RecordLimit::from_count(0),
            decode,
            &mut out,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(summary.outcome, SessionOutcome::LimitReached);
        assert_eq!(source.pulls, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn receive_error_keeps_already_written_records() {
        let mut source = Scripted::new(vec![Ok(Some(data(1))), Err(ScriptError("reset"))]);
        let mut out = Vec::new();
        let err = receive_records(
            &mut source,
            RecordLimit::Unbounded,
            decode,
            &mut out,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match err {
            SessionError::Stream { received, .. } => assert_eq!(received, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stats_blocks(&out), 1);
    }

    #[tokio::test]
    async fn cancelled_token_interrupts_a_pending_receive() {
        let mut source = Scripted::new(vec![Ok(Some(data(1)))]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let mut out = Vec::new();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            receive_records(&mut source, RecordLimit::Unbounded, decode, &mut out, &cancel),
        )
        .await
        .expect("receive loop must not hang")
        .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled { received: 1 }));
    }

    #[tokio::test]
    async fn cancelled_before_first_pull_reads_nothing() {
        let mut source = Scripted::new(vec![Ok(Some(data(1)))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let err = receive_records(&mut source, RecordLimit::Unbounded, decode, &mut out, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled { received: 0 }));
        assert_eq!(source.pulls, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn banner_lists_headers_then_transport() {
        let mut metadata = tonic::metadata::MetadataMap::new();
        metadata.insert("x-device", tonic::metadata::MetadataValue::from_static("r1"));
        let headers = StreamHeaders::from_metadata(&metadata);
        let mut out = Vec::new();
        write_banner(&mut out, &headers, TransportSecurity::MutualTls).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "-------- gRPC OC Headers from Junos --------\n  x-device: r1\n-------- Transport --------\n  Running with mutual TLS\n"
        );
    }

    #[test]
    fn states_only_move_forward() {
        assert!(SessionState::Init < SessionState::TransportReady);
        assert!(SessionState::Subscribed < SessionState::Receiving);
        assert!(SessionState::Receiving < SessionState::Terminated);
    }
}
