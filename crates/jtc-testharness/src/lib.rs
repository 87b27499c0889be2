//! ---
//! jtc_section: "15-testing-qa-runbook"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "In-process fake device used by the session and network tests."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
//! A scripted stand-in for a Junos device.
//!
//! [`FakeDevice::builder`] configures how the login check answers, which
//! records the telemetry stream yields, whether the stream fails or stays
//! open afterwards, and which metadata is attached when it opens. The server
//! binds `127.0.0.1:0` and records every request it sees in [`DeviceStats`].

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use jtc_schemas::authentication::login_server::{Login, LoginServer};
use jtc_schemas::authentication::{LoginReply, LoginRequest};
use jtc_schemas::telemetry::key_value::Value;
use jtc_schemas::telemetry::open_config_telemetry_server::{
    OpenConfigTelemetry, OpenConfigTelemetryServer,
};
use jtc_schemas::telemetry::{KeyValue, OpenConfigData, SubscriptionRequest};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const FAILURE_DELAY: Duration = Duration::from_millis(50);

type RecordStream = Pin<Box<dyn Stream<Item = Result<OpenConfigData, Status>> + Send + 'static>>;

/// Entry point for building a fake device.
#[derive(Debug, Default)]
pub struct FakeDevice;

impl FakeDevice {
    pub fn builder() -> FakeDeviceBuilder {
        FakeDeviceBuilder::default()
    }
}

#[derive(Debug, Clone, Copy)]
enum LoginBehaviour {
    Reply(bool),
    Unavailable,
}

/// Script for one fake device.
#[derive(Debug, Clone)]
pub struct FakeDeviceBuilder {
    listen: SocketAddr,
    login: LoginBehaviour,
    subscription_available: bool,
    records: Vec<OpenConfigData>,
    fail_after_records: bool,
    hold_open: bool,
    headers: Vec<(&'static str, String)>,
}

impl Default for FakeDeviceBuilder {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            login: LoginBehaviour::Reply(true),
            subscription_available: true,
            records: Vec::new(),
            fail_after_records: false,
            hold_open: false,
            headers: Vec::new(),
        }
    }
}

impl FakeDeviceBuilder {
    /// Answer every login check with `result`.
    pub fn login_result(mut self, result: bool) -> Self {
        self.login = LoginBehaviour::Reply(result);
        self
    }

    /// Fail every login check with `UNAVAILABLE`.
    pub fn login_unavailable(mut self) -> Self {
        self.login = LoginBehaviour::Unavailable;
        self
    }

    /// Refuse every subscription with `PERMISSION_DENIED`.
    pub fn subscription_unavailable(mut self) -> Self {
        self.subscription_available = false;
        self
    }

    /// Records yielded, in order, by each subscription.
    pub fn records(mut self, records: Vec<OpenConfigData>) -> Self {
        self.records = records;
        self
    }

    /// End the stream with `INTERNAL` after the scripted records.
    pub fn fail_after_records(mut self) -> Self {
        self.fail_after_records = true;
        self
    }

    /// Keep the stream open after the scripted records instead of closing it.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Metadata attached to the stream's response headers.
    pub fn header(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((key, value.into()));
        self
    }

    /// Bind and serve until [`FakeDeviceHandle::shutdown`].
    pub async fn spawn(self) -> anyhow::Result<FakeDeviceHandle> {
        let listener = tokio::net::TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "fake device listening");

        let stats = Arc::new(DeviceStats::default());
        let login = LoginSvc {
            behaviour: self.login,
            stats: stats.clone(),
        };
        let telemetry = TelemetrySvc {
            available: self.subscription_available,
            records: self.records,
            fail_after_records: self.fail_after_records,
            hold_open: self.hold_open,
            headers: self.headers,
            stats: stats.clone(),
        };

        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|err| anyhow::anyhow!("failed to build fake device listener: {err}"))?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let server = Server::builder()
                .add_service(LoginServer::new(login))
                .add_service(OpenConfigTelemetryServer::new(telemetry))
                .serve_with_incoming_shutdown(incoming, async move {
                    let _ = shutdown_rx.changed().await;
                });
            if let Err(err) = server.await {
                warn!(error = %err, "fake device exited with error");
            }
        });

        Ok(FakeDeviceHandle {
            address: local_addr,
            shutdown: shutdown_tx,
            task,
            stats,
        })
    }
}

/// Requests observed by a fake device.
#[derive(Debug, Default)]
pub struct DeviceStats {
    logins: AtomicUsize,
    subscriptions: AtomicUsize,
    last_login: Mutex<Option<LoginRequest>>,
    last_subscription: Mutex<Option<SubscriptionRequest>>,
}

impl DeviceStats {
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn last_login(&self) -> Option<LoginRequest> {
        self.last_login.lock().clone()
    }

    pub fn last_subscription(&self) -> Option<SubscriptionRequest> {
        self.last_subscription.lock().clone()
    }
}

/// Handle returned when spawning a fake device.
pub struct FakeDeviceHandle {
    address: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<DeviceStats>,
}

impl FakeDeviceHandle {
    /// Socket address the device bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Signal shutdown and await the server task, aborting it if open
    /// streams keep it alive past the grace period.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::anyhow!(err)),
            Err(_) => {
                self.task.abort();
                Ok(())
            }
        }
    }
}

struct LoginSvc {
    behaviour: LoginBehaviour,
    stats: Arc<DeviceStats>,
}

#[tonic::async_trait]
impl Login for LoginSvc {
    async fn login_check(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginReply>, Status> {
        self.stats.logins.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_login.lock() = Some(request.into_inner());
        match self.behaviour {
            LoginBehaviour::Reply(result) => Ok(Response::new(LoginReply { result })),
            LoginBehaviour::Unavailable => Err(Status::unavailable("login service offline")),
        }
    }
}

struct TelemetrySvc {
    available: bool,
    records: Vec<OpenConfigData>,
    fail_after_records: bool,
    hold_open: bool,
    headers: Vec<(&'static str, String)>,
    stats: Arc<DeviceStats>,
}

#[tonic::async_trait]
impl OpenConfigTelemetry for TelemetrySvc {
    #[allow(non_camel_case_types)]
    type telemetrySubscribeStream = RecordStream;

    async fn telemetry_subscribe(
        &self,
        request: Request<SubscriptionRequest>,
    ) -> Result<Response<Self::telemetrySubscribeStream>, Status> {
        self.stats.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_subscription.lock() = Some(request.into_inner());
        if !self.available {
            return Err(Status::permission_denied("subscription refused"));
        }

        let scripted = futures::stream::iter(self.records.clone().into_iter().map(Ok));
        let stream: RecordStream = if self.fail_after_records {
            // The encoder drops frames still buffered when it meets an error.
            Box::pin(scripted.chain(futures::stream::once(async {
                tokio::time::sleep(FAILURE_DELAY).await;
                Err(Status::internal("sensor collector crashed"))
            })))
        } else if self.hold_open {
            Box::pin(scripted.chain(futures::stream::pending()))
        } else {
            Box::pin(scripted)
        };

        let mut response = Response::new(stream);
        for (key, value) in &self.headers {
            let value = value
                .parse::<MetadataValue<Ascii>>()
                .map_err(|_| Status::internal("invalid scripted header value"))?;
            response.metadata_mut().insert(*key, value);
        }
        Ok(response)
    }
}

/// Well-formed record: `__prefix__` first, then one relative counter.
pub fn sample_record(sequence_number: u64) -> OpenConfigData {
    OpenConfigData {
        system_id: "r1".into(),
        component_id: 2,
        sub_component_id: 0,
        path: "/interfaces".into(),
        sequence_number,
        timestamp: 1000 + sequence_number,
        kv: vec![
            KeyValue {
                key: "__prefix__".into(),
                value: Some(Value::StrValue("/interfaces/interface[name='ge-0/0/0']/".into())),
            },
            KeyValue {
                key: "state/counters/in-octets".into(),
                value: Some(Value::UintValue(42)),
            },
        ],
        ..OpenConfigData::default()
    }
}
