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

use jtc_common::config::SensorSubscription;
use jtc_common::error::SessionError;
use jtc_schemas::telemetry::{OpenConfigData, Path, SubscriptionRequest};
use jtc_schemas::OpenConfigTelemetryClient;
use tonic::metadata::{KeyAndValueRef, MetadataMap};
use tonic::transport::Channel;
use tonic::{Request, Status, Streaming};
use tracing::{debug, info};

/// Metadata the device attached when the stream was opened, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeaders(Vec<(String, String)>);

impl StreamHeaders {
    /// Flatten gRPC metadata into printable pairs. Binary values keep their
    /// debug representation.
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        let pairs = metadata
            .iter()
            .map(|entry| match entry {
                KeyAndValueRef::Ascii(key, value) => (
                    key.as_str().to_owned(),
                    value
                        .to_str()
                        .map(str::to_owned)
                        .unwrap_or_else(|_| format!("{value:?}")),
                ),
                KeyAndValueRef::Binary(key, value) => {
                    (key.as_str().to_owned(), format!("{value:?}"))
                }
            })
            .collect();
        Self(pairs)
    }

    /// Iterate `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Number of header pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the device sent no metadata.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pull handle over the device's `OpenConfigData` stream.
pub struct RecordStream {
    inner: Streaming<OpenConfigData>,
}

impl fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream").finish_non_exhaustive()
    }
}

impl RecordStream {
    /// Next message. `Ok(None)` marks a clean end of stream.
    pub async fn message(&mut self) -> Result<Option<OpenConfigData>, Status> {
        self.inner.message().await
    }
}

/// An open subscription: the initiation metadata plus the record stream.
#[derive(Debug)]
pub struct Subscription {
    /// Metadata captured when the stream was opened.
    pub headers: StreamHeaders,
    /// Records still to be pulled.
    pub stream: RecordStream,
}

/// One request carrying every path, each with its own sampling interval.
pub fn subscription_request(paths: &[SensorSubscription]) -> SubscriptionRequest {
    SubscriptionRequest {
        path_list: paths
            .iter()
            .map(|subscription| Path {
                path: subscription.path().to_owned(),
                sample_frequency: subscription.sample_frequency_ms(),
                ..Path::default()
            })
            .collect(),
        ..SubscriptionRequest::default()
    }
}

/// Open the server-streaming `telemetrySubscribe` call.
pub async fn subscribe(
    channel: &Channel,
    paths: &[SensorSubscription],
) -> Result<Subscription, SessionError> {
    if paths.is_empty() {
        return Err(SessionError::config("subscription needs at least one path"));
    }
    let mut client = OpenConfigTelemetryClient::new(channel.clone());
    let request = subscription_request(paths);
    debug!(paths = request.path_list.len(), "opening telemetry subscription");
    let response = client
        .telemetry_subscribe(Request::new(request))
        .await
        .map_err(|status| SessionError::Subscription {
            source: Box::new(status),
        })?;
    let headers = StreamHeaders::from_metadata(response.metadata());
    info!(headers = headers.len(), "telemetry stream opened");
    Ok(Subscription {
        headers,
        stream: RecordStream {
            inner: response.into_inner(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jtc_common::error::SessionStage;
    use jtc_testharness::{sample_record, FakeDevice};
    use tonic::metadata::MetadataValue;

    #[test]
    fn request_keeps_every_path_and_interval() {
        let request = subscription_request(&[
            SensorSubscription::from_millis("/interfaces", 1000),
            SensorSubscription::from_millis("/components", 5000),
        ]);
        assert_eq!(request.path_list.len(), 2);
        assert_eq!(request.path_list[0].path, "/interfaces");
        assert_eq!(request.path_list[0].sample_frequency, 1000);
        assert_eq!(request.path_list[1].path, "/components");
        assert_eq!(request.path_list[1].sample_frequency, 5000);
        assert!(request.input.is_none());
    }

    #[test]
    fn headers_preserve_order_and_values() {
        let mut metadata = MetadataMap::new();
        metadata.insert("x-first", MetadataValue::from_static("one"));
        metadata.insert("x-second", MetadataValue::from_static("two"));
        let headers = StreamHeaders::from_metadata(&metadata);
        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["x-first", "x-second"]);
        assert_eq!(headers.get("x-second"), Some("two"));
    }

    #[tokio::test]
    async fn subscribe_captures_headers_and_streams_records() {
        let device = FakeDevice::builder()
            .header("x-device-name", "r1")
            .records(vec![sample_record(1), sample_record(2)])
            .spawn()
            .await
            .unwrap();
        let channel = Channel::from_shared(format!("http://{}", device.local_addr()))
            .unwrap()
            .connect()
            .await
            .unwrap();

        let mut subscription = subscribe(
            &channel,
            &[SensorSubscription::from_millis("/interfaces", 2000)],
        )
        .await
        .unwrap();
        assert_eq!(subscription.headers.get("x-device-name"), Some("r1"));

        let first = subscription.stream.message().await.unwrap().unwrap();
        assert_eq!(first.sequence_number, 1);
        let second = subscription.stream.message().await.unwrap().unwrap();
        assert_eq!(second.sequence_number, 2);
        assert!(subscription.stream.message().await.unwrap().is_none());

        let request = device.stats().last_subscription().expect("request recorded");
        assert_eq!(request.path_list[0].sample_frequency, 2000);
        device.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_subscription_is_a_subscription_error() {
        let device = FakeDevice::builder()
            .subscription_unavailable()
            .spawn()
            .await
            .unwrap();
        let channel = Channel::from_shared(format!("http://{}", device.local_addr()))
            .unwrap()
            .connect()
            .await
            .unwrap();

        let err = subscribe(&channel, &[SensorSubscription::default()])
            .await
            .unwrap_err();
        assert_eq!(err.stage(), SessionStage::Subscription);
        device.shutdown().await.unwrap();
    }
}
