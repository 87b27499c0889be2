//! ---
//! jtc_section: "02-wire-protocol"
//! jtc_subsection: "module"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Generated protobuf modules for the telemetry export service."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
//! Re-exports the generated protobuf modules so the rest of the workspace
//! depends on one copy of the wire types.
//!
//! * [`telemetry`] carries `OpenConfigTelemetry` and the `OpenConfigData`
//!   record stream.
//! * [`authentication`] carries the unary `Login/LoginCheck` exchange.

#[allow(missing_docs, clippy::all)]
pub mod telemetry {
    tonic::include_proto!("telemetry");
}

#[allow(missing_docs, clippy::all)]
pub mod authentication {
    tonic::include_proto!("authentication");
}

pub use authentication::login_client::LoginClient;
pub use telemetry::open_config_telemetry_client::OpenConfigTelemetryClient;

#[cfg(test)]
mod tests {
    use super::telemetry::key_value::Value;
    use super::telemetry::{KeyValue, OpenConfigData};
    use prost::Message;

    #[test]
    fn key_value_oneof_survives_the_wire() {
        let data = OpenConfigData {
            system_id: "r1".into(),
            path: "/interfaces".into(),
            kv: vec![KeyValue {
                key: "in-octets".into(),
                value: Some(Value::SintValue(-7)),
            }],
            ..Default::default()
        };
        let decoded = OpenConfigData::decode(data.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.kv[0].value, Some(Value::SintValue(-7)));
        assert_eq!(decoded.system_id, "r1");
    }

    #[test]
    fn unset_value_decodes_as_none() {
        let kv = KeyValue {
            key: "__timestamp__".into(),
            value: None,
        };
        let decoded = KeyValue::decode(kv.encode_to_vec().as_slice()).unwrap();
        assert!(decoded.value.is_none());
    }
}
