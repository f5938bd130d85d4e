//! Event payload codec.
//!
//! The ledger stores each event's details in an opaque `dataHash` string.
//! Payloads are written as a versioned envelope:
//!
//! ```json
//! {"version":1,"kind":1,"data":{"location":"Lagos Warehouse"}}
//! ```
//!
//! Older flat JSON objects (no envelope) are still read. Anything else decodes
//! to [`Decoded::Unparseable`] instead of an error.

use crate::error::Result;
use crate::types::{EventType, Role};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current envelope version
pub const PAYLOAD_VERSION: u32 = 1;

/// Notes shown in place of a payload that could not be read
pub const PLACEHOLDER_NOTES: &str = "Invalid or corrupted data";

/// Free-form event details. Every field is optional and unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Score out of 10, kept as entered
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_text"
    )]
    pub quality_score: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_hash: Option<String>,

    /// Display name of the recorder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harvest_date: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_text"
    )]
    pub quantity: Option<String>,

    /// Keys this version does not know about
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_quality_score(mut self, score: impl Into<String>) -> Self {
        self.quality_score = Some(score.into());
        self
    }

    pub fn with_certificate(mut self, certificate_hash: impl Into<String>) -> Self {
        self.certificate_hash = Some(certificate_hash.into());
        self
    }

    pub fn recorded_by(mut self, name: impl Into<String>, role: Role) -> Self {
        self.recorded_by = Some(name.into());
        self.role = Some(role);
        self
    }

    pub fn with_harvest(
        mut self,
        description: impl Into<String>,
        harvest_date: impl Into<String>,
        quantity: impl Into<String>,
    ) -> Self {
        self.description = Some(description.into());
        self.harvest_date = Some(harvest_date.into());
        self.quantity = Some(quantity.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Accept a string or a bare number for fields entered as text.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected text, found {}",
                other
            )))
        }
    })
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<EventType>,
    data: &'a EventPayload,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    #[serde(default)]
    kind: Option<EventType>,
    data: EventPayload,
}

/// Why a payload string could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub raw: String,
    pub reason: String,
    /// Human readable placeholder for display
    pub notes: String,
}

/// Result of decoding a `dataHash`
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Payload {
        /// Event kind tagged in the envelope, absent for legacy payloads
        kind: Option<EventType>,
        payload: EventPayload,
    },
    Unparseable(DecodeFailure),
}

impl Decoded {
    pub fn is_unparseable(&self) -> bool {
        matches!(self, Decoded::Unparseable(_))
    }

    pub fn kind(&self) -> Option<EventType> {
        match self {
            Decoded::Payload { kind, .. } => *kind,
            Decoded::Unparseable(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&EventPayload> {
        match self {
            Decoded::Payload { payload, .. } => Some(payload),
            Decoded::Unparseable(_) => None,
        }
    }

    /// Collapse into a payload; failures become the placeholder notes.
    pub fn into_payload(self) -> EventPayload {
        match self {
            Decoded::Payload { payload, .. } => payload,
            Decoded::Unparseable(failure) => EventPayload::new().with_notes(failure.notes),
        }
    }
}

/// Encode a payload without an event kind tag.
pub fn encode(payload: &EventPayload) -> Result<String> {
    write_envelope(None, payload)
}

/// Encode a payload tagged with the event kind it belongs to.
pub fn encode_for(kind: EventType, payload: &EventPayload) -> Result<String> {
    write_envelope(Some(kind), payload)
}

fn write_envelope(kind: Option<EventType>, payload: &EventPayload) -> Result<String> {
    let envelope = EnvelopeRef {
        version: PAYLOAD_VERSION,
        kind,
        data: payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode a `dataHash`. Never fails; bad input yields [`Decoded::Unparseable`].
pub fn decode(raw: &str) -> Decoded {
    if raw.trim().is_empty() {
        return Decoded::Payload {
            kind: None,
            payload: EventPayload::default(),
        };
    }

    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return unparseable(raw, e.to_string()),
    };

    // An envelope has a numeric version and an object under `data`;
    // anything else is read as a flat payload.
    let is_envelope = match &value {
        Value::Object(map) => {
            map.get("version").map_or(false, Value::is_u64)
                && map.get("data").map_or(false, Value::is_object)
        }
        _ => return unparseable(raw, "payload is not a JSON object".to_string()),
    };

    if is_envelope {
        match serde_json::from_value::<Envelope>(value.clone()) {
            Ok(envelope) if envelope.version > PAYLOAD_VERSION => {
                return unparseable(
                    raw,
                    format!("unsupported payload version {}", envelope.version),
                )
            }
            Ok(envelope) => {
                return Decoded::Payload {
                    kind: envelope.kind,
                    payload: envelope.data,
                }
            }
            Err(e) => tracing::debug!(error = %e, "not an envelope, reading as flat payload"),
        }
    }

    match serde_json::from_value::<EventPayload>(value) {
        Ok(payload) => Decoded::Payload { kind: None, payload },
        Err(e) => unparseable(raw, e.to_string()),
    }
}

fn unparseable(raw: &str, reason: String) -> Decoded {
    tracing::debug!(%reason, "event payload is unparseable");
    Decoded::Unparseable(DecodeFailure {
        raw: raw.to_string(),
        reason,
        notes: PLACEHOLDER_NOTES.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_full_payload() {
        let payload = EventPayload::new()
            .with_notes("Dried for three days")
            .with_location("Kano")
            .with_quality_score("8")
            .with_certificate("QmCert123")
            .recorded_by("Ada", Role::Processor);

        let decoded = decode(&encode(&payload).unwrap());
        assert_eq!(decoded.payload(), Some(&payload));
    }

    #[test]
    fn test_round_trip_keeps_kind_and_unknown_keys() {
        let mut payload = EventPayload::new().with_location("Lagos Warehouse");
        payload.extra.insert("truckId".into(), json!("LG-442"));
        payload.extra.insert("temperatureC".into(), json!(4.5));

        let decoded = decode(&encode_for(EventType::Shipment, &payload).unwrap());
        assert_eq!(decoded.kind(), Some(EventType::Shipment));
        assert_eq!(decoded.into_payload(), payload);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let decoded = decode(&encode(&EventPayload::default()).unwrap());
        assert!(decoded.payload().unwrap().is_empty());
        assert!(decode("").payload().unwrap().is_empty());
        assert!(decode("   ").payload().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_payload_yields_placeholder() {
        let decoded = decode("{not json");
        assert!(decoded.is_unparseable());
        let payload = decoded.into_payload();
        assert_eq!(payload.notes.as_deref(), Some(PLACEHOLDER_NOTES));
    }

    #[test]
    fn test_non_object_payload_is_unparseable() {
        assert!(decode("[1,2,3]").is_unparseable());
        assert!(decode("\"just text\"").is_unparseable());
        assert!(decode("42").is_unparseable());
    }

    #[test]
    fn test_legacy_flat_payload() {
        let raw = r#"{"notes":"","location":"Ibadan","qualityScore":7,"recordedBy":"Tunde","role":4}"#;
        let payload = decode(raw).into_payload();
        assert_eq!(payload.location.as_deref(), Some("Ibadan"));
        assert_eq!(payload.quality_score.as_deref(), Some("7"));
        assert_eq!(payload.role, Some(Role::Regulator));
        assert_eq!(payload.notes.as_deref(), Some(""));
    }

    #[test]
    fn test_legacy_harvest_payload() {
        let raw = r#"{"description":"White maize","harvestDate":"2024-03-01","location":"Kaduna","quantity":"500kg"}"#;
        let payload = decode(raw).into_payload();
        assert_eq!(payload.harvest_date.as_deref(), Some("2024-03-01"));
        assert_eq!(payload.quantity.as_deref(), Some("500kg"));
        assert!(payload.extra.is_empty());
    }

    #[test]
    fn test_future_version_is_unparseable() {
        let raw = r#"{"version":9,"data":{"notes":"from the future"}}"#;
        match decode(raw) {
            Decoded::Unparseable(failure) => {
                assert!(failure.reason.contains("unsupported payload version"));
                assert_eq!(failure.raw, raw);
            }
            other => panic!("expected unparseable, got {:?}", other),
        }
    }

    #[test]
    fn test_flat_payload_with_version_and_data_keys() {
        let raw = r#"{"notes":"relabelled","version":"v2","data":"lot 7"}"#;
        let decoded = decode(raw);
        assert_eq!(decoded.kind(), None);
        let payload = decoded.into_payload();
        assert_eq!(payload.notes.as_deref(), Some("relabelled"));
        assert_eq!(payload.extra.get("version"), Some(&json!("v2")));
        assert_eq!(payload.extra.get("data"), Some(&json!("lot 7")));
    }

    #[test]
    fn test_envelope_shaped_flat_payload_falls_back() {
        // Numeric version and object data, but `kind` is not an event code
        let raw = r#"{"version":1,"kind":"shipment","data":{"notes":"x"}}"#;
        let payload = decode(raw).into_payload();
        assert_eq!(payload.extra.get("kind"), Some(&json!("shipment")));
        assert_eq!(payload.extra.get("data"), Some(&json!({"notes": "x"})));
    }

    #[test]
    fn test_unknown_role_code_is_unparseable() {
        assert!(decode(r#"{"role":42}"#).is_unparseable());
    }
}
