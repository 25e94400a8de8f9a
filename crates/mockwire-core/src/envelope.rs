//! The message envelope exchanged on every persistent session.
//!
//! Wire shape (JSON text frame):
//!
//! ```text
//! {"type": "<kind>", "data": <payload>, "timestamp": <secs>, "room": "<label>"}
//! ```
//!
//! `room` is present only on audience-scoped traffic. Decoding is total: a
//! frame that is not a valid envelope becomes a rejection envelope addressed
//! back to the sender, never an error that tears the connection down.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EnvelopeError;

/// Data of the rejection sent for binary frames.
pub const UNSUPPORTED_FRAME_TEXT: &str = "Binary messages not supported";

/// Envelope discriminator.
///
/// Inbound traffic may carry any string; the session re-tags it before it is
/// sent anywhere, so unknown values are kept verbatim in [`Kind::Other`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Kind {
    /// Greeting sent once after the handshake.
    Welcome,
    /// Point-to-point reply.
    Echo,
    /// Fan-out to the global audience.
    Broadcast,
    /// Fan-out inside one room.
    Chat,
    /// A connection entered a room.
    Join,
    /// A connection left a room.
    Leave,
    /// The inbound frame was not a valid envelope (`json_error` on the wire).
    ParseError,
    /// The inbound frame was not a text frame (`error` on the wire).
    Unsupported,
    /// Any other client-supplied value.
    Other(String),
    /// No `type` field, or an empty one.
    #[default]
    Unset,
}

impl Kind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Welcome => "welcome",
            Self::Echo => "echo",
            Self::Broadcast => "broadcast",
            Self::Chat => "chat",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::ParseError => "json_error",
            Self::Unsupported => "error",
            Self::Other(s) => s,
            Self::Unset => "",
        }
    }

    /// Whether this is one of the rejection kinds routed back to the sender only.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ParseError | Self::Unsupported)
    }
}

impl From<String> for Kind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "welcome" => Self::Welcome,
            "echo" => Self::Echo,
            "broadcast" => Self::Broadcast,
            "chat" => Self::Chat,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "json_error" => Self::ParseError,
            "error" => Self::Unsupported,
            "" => Self::Unset,
            _ => Self::Other(s),
        }
    }
}

impl From<Option<String>> for Kind {
    /// A `null` type reads the same as a missing one.
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::Unset, Self::from)
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope payload.
///
/// Covers the shapes the server itself produces (a plain string, a flat
/// object of strings) plus a pass-through for whatever a client sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A bare JSON string.
    Text(String),
    /// A flat JSON object whose values are all strings.
    Fields(BTreeMap<String, String>),
    /// Any other JSON value, forwarded untouched.
    Blob(Value),
}

impl Payload {
    /// Text payload.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Object-of-strings payload.
    pub fn fields<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a string field of a [`Payload::Fields`] payload.
    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Self::Fields(map) => map.get(key).map(String::as_str),
            _ => None,
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Blob(Value::Null)
    }
}

/// The canonical message unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator (`type` on the wire).
    #[serde(rename = "type", default)]
    pub kind: Kind,
    /// Opaque payload (`data` on the wire).
    #[serde(rename = "data", default)]
    pub payload: Payload,
    /// Seconds since the epoch (`timestamp` on the wire).
    #[serde(rename = "timestamp", default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    /// Audience label (`room` on the wire), only on audience-scoped traffic.
    #[serde(rename = "room", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl Envelope {
    /// Unstamped envelope with no audience.
    pub fn new(kind: Kind, payload: Payload) -> Self {
        Self {
            kind,
            payload,
            sent_at: None,
            audience: None,
        }
    }

    /// Tag with an audience label.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Re-tag an inbound envelope for sending: new kind, same payload, no
    /// timestamp (it is stamped again at transmission).
    #[must_use]
    pub fn retag(self, kind: Kind, audience: Option<&str>) -> Self {
        Self {
            kind,
            payload: self.payload,
            sent_at: None,
            audience: audience.map(str::to_owned),
        }
    }

    /// Set the transmission timestamp.
    pub fn stamp(&mut self, now: i64) {
        self.sent_at = Some(now);
    }

    /// Serialize for the wire.
    ///
    /// Refuses envelopes that were never stamped.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        if self.sent_at.is_none() {
            return Err(EnvelopeError::Unstamped(self.kind.to_string()));
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Rejection for a text frame that is not a valid envelope.
    ///
    /// Carries the raw text and a diagnostic with the decoder's error class and
    /// position.
    pub fn parse_error(raw: &str, err: &serde_json::Error, now: i64) -> Self {
        let class = match err.classify() {
            serde_json::error::Category::Io => "io",
            serde_json::error::Category::Syntax => "syntax",
            serde_json::error::Category::Data => "data",
            serde_json::error::Category::Eof => "eof",
        };
        let payload = Payload::fields([
            ("error", "Invalid JSON format".to_owned()),
            ("details", err.to_string()),
            ("class", class.to_owned()),
            ("line", err.line().to_string()),
            ("column", err.column().to_string()),
            ("raw_data", raw.to_owned()),
        ]);
        let mut env = Self::new(Kind::ParseError, payload);
        env.stamp(now);
        env
    }

    /// Rejection for a non-text frame.
    pub fn unsupported(now: i64) -> Self {
        let mut env = Self::new(Kind::Unsupported, Payload::text(UNSUPPORTED_FRAME_TEXT));
        env.stamp(now);
        env
    }
}

/// One inbound transport frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Content (text) frame.
    Text(String),
    /// Non-content frame.
    Binary(Vec<u8>),
}

/// Result of decoding one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A valid envelope, `sent_at` filled in if the sender left it out.
    Message(Envelope),
    /// A rejection to be sent back to the sender only.
    Rejected(Envelope),
}

/// Decode one frame. Never fails.
///
/// A missing or zero `timestamp` is replaced with `now`.
pub fn decode(frame: &Frame, now: i64) -> Inbound {
    let text = match frame {
        Frame::Text(text) => text,
        Frame::Binary(_) => return Inbound::Rejected(Envelope::unsupported(now)),
    };
    match serde_json::from_str::<Envelope>(text) {
        Ok(mut env) => {
            if env.sent_at.unwrap_or(0) == 0 {
                env.sent_at = Some(now);
            }
            Inbound::Message(env)
        }
        Err(e) => Inbound::Rejected(Envelope::parse_error(text, &e, now)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn text(s: &str) -> Frame {
        Frame::Text(s.to_owned())
    }

    fn expect_message(inbound: Inbound) -> Envelope {
        match inbound {
            Inbound::Message(env) => env,
            Inbound::Rejected(env) => panic!("expected message, got rejection {env:?}"),
        }
    }

    fn expect_rejected(inbound: Inbound) -> Envelope {
        match inbound {
            Inbound::Rejected(env) => env,
            Inbound::Message(env) => panic!("expected rejection, got {env:?}"),
        }
    }

    #[test]
    fn decode_full_envelope() {
        let env = expect_message(decode(
            &text(r#"{"type":"test","data":"hello","timestamp":123}"#),
            NOW,
        ));
        assert_eq!(env.kind, Kind::Other("test".into()));
        assert_eq!(env.payload, Payload::text("hello"));
        assert_eq!(env.sent_at, Some(123));
        assert!(env.audience.is_none());
    }

    #[test]
    fn missing_timestamp_is_assigned_at_receipt() {
        let env = expect_message(decode(&text(r#"{"data":"hi"}"#), NOW));
        assert_eq!(env.sent_at, Some(NOW));
        assert_eq!(env.kind, Kind::Unset);
    }

    #[test]
    fn null_type_reads_as_unset() {
        let env = expect_message(decode(&text(r#"{"type":null,"data":"hi"}"#), NOW));
        assert_eq!(env.kind, Kind::Unset);
        assert_eq!(env.payload, Payload::text("hi"));
    }

    #[test]
    fn zero_timestamp_is_treated_as_missing() {
        let env = expect_message(decode(&text(r#"{"data":1,"timestamp":0}"#), NOW));
        assert_eq!(env.sent_at, Some(NOW));
    }

    #[test]
    fn missing_data_decodes_as_null_blob() {
        let env = expect_message(decode(&text(r#"{"type":"ping"}"#), NOW));
        assert_eq!(env.payload, Payload::Blob(Value::Null));
    }

    #[test]
    fn payload_shapes() {
        let fields = expect_message(decode(&text(r#"{"data":{"a":"1","b":"2"}}"#), NOW));
        assert_eq!(fields.payload.field("a"), Some("1"));

        let nested = expect_message(decode(&text(r#"{"data":{"a":{"b":[1,2]}}}"#), NOW));
        assert_eq!(nested.payload, Payload::Blob(json!({"a": {"b": [1, 2]}})));

        let number = expect_message(decode(&text(r#"{"data":42}"#), NOW));
        assert_eq!(number.payload, Payload::Blob(json!(42)));
    }

    #[test]
    fn malformed_json_becomes_parse_error_with_raw_text() {
        let raw = r#"{"type": "test", "data": }"#;
        let env = expect_rejected(decode(&text(raw), NOW));
        assert_eq!(env.kind, Kind::ParseError);
        assert_eq!(env.sent_at, Some(NOW));
        assert_eq!(env.payload.field("error"), Some("Invalid JSON format"));
        assert_eq!(env.payload.field("raw_data"), Some(raw));
        assert_eq!(env.payload.field("class"), Some("syntax"));
        assert_eq!(env.payload.field("line"), Some("1"));
        assert!(env.payload.field("column").is_some());
        assert!(!env.payload.field("details").unwrap_or_default().is_empty());
    }

    #[test]
    fn truncated_json_is_classified_as_eof() {
        let env = expect_rejected(decode(&text(r#"{"type":"x""#), NOW));
        assert_eq!(env.payload.field("class"), Some("eof"));
    }

    #[test]
    fn wrong_field_type_is_classified_as_data() {
        let env = expect_rejected(decode(&text(r#"{"type":5}"#), NOW));
        assert_eq!(env.payload.field("class"), Some("data"));
    }

    #[test]
    fn non_object_json_is_rejected() {
        let env = expect_rejected(decode(&text("[1,2,3]"), NOW));
        assert_eq!(env.kind, Kind::ParseError);
        let env = expect_rejected(decode(&text(""), NOW));
        assert_eq!(env.kind, Kind::ParseError);
    }

    #[test]
    fn binary_frame_is_unsupported() {
        let env = expect_rejected(decode(&Frame::Binary(vec![0, 1, 2]), NOW));
        assert_eq!(env.kind, Kind::Unsupported);
        assert_eq!(env.payload, Payload::text(UNSUPPORTED_FRAME_TEXT));
        assert_eq!(env.sent_at, Some(NOW));
    }

    #[test]
    fn encode_requires_stamp() {
        let env = Envelope::new(Kind::Echo, Payload::text("x"));
        assert_matches!(env.encode(), Err(EnvelopeError::Unstamped(k)) if k == "echo");
    }

    #[test]
    fn encode_uses_wire_names() {
        let mut env = Envelope::new(Kind::Chat, Payload::fields([("data", "hi")])).with_audience("room1");
        env.stamp(NOW);
        let json: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["data"]["data"], "hi");
        assert_eq!(json["timestamp"], NOW);
        assert_eq!(json["room"], "room1");
    }

    #[test]
    fn encode_omits_room_without_audience() {
        let mut env = Envelope::new(Kind::Broadcast, Payload::text("x"));
        env.stamp(NOW);
        let json: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert!(json.get("room").is_none());
    }

    #[test]
    fn rejection_kinds_use_original_wire_names() {
        assert_eq!(Kind::ParseError.as_str(), "json_error");
        assert_eq!(Kind::Unsupported.as_str(), "error");
        assert_eq!(Kind::from("json_error".to_owned()), Kind::ParseError);
        assert!(Kind::ParseError.is_rejection());
        assert!(Kind::Unsupported.is_rejection());
        assert!(!Kind::Chat.is_rejection());
    }

    #[test]
    fn retag_keeps_payload_and_drops_timestamp() {
        let inbound = expect_message(decode(
            &text(r#"{"type":"test","data":{"k":"v"},"timestamp":5,"room":"spoofed"}"#),
            NOW,
        ));
        let out = inbound.retag(Kind::Chat, Some("room1"));
        assert_eq!(out.kind, Kind::Chat);
        assert_eq!(out.payload.field("k"), Some("v"));
        assert_eq!(out.sent_at, None);
        assert_eq!(out.audience.as_deref(), Some("room1"));
    }

    #[test]
    fn unknown_kind_round_trips_verbatim() {
        let mut env = expect_message(decode(&text(r#"{"type":"custom.kind","data":null}"#), NOW));
        env.stamp(NOW);
        let json: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "custom.kind");
        assert!(json["data"].is_null());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_is_total_on_text(raw in ".*") {
                match decode(&Frame::Text(raw.clone()), NOW) {
                    Inbound::Message(env) => prop_assert!(env.sent_at.is_some()),
                    Inbound::Rejected(env) => {
                        prop_assert_eq!(env.kind, Kind::ParseError);
                        prop_assert_eq!(env.payload.field("raw_data"), Some(raw.as_str()));
                    }
                }
            }

            #[test]
            fn decode_is_total_on_binary(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
                let inbound = decode(&Frame::Binary(bytes), NOW);
                prop_assert!(matches!(inbound, Inbound::Rejected(ref env) if env.kind == Kind::Unsupported));
            }

            #[test]
            fn text_payload_survives_echo(kind in "[a-z_]{0,12}", data in ".*", ts in 1_i64..i64::MAX) {
                let raw = serde_json::to_string(&json!({"type": kind, "data": data, "timestamp": ts})).unwrap();
                let env = expect_message(decode(&Frame::Text(raw), NOW));
                prop_assert_eq!(env.sent_at, Some(ts));
                let mut out = env.retag(Kind::Echo, None);
                out.stamp(NOW);
                let back: Value = serde_json::from_str(&out.encode().unwrap()).unwrap();
                prop_assert_eq!(back["data"].as_str(), Some(data.as_str()));
            }
        }
    }
}
