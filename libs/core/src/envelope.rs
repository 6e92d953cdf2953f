use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Protocol tag carried in the `what` field of every channel message
pub const MESSAGE_MARKER: &str = "iframe-call-message";

/// Loosely-typed message body: an `action` tag plus free-form fields
pub type Message = Map<String, Value>;

/// Identifier of the logical call a message belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty ids are treated as absent on the wire
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One-shot correlation token linking a sent message to its reply
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stamp(String);

impl Stamp {
    pub fn new(stamp: impl Into<String>) -> Self {
        Self(stamp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Stamp {
    fn from(stamp: &str) -> Self {
        Self::new(stamp)
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the channel produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The host library driving the call
    Module,
    /// The call machine running inside the embedded frame
    Embedded,
    /// Any tag this version does not know about
    #[serde(other)]
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Module => "module",
            Direction::Embedded => "embedded",
            Direction::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire-level channel message
///
/// Metadata fields are typed; everything else (including `action`) lives in
/// the flattened `payload`. Parsing never fails on an object: a metadata
/// value of an unexpected type is left verbatim in the payload under its
/// wire key, so it still round-trips and simply matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "what", skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,

    /// `Unknown` is never written back; the raw tag stays in the payload
    #[serde(skip_serializing_if = "is_unwritten_direction")]
    pub from: Option<Direction>,

    #[serde(rename = "callClientId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    #[serde(rename = "callbackStamp", skip_serializing_if = "Option::is_none")]
    pub callback_stamp: Option<Stamp>,

    /// Session id under its pre-`callClientId` name. Never produced.
    #[serde(rename = "callFrameId", skip_serializing_if = "Option::is_none")]
    pub legacy_frame_id: Option<Value>,

    #[serde(flatten)]
    pub payload: Message,
}

impl Envelope {
    /// Shape a caller-supplied message into an envelope
    ///
    /// Metadata keys already present in the message are lifted into their
    /// typed fields, so a reply that echoes `callbackStamp` keeps it.
    pub fn from_message(mut message: Message) -> Self {
        let marker = take_string(&mut message, "what");
        let from = take_direction(&mut message);
        let session_id = take_string(&mut message, "callClientId").map(SessionId::from);
        let callback_stamp = take_string(&mut message, "callbackStamp").map(Stamp::new);
        let legacy_frame_id = message.remove("callFrameId");

        Self {
            marker,
            from,
            session_id,
            callback_stamp,
            legacy_frame_id,
            payload: message,
        }
    }

    /// Parse an envelope out of arbitrary transport data
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_message(map.clone())),
            other => Err(Error::NotAnObject(json_kind(other))),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Flatten metadata and payload back into a single message map
    pub fn into_message(self) -> Result<Message> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::NotAnObject(json_kind(&other))),
        }
    }

    /// Tag the envelope with the protocol marker
    pub fn set_marker(&mut self) {
        self.payload.remove("what");
        self.marker = Some(MESSAGE_MARKER.to_string());
    }

    pub fn set_from(&mut self, direction: Direction) {
        self.payload.remove("from");
        self.from = Some(direction);
    }

    pub fn set_session(&mut self, session: SessionId) {
        self.payload.remove("callClientId");
        self.session_id = Some(session);
    }

    pub fn set_callback_stamp(&mut self, stamp: Stamp) {
        self.payload.remove("callbackStamp");
        self.callback_stamp = Some(stamp);
    }

    pub fn is_channel_message(&self) -> bool {
        self.marker.as_deref() == Some(MESSAGE_MARKER)
    }

    /// Session id, treating an empty id as absent
    pub fn session(&self) -> Option<&SessionId> {
        self.session_id.as_ref().filter(|id| !id.is_empty())
    }

    /// A session id is present but is not a string
    ///
    /// Such an id can never equal a real one.
    pub fn has_unreadable_session(&self) -> bool {
        self.session_id.is_none() && self.payload.get("callClientId").is_some_and(is_truthy)
    }

    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(Value::as_str)
    }

    pub fn has_action(&self) -> bool {
        self.payload.get("action").is_some_and(is_truthy)
    }

    pub fn has_legacy_frame_id(&self) -> bool {
        self.legacy_frame_id.as_ref().is_some_and(is_truthy)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Drop the protocol fields a listener has no use for
    pub fn stripped(mut self) -> Self {
        self.marker = None;
        self.from = None;
        self.callback_stamp = None;
        for key in ["what", "from", "callbackStamp"] {
            self.payload.remove(key);
        }
        self
    }
}

fn is_unwritten_direction(from: &Option<Direction>) -> bool {
    matches!(from, None | Some(Direction::Unknown))
}

/// Lift `key` out of the map only when it holds a string
fn take_string(message: &mut Message, key: &str) -> Option<String> {
    if !matches!(message.get(key), Some(Value::String(_))) {
        return None;
    }
    match message.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Falsy tags count as absent; anything truthy but unrecognised is `Unknown`
/// and keeps its raw value in the map
fn take_direction(message: &mut Message) -> Option<Direction> {
    let direction = match message.get("from") {
        Some(value) if is_truthy(value) => match value.as_str() {
            Some("module") => Direction::Module,
            Some("embedded") => Direction::Embedded,
            _ => return Some(Direction::Unknown),
        },
        _ => return None,
    };
    message.remove("from");
    Some(direction)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
