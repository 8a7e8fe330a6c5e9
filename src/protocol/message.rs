//! Protocol messages for puppetry streaming.
//!
//! Every payload is an [`Envelope`] `{"pump": <name>, "data": <value>}`.
//! Application data is dispatched through the tagged [`Command`] union; the
//! handshake additionally emits [`ControlRequest`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{PuppetryError, Result};

/// Per-joint update record as sent on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointUpdate {
    /// Position `[x, y, z]`
    #[serde(rename = "p", alias = "pos", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f32; 3]>,
    /// Canonical quaternion imaginary part `[x, y, z]`
    #[serde(
        rename = "r",
        alias = "rot",
        alias = "local_rot",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rotation: Option<[f32; 3]>,
}

impl JointUpdate {
    /// Whether neither field is present.
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.rotation.is_none()
    }
}

/// Joint name to update record, ordered for stable output.
pub type JointUpdates = BTreeMap<String, JointUpdate>;

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Channel name
    pub pump: String,
    /// Message body
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(pump: impl Into<String>, data: Value) -> Self {
        Self {
            pump: pump.into(),
            data,
        }
    }

    /// Interpret a decoded payload as an envelope.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| PuppetryError::Protocol(format!("invalid envelope: {e}")))
    }

    /// Build the generic value form.
    pub fn to_value(&self) -> Value {
        json!({ "pump": self.pump, "data": self.data })
    }

    /// The command name declared in `data.command`, if any.
    pub fn command_name(&self) -> Option<&str> {
        self.data.get("command").and_then(Value::as_str)
    }

    /// The channel a first message establishes: its declared command pump,
    /// falling back to the envelope's own pump.
    pub fn declared_channel(&self) -> Option<&str> {
        self.command_name()
            .filter(|name| !name.is_empty())
            .or(Some(self.pump.as_str()))
            .filter(|name| !name.is_empty())
    }

    /// Decode the body into a [`Command`].
    pub fn command(&self) -> Command {
        Command::from_data(&self.data)
    }

    /// Request id of a reply to a control request, if present.
    pub fn reqid(&self) -> Option<i64> {
        self.data.get("reqid").and_then(Value::as_i64)
    }
}

/// Known application commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Joint transform update
    Set(JointUpdates),
    /// Legacy synonym of `Set`
    Move(JointUpdates),
    /// Request for the full skeleton description
    SendSkeleton,
    /// Anything else; logged and ignored
    Unrecognized(Option<String>),
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &str {
        match self {
            Self::Set(_) => "set",
            Self::Move(_) => "move",
            Self::SendSkeleton => "send_skeleton",
            Self::Unrecognized(Some(name)) => name,
            Self::Unrecognized(None) => "<none>",
        }
    }

    /// Parse a message body.
    pub fn from_data(data: &Value) -> Self {
        let Some(name) = data.get("command").and_then(Value::as_str) else {
            return Self::Unrecognized(None);
        };

        match name {
            "set" => Self::Set(joints_of(data)),
            "move" => Self::Move(joints_of(data)),
            "send_skeleton" => Self::SendSkeleton,
            other => Self::Unrecognized(Some(other.to_string())),
        }
    }

    /// Build the `set` body for a joint update map.
    pub fn set_body(updates: &JointUpdates) -> Value {
        json!({ "command": "set", "data": { "j": updates } })
    }

    /// Build a `set` body with no payload (completes registration).
    pub fn empty_set_body() -> Value {
        json!({ "command": "set" })
    }
}

/// Extract joints from `data.j`, or from the legacy flattened form where
/// joints sit beside `command`.
fn joints_of(data: &Value) -> JointUpdates {
    let nested = data
        .get("data")
        .and_then(|d| d.get("j"))
        .or_else(|| data.get("j"))
        .and_then(Value::as_object);

    match nested {
        Some(map) => parse_joint_map(map),
        None => match data.as_object() {
            Some(map) => parse_joint_map(map),
            None => JointUpdates::new(),
        },
    }
}

fn parse_joint_map(map: &Map<String, Value>) -> JointUpdates {
    map.iter()
        .filter(|(_, v)| v.is_object())
        .filter_map(|(name, v)| {
            let update: JointUpdate = serde_json::from_value(v.clone()).ok()?;
            (!update.is_empty()).then(|| (name.clone(), update))
        })
        .collect()
}

/// Control operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlOp {
    /// Subscribe a listener
    Listen,
    /// Remove a listener
    StopListen,
}

/// Control request sent during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Operation
    pub op: ControlOp,
    /// Request id, unique per session
    pub reqid: i64,
    /// Pump the listener attaches to
    pub source: String,
    /// Listener identifier
    pub listener: Uuid,
    /// Destination name for delivered events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
}

impl ControlRequest {
    /// Create an unsubscribe request.
    pub fn stop_listen(reqid: i64, source: &str, listener: Uuid) -> Self {
        Self {
            op: ControlOp::StopListen,
            reqid,
            source: source.to_string(),
            listener,
            dest: None,
        }
    }

    /// Create a subscribe request.
    pub fn listen(reqid: i64, source: &str, listener: Uuid, dest: &str) -> Self {
        Self {
            op: ControlOp::Listen,
            reqid,
            source: source.to_string(),
            listener,
            dest: Some(dest.to_string()),
        }
    }

    /// Generic value form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let env = Envelope::new("puppetry", json!({"command": "send_skeleton"}));
        let parsed = Envelope::from_value(env.to_value()).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(parsed.command(), Command::SendSkeleton);
    }

    #[test]
    fn test_envelope_requires_pump() {
        let err = Envelope::from_value(json!({"data": {}})).unwrap_err();
        assert!(matches!(err, PuppetryError::Protocol(_)));
    }

    #[test]
    fn test_declared_channel_prefers_command() {
        let env = Envelope::new("reply-pump", json!({"command": "puppetry.command"}));
        assert_eq!(env.declared_channel(), Some("puppetry.command"));

        let env = Envelope::new("reply-pump", json!({"features": {}}));
        assert_eq!(env.declared_channel(), Some("reply-pump"));

        let env = Envelope::new("reply-pump", json!({"command": ""}));
        assert_eq!(env.declared_channel(), Some("reply-pump"));

        let env = Envelope::new("", Value::Null);
        assert_eq!(env.declared_channel(), None);
    }

    #[test]
    fn test_parse_set() {
        let data = json!({
            "command": "set",
            "data": {"j": {"mHead": {"r": [0.1, 0.2, 0.3]}, "mPelvis": {"p": [0.0, 1.0, 0.0]}}}
        });
        let Command::Set(joints) = Command::from_data(&data) else {
            panic!("expected set");
        };
        assert_eq!(joints.len(), 2);
        assert_eq!(joints["mHead"].rotation, Some([0.1, 0.2, 0.3]));
        assert_eq!(joints["mPelvis"].position, Some([0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_parse_legacy_move() {
        let data = json!({
            "command": "move",
            "reply": null,
            "mNeck": {"local_rot": [0.0, 0.0, 0.5]}
        });
        let Command::Move(joints) = Command::from_data(&data) else {
            panic!("expected move");
        };
        assert_eq!(joints.len(), 1);
        assert_eq!(joints["mNeck"].rotation, Some([0.0, 0.0, 0.5]));
    }

    #[test]
    fn test_unrecognized_commands() {
        assert_eq!(
            Command::from_data(&json!({"command": "dance"})),
            Command::Unrecognized(Some("dance".into()))
        );
        assert_eq!(
            Command::from_data(&json!({"reqid": 3})),
            Command::Unrecognized(None)
        );
        assert_eq!(Command::Unrecognized(None).name(), "<none>");
    }

    #[test]
    fn test_set_body_shape() {
        let mut updates = JointUpdates::new();
        updates.insert(
            "mHead".into(),
            JointUpdate {
                position: None,
                rotation: Some([0.0, 0.5, 0.0]),
            },
        );
        let body = Command::set_body(&updates);
        assert_eq!(body["command"], "set");
        assert_eq!(body["data"]["j"]["mHead"]["r"][1], 0.5);
        assert!(body["data"]["j"]["mHead"].get("p").is_none());
    }

    #[test]
    fn test_control_request_serialization() {
        let id = Uuid::nil();
        let stop = ControlRequest::stop_listen(1, "puppetry", id).to_value();
        assert_eq!(stop["op"], "stoplisten");
        assert!(stop.get("dest").is_none());

        let listen = ControlRequest::listen(2, "puppetry", id, "puppetry.controller").to_value();
        assert_eq!(listen["op"], "listen");
        assert_eq!(listen["reqid"], 2);
        assert_eq!(listen["dest"], "puppetry.controller");
        assert_eq!(listen["listener"], id.to_string());
    }
}
