//! Self-describing payload notation.
//!
//! Frame payloads carry a generic value (maps, lists, strings, numbers,
//! booleans, null). The concrete serialization is pluggable:
//!
//! | Notation  | Crate        | Notes                                   |
//! |-----------|--------------|-----------------------------------------|
//! | `Json`    | `serde_json` | Default; `{}` maps, `[]` lists          |
//! | `MsgPack` | `rmp-serde`  | Binary, length-prefixed map format      |
//!
//! The relay never decodes payloads; only the session client does.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PuppetryError, Result};

/// Payload notation selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notation {
    /// JSON text (default)
    #[default]
    Json,
    /// MessagePack with struct-as-map encoding
    MsgPack,
}

impl Notation {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }

    /// Serialize any value to payload bytes.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Json => Ok(serde_json::to_vec(value)?),
            // to_vec_named keeps struct fields as map keys
            Self::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    /// Deserialize payload bytes into a typed value.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Json => Ok(serde_json::from_slice(bytes)?),
            Self::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }

    /// Deserialize payload bytes into a generic value.
    pub fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        self.decode(bytes)
            .map_err(|e| PuppetryError::Notation(format!("{} payload: {e}", self.name())))
    }
}

impl std::fmt::Display for Notation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Notation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" | "mp" => Ok(Self::MsgPack),
            _ => Err(format!("Unknown notation: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_json_encoding_is_text() {
        let bytes = Notation::Json.encode(&json!({"pump": "p"})).unwrap();
        assert_eq!(bytes, br#"{"pump":"p"}"#);
    }

    #[test]
    fn test_msgpack_preserves_structure() {
        let value = json!({
            "pump": "puppetry",
            "data": {"command": "set", "data": {"j": {"mHead": {"r": [0.0, 0.5, 0.0]}}}}
        });
        let bytes = Notation::MsgPack.encode(&value).unwrap();
        let decoded = Notation::MsgPack.decode_value(&bytes).unwrap();
        assert_eq!(decoded["data"]["command"], "set");
        assert_eq!(decoded["data"]["data"]["j"]["mHead"]["r"][1], 0.5);
    }

    #[test]
    fn test_decode_garbage_is_notation_error() {
        let err = Notation::Json.decode_value(b"{not json").unwrap_err();
        assert!(matches!(err, PuppetryError::Notation(_)));
    }

    #[test]
    fn test_from_str() {
        assert_eq!(Notation::from_str("JSON").unwrap(), Notation::Json);
        assert_eq!(Notation::from_str("msgpack").unwrap(), Notation::MsgPack);
        assert!(Notation::from_str("llsd-xml").is_err());
    }

    #[test]
    fn test_default_is_json() {
        assert_eq!(Notation::default(), Notation::Json);
        assert_eq!(Notation::default().to_string(), "json");
    }
}
