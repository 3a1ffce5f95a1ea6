//! JSON hub protocol framing
//!
//! Every message is a JSON object terminated by the record separator
//! `0x1E`. The client opens with `{"protocol":"json","version":1}`; the hub
//! answers `{}` or `{"error": "..."}`. After that each record carries a
//! numeric `type`:
//!
//! | type | meaning    | fields                                   |
//! |------|------------|------------------------------------------|
//! | 1    | invocation | `target`, `arguments`, `invocationId?`   |
//! | 6    | ping       |                                          |
//! | 7    | close      | `error?`                                 |

use serde_json::{json, Value};

use super::HubError;

/// Record terminator.
pub const RECORD_SEPARATOR: u8 = 0x1E;

pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u64 = 1;

const TYPE_INVOCATION: u64 = 1;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

/// A decoded hub record.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        target: String,
        arguments: Vec<Value>,
        invocation_id: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
    },
    /// Known-framed record of a type this client does not act on
    Other(u64),
}

impl HubMessage {
    pub fn invocation(target: impl Into<String>, payload: Value) -> Self {
        Self::Invocation {
            target: target.into(),
            arguments: vec![payload],
            invocation_id: None,
        }
    }

    /// Parse one record (without its separator).
    pub fn parse(record: &[u8]) -> Result<Self, HubError> {
        let value: Value = serde_json::from_slice(record)?;
        let msg_type = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| HubError::Protocol("record has no numeric 'type'".to_string()))?;

        match msg_type {
            TYPE_INVOCATION => {
                let target = value
                    .get("target")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HubError::Protocol("invocation without 'target'".to_string()))?
                    .to_string();
                let arguments = match value.get("arguments") {
                    Some(Value::Array(args)) => args.clone(),
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(HubError::Protocol(format!(
                            "invocation '{target}' has non-array 'arguments'"
                        )))
                    }
                };
                let invocation_id = value
                    .get("invocationId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(Self::Invocation {
                    target,
                    arguments,
                    invocation_id,
                })
            }
            TYPE_PING => Ok(Self::Ping),
            TYPE_CLOSE => Ok(Self::Close {
                error: value.get("error").and_then(Value::as_str).map(str::to_string),
            }),
            other => Ok(Self::Other(other)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Invocation {
                target,
                arguments,
                invocation_id,
            } => {
                let mut v = json!({ "type": TYPE_INVOCATION, "target": target, "arguments": arguments });
                if let Some(id) = invocation_id {
                    v["invocationId"] = json!(id);
                }
                v
            }
            Self::Ping => json!({ "type": TYPE_PING }),
            Self::Close { error: Some(e) } => json!({ "type": TYPE_CLOSE, "error": e }),
            Self::Close { error: None } => json!({ "type": TYPE_CLOSE }),
            Self::Other(t) => json!({ "type": t }),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_record(&self.to_value())
    }
}

/// Serialize a JSON value and append the record separator.
pub fn encode_record(value: &Value) -> Vec<u8> {
    let mut bytes = value.to_string().into_bytes();
    bytes.push(RECORD_SEPARATOR);
    bytes
}

pub fn handshake_request() -> Vec<u8> {
    encode_record(&json!({ "protocol": PROTOCOL_NAME, "version": PROTOCOL_VERSION }))
}

/// Parse the hub's handshake answer. `{}` accepts; `{"error": ..}` rejects.
pub fn parse_handshake_response(record: &[u8]) -> Result<(), HubError> {
    let value: Value = serde_json::from_slice(record)?;
    match value.get("error") {
        Some(Value::Null) | None => Ok(()),
        Some(err) => Err(HubError::Handshake(
            err.as_str().map_or_else(|| err.to_string(), str::to_string),
        )),
    }
}

/// Parse a client handshake request, returning the protocol name and
/// version. Used by hub implementations.
pub fn parse_handshake_request(record: &[u8]) -> Result<(String, u64), HubError> {
    let value: Value = serde_json::from_slice(record)?;
    let protocol = value
        .get("protocol")
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::Handshake("missing 'protocol'".to_string()))?;
    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| HubError::Handshake("missing 'version'".to_string()))?;
    Ok((protocol.to_string(), version))
}

// ============================================================================
// Frame Decoder
// ============================================================================

/// Splits a byte stream into separator-terminated records.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete record, without its separator. Empty records are skipped.
    pub fn next_record(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = self.buf.iter().position(|b| *b == RECORD_SEPARATOR)?;
            let mut record: Vec<u8> = self.buf.drain(..=pos).collect();
            record.pop();
            if !record.iter().all(u8::is_ascii_whitespace) {
                return Some(record);
            }
        }
    }

    /// Bytes buffered without a terminating separator yet.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
