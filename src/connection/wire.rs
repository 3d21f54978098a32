//! Engine.IO v4 / Socket.IO text frame codec.
//!
//! Only the default namespace and text frames are handled. A frame is an
//! Engine.IO packet type digit followed by its data; Engine.IO `message`
//! packets carry a Socket.IO packet, itself a type digit, an optional
//! namespace, an optional ack id and a JSON body:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   open
//! 2                                                       ping
//! 40                                                      connect (default namespace)
//! 42["taskAssigned",{"message":"..."}]                    event
//! 4212["join","user-1"]                                   event with ack id 12
//! ```

use crate::error::{RealtimeError, Result};
use serde::Deserialize;
use serde_json::Value;

/// Handshake data sent by the server in the Engine.IO `open` packet.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Engine.IO handshake.
    Open(OpenInfo),
    /// Engine.IO close.
    Close,
    Ping,
    Pong,
    /// Engine.IO noop, or a packet for a namespace we do not use.
    Noop,
    /// Socket.IO namespace connect (ack from server when received).
    Connect,
    /// Socket.IO namespace disconnect.
    Disconnect,
    /// Server rejected the namespace connection.
    ConnectError(String),
    /// Named event with its arguments.
    Event { name: String, args: Vec<Value> },
    /// Acknowledgement of an emitted event.
    Ack { id: u64, args: Vec<Value> },
}

impl Frame {
    /// Build an event frame with a single payload argument.
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Frame::Event {
            name: name.into(),
            args: vec![payload],
        }
    }

    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Frame> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::Protocol("empty frame".into()))?;
        let rest = chars.as_str();

        match kind {
            '0' => {
                let info = if rest.is_empty() {
                    OpenInfo::default()
                } else {
                    serde_json::from_str(rest)?
                };
                Ok(Frame::Open(info))
            }
            '1' => Ok(Frame::Close),
            '2' => Ok(Frame::Ping),
            '3' => Ok(Frame::Pong),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Frame::Noop),
            other => Err(RealtimeError::Protocol(format!(
                "unknown engine packet type: {}",
                other
            ))),
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> String {
        match self {
            Frame::Open(info) => format!(
                "0{}",
                serde_json::json!({
                    "sid": info.sid,
                    "pingInterval": info.ping_interval,
                    "pingTimeout": info.ping_timeout,
                })
            ),
            Frame::Close => "1".to_string(),
            Frame::Ping => "2".to_string(),
            Frame::Pong => "3".to_string(),
            Frame::Noop => "6".to_string(),
            Frame::Connect => "40".to_string(),
            Frame::Disconnect => "41".to_string(),
            Frame::ConnectError(message) => {
                format!("44{}", serde_json::json!({ "message": message }))
            }
            Frame::Event { name, args } => {
                let mut body = Vec::with_capacity(args.len() + 1);
                body.push(Value::String(name.clone()));
                body.extend(args.iter().cloned());
                format!("42{}", Value::Array(body))
            }
            Frame::Ack { id, args } => format!("43{}{}", id, Value::Array(args.clone())),
        }
    }
}

fn decode_socket_packet(data: &str) -> Result<Frame> {
    let mut chars = data.chars();
    let kind = chars
        .next()
        .ok_or_else(|| RealtimeError::Protocol("empty socket packet".into()))?;
    let mut rest = chars.as_str();

    if rest.starts_with('/') {
        let (namespace, tail) = match rest.find(',') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        if namespace != "/" {
            return Ok(Frame::Noop);
        }
        rest = tail;
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        rest[..digits].parse::<u64>().ok()
    } else {
        None
    };
    let body = &rest[digits..];

    match kind {
        '0' => Ok(Frame::Connect),
        '1' => Ok(Frame::Disconnect),
        '2' => {
            let mut args = parse_array(body)?;
            if args.is_empty() {
                return Err(RealtimeError::Protocol("event without name".into()));
            }
            match args.remove(0) {
                Value::String(name) => Ok(Frame::Event { name, args }),
                other => Err(RealtimeError::Protocol(format!(
                    "event name is not a string: {}",
                    other
                ))),
            }
        }
        '3' => {
            let id = ack_id.ok_or_else(|| RealtimeError::Protocol("ack without id".into()))?;
            Ok(Frame::Ack {
                id,
                args: parse_array(body)?,
            })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Object(map) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .unwrap_or_else(|| body.to_string());
            Ok(Frame::ConnectError(message))
        }
        '5' | '6' => Err(RealtimeError::Protocol("binary packets are not supported".into())),
        other => Err(RealtimeError::Protocol(format!(
            "unknown socket packet type: {}",
            other
        ))),
    }
}

fn parse_array(body: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(body)? {
        Value::Array(items) => Ok(items),
        other => Err(RealtimeError::Protocol(format!(
            "expected JSON array, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let frame =
            Frame::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#)
                .unwrap();
        assert_eq!(
            frame,
            Frame::Open(OpenInfo {
                sid: "abc".into(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn test_decode_control_frames() {
        assert_eq!(Frame::decode("1").unwrap(), Frame::Close);
        assert_eq!(Frame::decode("2").unwrap(), Frame::Ping);
        assert_eq!(Frame::decode("3").unwrap(), Frame::Pong);
        assert_eq!(Frame::decode("6").unwrap(), Frame::Noop);
        assert_eq!(Frame::decode("40").unwrap(), Frame::Connect);
        assert_eq!(Frame::decode(r#"40{"sid":"xyz"}"#).unwrap(), Frame::Connect);
        assert_eq!(Frame::decode("41").unwrap(), Frame::Disconnect);
    }

    #[test]
    fn test_decode_event() {
        let frame = Frame::decode(r#"42["taskAssigned",{"message":"You were assigned Task X"}]"#)
            .unwrap();
        assert_eq!(
            frame,
            Frame::Event {
                name: "taskAssigned".into(),
                args: vec![json!({"message": "You were assigned Task X"})],
            }
        );
    }

    #[test]
    fn test_decode_event_with_ack_id_and_namespace() {
        let frame = Frame::decode(r#"42/,7["teamAdded",{}]"#).unwrap();
        assert_eq!(
            frame,
            Frame::Event {
                name: "teamAdded".into(),
                args: vec![json!({})],
            }
        );

        let frame = Frame::decode(r#"42/admin,["teamAdded",{}]"#).unwrap();
        assert_eq!(frame, Frame::Noop);
    }

    #[test]
    fn test_decode_connect_error() {
        let frame = Frame::decode(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_eq!(frame, Frame::ConnectError("Not authorized".into()));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Frame::decode("").is_err());
        assert!(Frame::decode("9").is_err());
        assert!(Frame::decode("42{not json").is_err());
        assert!(Frame::decode("42[]").is_err());
        assert!(Frame::decode("42[5]").is_err());
        assert!(Frame::decode(r#"45["bin",{}]"#).is_err());
    }

    #[test]
    fn test_encode_join() {
        let frame = Frame::event("join", json!("user-1"));
        assert_eq!(frame.encode(), r#"42["join","user-1"]"#);
        assert_eq!(Frame::Pong.encode(), "3");
        assert_eq!(Frame::Connect.encode(), "40");
    }
}
