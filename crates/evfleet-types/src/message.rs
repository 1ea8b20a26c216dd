//! Frame model for the JSON array encoding
//!
//! `CALL` is `[2, correlationId, action, payload]` and `CALL_RESULT` is
//! `[3, correlationId, payload]`. Decoding is permissive (a missing `CALL`
//! payload becomes `{}`), encoding always emits the full shape.

use crate::{Action, MessageType, ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Request
    Call(CallFrame),
    /// Successful response
    CallResult(CallResultFrame),
}

impl Frame {
    /// Parse a text frame received from the socket
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::malformed(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Decode an already parsed JSON value
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        let mut elements = match value {
            Value::Array(elements) => elements,
            other => {
                return Err(ProtocolError::malformed(format!(
                    "expected a JSON array, got {}",
                    json_kind(&other)
                )))
            }
        };

        if elements.len() < 3 {
            return Err(ProtocolError::malformed(format!(
                "frame has {} elements, at least 3 required",
                elements.len()
            )));
        }

        let type_code = elements[0]
            .as_u64()
            .ok_or_else(|| ProtocolError::malformed("message type is not an integer"))?;
        let message_type = MessageType::try_from(type_code)?;

        let unique_id = match &elements[1] {
            Value::String(id) => id.clone(),
            _ => return Err(ProtocolError::malformed("correlation id is not a string")),
        };

        match message_type {
            MessageType::Call => {
                let action = match &elements[2] {
                    Value::String(action) => Action::from(action.as_str()),
                    _ => return Err(ProtocolError::malformed("action is not a string")),
                };
                let payload = if elements.len() > 3 {
                    match elements.swap_remove(3) {
                        Value::Null => empty_payload(),
                        payload => payload,
                    }
                } else {
                    empty_payload()
                };
                Ok(Frame::Call(CallFrame {
                    unique_id,
                    action,
                    payload,
                }))
            }
            MessageType::CallResult => Ok(Frame::CallResult(CallResultFrame {
                unique_id,
                payload: elements.swap_remove(2),
            })),
        }
    }

    /// Message type of this frame
    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::Call(_) => MessageType::Call,
            Frame::CallResult(_) => MessageType::CallResult,
        }
    }

    /// Correlation id of this frame
    pub fn unique_id(&self) -> &str {
        match self {
            Frame::Call(call) => &call.unique_id,
            Frame::CallResult(result) => &result.unique_id,
        }
    }

    /// Encode as a JSON array value
    pub fn to_value(&self) -> Value {
        match self {
            Frame::Call(call) => Value::Array(vec![
                Value::from(u8::from(MessageType::Call)),
                Value::String(call.unique_id.clone()),
                Value::String(call.action.as_str().to_string()),
                call.payload.clone(),
            ]),
            Frame::CallResult(result) => Value::Array(vec![
                Value::from(u8::from(MessageType::CallResult)),
                Value::String(result.unique_id.clone()),
                result.payload.clone(),
            ]),
        }
    }

    /// Encode as the text sent over the socket
    pub fn to_text(&self) -> String {
        self.to_value().to_string()
    }
}

impl From<CallFrame> for Frame {
    fn from(call: CallFrame) -> Self {
        Frame::Call(call)
    }
}

impl From<CallResultFrame> for Frame {
    fn from(result: CallResultFrame) -> Self {
        Frame::CallResult(result)
    }
}

/// `CALL` frame
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Correlation identifier
    pub unique_id: String,
    /// Requested action
    pub action: Action,
    /// Request payload
    pub payload: Value,
}

impl CallFrame {
    /// Create a call with a freshly generated correlation id
    pub fn new<T>(action: Action, payload: &T) -> ProtocolResult<Self>
    where
        T: Serialize,
    {
        Ok(CallFrame {
            unique_id: Uuid::new_v4().to_string(),
            action,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Extract the payload as a specific type
    pub fn payload_as<T>(&self) -> ProtocolResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// `CALL_RESULT` frame
#[derive(Debug, Clone, PartialEq)]
pub struct CallResultFrame {
    /// Correlation identifier copied from the answered call
    pub unique_id: String,
    /// Response payload
    pub payload: Value,
}

impl CallResultFrame {
    /// Create a result answering `unique_id`
    pub fn new<T>(unique_id: impl Into<String>, payload: &T) -> ProtocolResult<Self>
    where
        T: Serialize,
    {
        Ok(CallResultFrame {
            unique_id: unique_id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Extract the payload as a specific type
    pub fn payload_as<T>(&self) -> ProtocolResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// `{}`
pub fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_call() {
        let frame =
            Frame::parse(r#"[2,"abc-1","BootNotification",{"chargePointVendor":"V"}]"#).unwrap();

        match frame {
            Frame::Call(call) => {
                assert_eq!(call.unique_id, "abc-1");
                assert_eq!(call.action, Action::BootNotification);
                assert_eq!(call.payload, json!({"chargePointVendor": "V"}));
            }
            _ => panic!("Expected Call frame"),
        }
    }

    #[test]
    fn test_parse_call_without_payload_defaults_to_empty() {
        let frame = Frame::parse(r#"[2,"abc-2","Heartbeat"]"#).unwrap();

        match frame {
            Frame::Call(call) => {
                assert_eq!(call.action, Action::Heartbeat);
                assert_eq!(call.payload, json!({}));
            }
            _ => panic!("Expected Call frame"),
        }
    }

    #[test]
    fn test_parse_call_result() {
        let frame = Frame::parse(r#"[3,"abc-3",{"interval":45}]"#).unwrap();

        assert_eq!(frame.message_type(), MessageType::CallResult);
        assert_eq!(frame.unique_id(), "abc-3");
        match frame {
            Frame::CallResult(result) => assert_eq!(result.payload, json!({"interval": 45})),
            _ => panic!("Expected CallResult frame"),
        }
    }

    #[test]
    fn test_parse_unknown_action_is_not_an_error() {
        let frame = Frame::parse(r#"[2,"abc-4","DataTransfer",{}]"#).unwrap();

        match frame {
            Frame::Call(call) => {
                assert_eq!(call.action, Action::Unknown("DataTransfer".to_string()))
            }
            _ => panic!("Expected Call frame"),
        }
    }

    #[test]
    fn test_parse_rejects_short_frames() {
        for text in [r#"[]"#, r#"[2]"#, r#"[2,"id"]"#, r#"[3,"id"]"#] {
            let err = Frame::parse(text).unwrap_err();
            assert!(err.is_malformed_frame(), "{} should be malformed", text);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_type_codes() {
        for text in [
            r#"[4,"id","GenericError","boom",{}]"#,
            r#"[1,"id","Heartbeat",{}]"#,
            r#"["2","id","Heartbeat",{}]"#,
        ] {
            let err = Frame::parse(text).unwrap_err();
            assert!(err.is_malformed_frame(), "{} should be malformed", text);
        }
    }

    #[test]
    fn test_parse_rejects_non_arrays() {
        assert!(Frame::parse(r#"{"type":2}"#).unwrap_err().is_malformed_frame());
        assert!(Frame::parse("not json").unwrap_err().is_malformed_frame());
        assert!(Frame::parse(r#"[2,17,"Heartbeat",{}]"#)
            .unwrap_err()
            .is_malformed_frame());
    }

    #[test]
    fn test_encode_frames() {
        let result = CallResultFrame::new("id-9", &json!({"currentTime": "now"})).unwrap();
        assert_eq!(
            Frame::from(result).to_text(),
            r#"[3,"id-9",{"currentTime":"now"}]"#
        );

        let call = CallFrame {
            unique_id: "id-10".to_string(),
            action: Action::Heartbeat,
            payload: json!({}),
        };
        assert_eq!(Frame::from(call).to_text(), r#"[2,"id-10","Heartbeat",{}]"#);
    }

    #[test]
    fn test_call_frame_generates_unique_ids() {
        let a = CallFrame::new(Action::Heartbeat, &json!({})).unwrap();
        let b = CallFrame::new(Action::Heartbeat, &json!({})).unwrap();
        assert_ne!(a.unique_id, b.unique_id);
    }
}
