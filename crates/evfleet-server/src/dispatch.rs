//! Dispatch table for station calls

use crate::relay::RelayEvent;
use evfleet_types::v16j::{BootNotificationResponse, HeartbeatResponse};
use evfleet_types::{
    empty_payload, Action, CallResultFrame, DateTime, Frame, ProtocolResult, Utc,
    DEFAULT_HEARTBEAT_INTERVAL_SECS,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Response payload for `action`. Never fails: unknown actions get `{}`.
pub fn process_call(action: &Action, _payload: &Value, now: DateTime<Utc>) -> Value {
    match action {
        Action::BootNotification => to_payload(&BootNotificationResponse::accepted(
            now,
            DEFAULT_HEARTBEAT_INTERVAL_SECS,
        )),
        Action::Heartbeat => to_payload(&HeartbeatResponse::at(now)),
        Action::StatusNotification => empty_payload(),
        Action::Unknown(name) => {
            warn!("Unknown action: {}", name);
            empty_payload()
        }
    }
}

fn to_payload<T: serde::Serialize>(response: &T) -> Value {
    serde_json::to_value(response).unwrap_or_else(|_| empty_payload())
}

/// Result of handling one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A call was answered
    Reply {
        action: Action,
        reply: CallResultFrame,
        relay: Option<RelayEvent>,
    },
    /// Not a call; nothing to answer
    Ignored,
}

/// Handle one text frame from `station_id`.
///
/// Calls produce a result with the same correlation id plus the event to
/// relay. Results from the station are ignored. Parse failures are returned
/// so the caller can log them; they never end the session.
pub fn handle_text(station_id: &str, text: &str, now: DateTime<Utc>) -> ProtocolResult<Dispatched> {
    match Frame::parse(text)? {
        Frame::Call(call) => {
            debug!("[{}] Received {}: {}", station_id, call.action, call.payload);
            let response = process_call(&call.action, &call.payload, now);
            let relay = RelayEvent::from_call(station_id, &call.action, &call.payload);
            Ok(Dispatched::Reply {
                reply: CallResultFrame {
                    unique_id: call.unique_id,
                    payload: response,
                },
                action: call.action,
                relay,
            })
        }
        Frame::CallResult(result) => {
            debug!("[{}] Ignoring result {}", station_id, result.unique_id);
            Ok(Dispatched::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(
            process_call(&Action::BootNotification, &json!({}), now()),
            json!({"status": "Accepted", "currentTime": "2024-05-06T07:08:09Z", "interval": 60})
        );
        assert_eq!(
            process_call(&Action::Heartbeat, &json!({}), now()),
            json!({"currentTime": "2024-05-06T07:08:09Z"})
        );
        assert_eq!(
            process_call(&Action::StatusNotification, &json!({"status": "Charging"}), now()),
            json!({})
        );
        assert_eq!(
            process_call(&Action::Unknown("Authorize".to_string()), &json!({}), now()),
            json!({})
        );
    }

    #[test]
    fn test_reply_keeps_correlation_id() {
        let text = r#"[2,"abc-123","BootNotification",{"chargePointVendor":"V","chargePointModel":"M"}]"#;
        match handle_text("EVC_1", text, now()).unwrap() {
            Dispatched::Reply {
                action,
                reply,
                relay,
            } => {
                assert_eq!(action, Action::BootNotification);
                assert_eq!(reply.unique_id, "abc-123");
                assert_eq!(reply.payload["interval"], json!(60));
                let relay = relay.unwrap();
                assert_eq!(relay.endpoint(), "/bootnotification");
                assert_eq!(relay.station_id(), "EVC_1");
            }
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_answered_but_not_relayed() {
        let text = r#"[2,"x1","DataTransfer"]"#;
        match handle_text("EVC_1", text, now()).unwrap() {
            Dispatched::Reply { reply, relay, .. } => {
                assert_eq!(reply.payload, json!({}));
                assert!(relay.is_none());
            }
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_results_and_bad_frames() {
        assert_eq!(
            handle_text("EVC_1", r#"[3,"x1",{}]"#, now()).unwrap(),
            Dispatched::Ignored
        );
        assert!(handle_text("EVC_1", r#"[2,"x1"]"#, now())
            .unwrap_err()
            .is_malformed_frame());
        assert!(handle_text("EVC_1", r#"[4,"x1","Heartbeat",{}]"#, now())
            .unwrap_err()
            .is_malformed_frame());
    }
}
