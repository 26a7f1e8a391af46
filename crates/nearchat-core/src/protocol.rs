//! Wire protocol
//!
//! Clients and the router exchange newline-delimited JSON records. Every
//! record is an object carrying an `action` discriminator:
//!
//! | action            | direction      | fields                          |
//! |-------------------|----------------|---------------------------------|
//! | `register`        | client → router | `username`, `lat`, `lon`       |
//! | `register_ack`    | router → client | `message`                      |
//! | `update_location` | client → router | `username`, `lat`, `lon`       |
//! | `refresh`         | client → router | `username`                     |
//! | `refresh_ack`     | router → client | `visible_users`                |
//! | `message`         | both            | `sender`, `receiver`?, `text`  |
//!
//! Unknown actions decode to `None` so callers can ignore them; malformed
//! JSON is reported as a `ProtocolError` which callers drop silently.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::types::Coordinates;

// ----------------------------------------------------------------------------
// Client Requests
// ----------------------------------------------------------------------------

/// Records a client may send to the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    Register {
        username: String,
        #[serde(deserialize_with = "lenient_f64")]
        lat: f64,
        #[serde(deserialize_with = "lenient_f64")]
        lon: f64,
    },
    UpdateLocation {
        username: String,
        #[serde(deserialize_with = "lenient_f64")]
        lat: f64,
        #[serde(deserialize_with = "lenient_f64")]
        lon: f64,
    },
    Refresh {
        username: String,
    },
    Message {
        sender: String,
        receiver: String,
        text: String,
    },
}

impl ClientRequest {
    /// Actions the router understands; anything else is ignored
    pub const ACTIONS: [&'static str; 4] = ["register", "update_location", "refresh", "message"];

    /// The wire name of this request's action
    pub fn action(&self) -> &'static str {
        match self {
            ClientRequest::Register { .. } => "register",
            ClientRequest::UpdateLocation { .. } => "update_location",
            ClientRequest::Refresh { .. } => "refresh",
            ClientRequest::Message { .. } => "message",
        }
    }

    /// Coordinates carried by `register` and `update_location`
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            ClientRequest::Register { lat, lon, .. }
            | ClientRequest::UpdateLocation { lat, lon, .. } => Some(Coordinates {
                lat: *lat,
                lon: *lon,
            }),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let username = match self {
            ClientRequest::Register { username, .. }
            | ClientRequest::UpdateLocation { username, .. }
            | ClientRequest::Refresh { username } => username,
            ClientRequest::Message { sender, .. } => sender,
        };
        if username.trim().is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "username",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(coords) = self.coordinates() {
            if !coords.lat.is_finite() || !coords.lon.is_finite() {
                return Err(ProtocolError::InvalidField {
                    field: "lat/lon",
                    reason: format!("non-finite coordinates {}", coords),
                });
            }
        }
        Ok(())
    }
}

/// Accepts `12.5` as well as `"12.5"`, the way form-fed clients send numbers
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(value) => Ok(value),
        NumberOrText::Text(text) => text.trim().parse::<f64>().map_err(de::Error::custom),
    }
}

// ----------------------------------------------------------------------------
// Router Messages
// ----------------------------------------------------------------------------

/// One entry of a `refresh_ack` visibility list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleUser {
    pub username: String,
    pub distance: u64,
}

impl VisibleUser {
    /// Distances are reported as whole units, truncated toward zero
    pub fn new(username: impl Into<String>, distance: f64) -> Self {
        Self {
            username: username.into(),
            distance: distance.max(0.0) as u64,
        }
    }
}

/// Records the router sends to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    RegisterAck { message: String },
    RefreshAck { visible_users: Vec<VisibleUser> },
    Message { sender: String, text: String },
}

// ----------------------------------------------------------------------------
// Encoding / Decoding
// ----------------------------------------------------------------------------

/// Serialize any record as one line, newline included
pub fn encode_record<T: Serialize>(record: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Serialize a router message as one wire line
pub fn encode_message(message: &ServerMessage) -> serde_json::Result<String> {
    encode_record(message)
}

/// Decode one inbound line from a client.
///
/// Blank lines and unknown actions yield `Ok(None)`.
pub fn decode_request(line: &str) -> Result<Option<ClientRequest>, ProtocolError> {
    let Some(value) = parse_record(line)? else {
        return Ok(None);
    };
    let action = action_of(&value)?;
    if !ClientRequest::ACTIONS.contains(&action) {
        return Ok(None);
    }
    let request: ClientRequest = serde_json::from_value(value)?;
    request.validate()?;
    Ok(Some(request))
}

/// Decode one line received from the router
pub fn decode_server_message(line: &str) -> Result<Option<ServerMessage>, ProtocolError> {
    let Some(value) = parse_record(line)? else {
        return Ok(None);
    };
    let action = action_of(&value)?;
    if !matches!(action, "register_ack" | "refresh_ack" | "message") {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

fn parse_record(line: &str) -> Result<Option<Value>, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

fn action_of(value: &Value) -> Result<&str, ProtocolError> {
    value
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingAction)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_register() {
        let request =
            decode_request(r#"{"action": "register", "username": "alice", "lat": 1.5, "lon": -2}"#)
                .unwrap()
                .unwrap();
        assert_eq!(
            request,
            ClientRequest::Register {
                username: "alice".to_string(),
                lat: 1.5,
                lon: -2.0,
            }
        );
        assert_eq!(request.action(), "register");
    }

    #[test]
    fn test_decode_accepts_numeric_strings() {
        let request = decode_request(
            r#"{"action": "update_location", "username": "bob", "lat": "10.25", "lon": " 3 "}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(request.coordinates(), Some(Coordinates { lat: 10.25, lon: 3.0 }));
    }

    #[test]
    fn test_decode_rejects_nan_text() {
        let result =
            decode_request(r#"{"action": "register", "username": "bob", "lat": "NaN", "lon": 0}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidField { .. })));
    }

    #[test]
    fn test_decode_message_and_refresh() {
        let message = decode_request(
            r#"{"action":"message","sender":"a","receiver":"b","text":"hi there"}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(message, ClientRequest::Message { ref text, .. } if text == "hi there"));

        let refresh = decode_request(r#"{"action":"refresh","username":"a"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(refresh, ClientRequest::Refresh { username: "a".to_string() });
    }

    #[test]
    fn test_decode_ignores_blank_and_unknown() {
        assert!(decode_request("").unwrap().is_none());
        assert!(decode_request("   \r").unwrap().is_none());
        assert!(decode_request(r#"{"action":"dance","username":"a"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_reports_malformed() {
        assert!(matches!(
            decode_request("{\"action\": \"register\""),
            Err(ProtocolError::MalformedJson(_))
        ));
        assert!(matches!(
            decode_request(r#"{"username":"a"}"#),
            Err(ProtocolError::MissingAction)
        ));
        assert!(matches!(
            decode_request(r#"{"action":"register","username":"a"}"#),
            Err(ProtocolError::MalformedJson(_))
        ));
        assert!(matches!(
            decode_request(r#"{"action":"register","username":"","lat":0,"lon":0}"#),
            Err(ProtocolError::InvalidField { field: "username", .. })
        ));
    }

    #[test]
    fn test_encode_server_messages() {
        let ack = encode_message(&ServerMessage::RegisterAck {
            message: "ok".to_string(),
        })
        .unwrap();
        assert_eq!(ack, "{\"action\":\"register_ack\",\"message\":\"ok\"}\n");

        let refresh = encode_message(&ServerMessage::RefreshAck {
            visible_users: vec![VisibleUser::new("bob", 141.42)],
        })
        .unwrap();
        assert_eq!(
            refresh,
            "{\"action\":\"refresh_ack\",\"visible_users\":[{\"username\":\"bob\",\"distance\":141}]}\n"
        );

        let chat = encode_message(&ServerMessage::Message {
            sender: "alice".to_string(),
            text: "hello".to_string(),
        })
        .unwrap();
        assert_eq!(chat, "{\"action\":\"message\",\"sender\":\"alice\",\"text\":\"hello\"}\n");
    }

    #[test]
    fn test_decode_server_message() {
        let decoded = decode_server_message(r#"{"action":"message","sender":"a","text":"t"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            decoded,
            ServerMessage::Message {
                sender: "a".to_string(),
                text: "t".to_string(),
            }
        );
        assert!(decode_server_message(r#"{"action":"register","username":"a","lat":0,"lon":0}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_visible_user_truncates_distance() {
        assert_eq!(VisibleUser::new("x", 199.99).distance, 199);
        assert_eq!(VisibleUser::new("x", 0.0).distance, 0);
    }
}
