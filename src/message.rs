//! Commands sent by clients, events sent back, and their JSON encoding
//!
//! Every frame is a JSON object tagged by its `type` field. Unknown tags and
//! invalid JSON are rejected at decode time, so dispatch only ever sees the
//! four inbound shapes.

use crate::errors::{BrokerError, BrokerResult};

use serde::{Deserialize, Serialize};

/// Inbound command from a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Add objects to the pool; ids already live are skipped
    Queue {
        #[serde(default)]
        group: String,
        #[serde(default)]
        objects: Vec<String>,
    },
    /// Hand claimed objects back to the queue
    Requeue {
        #[serde(default)]
        objects: Vec<String>,
    },
    /// Retire claimed objects
    Release {
        #[serde(default)]
        objects: Vec<String>,
    },
    /// Set the next watermark (marker only)
    Mark { size: usize },
}

/// Outbound event for a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// Objects now claimed by the session
    Claim { objects: Vec<String> },
    /// The session became marker; carries the pool size at election
    Load { size: usize },
}

/// Connection parameters taken from the `/ws` query string, selecting the
/// pool and claim budget
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Decode one inbound frame
///
/// # Examples
///
/// ```
/// use esox_workbroker::{decode_command, Command};
///
/// let command = decode_command(br#"{"type":"mark","size":12}"#).unwrap();
/// assert_eq!(command, Command::Mark { size: 12 });
///
/// assert!(decode_command(br#"{"type":"shutdown"}"#).is_err());
/// ```
pub fn decode_command(frame: &[u8]) -> BrokerResult<Command> {
    serde_json::from_slice(frame).map_err(|e| BrokerError::MalformedCommand(e.to_string()))
}

/// Encode one outbound event as a JSON text frame
pub fn encode_event(event: &Event) -> BrokerResult<String> {
    serde_json::to_string(event).map_err(|e| BrokerError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_every_command() {
        assert_eq!(
            decode_command(br#"{"type":"queue","group":"g1","objects":["a","b"]}"#).unwrap(),
            Command::Queue {
                group: "g1".to_string(),
                objects: vec!["a".to_string(), "b".to_string()],
            }
        );
        assert_eq!(
            decode_command(br#"{"type":"requeue","objects":["a"]}"#).unwrap(),
            Command::Requeue {
                objects: vec!["a".to_string()],
            }
        );
        assert_eq!(
            decode_command(br#"{"objects":["a"],"type":"release"}"#).unwrap(),
            Command::Release {
                objects: vec!["a".to_string()],
            }
        );
        assert_eq!(
            decode_command(br#"{"type":"mark","size":0}"#).unwrap(),
            Command::Mark { size: 0 }
        );
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        assert_eq!(
            decode_command(br#"{"type":"queue"}"#).unwrap(),
            Command::Queue {
                group: String::new(),
                objects: Vec::new(),
            }
        );
    }

    #[test]
    fn test_malformed_frames() {
        let frames: [&[u8]; 4] = [
            br#"{"type":"claim","objects":[]}"#,
            br#"{"objects":[]}"#,
            br#"{"type":"mark","size":-1}"#,
            b"not json",
        ];
        for frame in frames {
            assert!(matches!(
                decode_command(frame),
                Err(BrokerError::MalformedCommand(_))
            ));
        }
    }

    #[test]
    fn test_encode_events() {
        let claim = Event::Claim {
            objects: vec!["x1".to_string()],
        };
        assert_eq!(
            encode_event(&claim).unwrap(),
            r#"{"type":"claim","objects":["x1"]}"#
        );
        assert_eq!(
            encode_event(&Event::Load { size: 3 }).unwrap(),
            r#"{"type":"load","size":3}"#
        );
    }
}
