//! Wire Protocol
//!
//! Frames are an 8-byte header (body length, CRC32 of body, both u32 LE)
//! followed by a JSON body. Requests and replies are explicitly tagged.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorClass};
use crate::executor::Outcome;
use crate::operation::{Operation, Row};

/// Acknowledgment text for completed non-search operations
pub const SUCCESS_MESSAGE: &str = "Operation completed successfully";

/// Inbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Operation sent by a client
    Client { operation: Operation },
    /// Operation forwarded by the master after it succeeded there
    Replicate { sequence: u64, operation: Operation },
}

impl Request {
    pub fn operation(&self) -> &Operation {
        match self {
            Request::Client { operation } | Request::Replicate { operation, .. } => operation,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Client { .. } => "Client",
            Request::Replicate { .. } => "Replicate",
        }
    }
}

/// Reply to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// Non-search operation completed
    Ok { message: String },
    /// Search result
    Rows { rows: Vec<Row> },
    /// Operation failed
    Error { class: ErrorClass, message: String },
}

impl Reply {
    pub fn failure(error: &Error) -> Self {
        Reply::Error {
            class: error.class(),
            message: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

impl From<Outcome> for Reply {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => Reply::Ok {
                message: SUCCESS_MESSAGE.to_string(),
            },
            Outcome::Rows(rows) => Reply::Rows { rows },
        }
    }
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Message length
    pub length: u32,
    /// Message checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Create a new frame header
    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationKind, Value};

    #[test]
    fn test_request_envelope_shape() {
        let request = Request::Replicate {
            sequence: 7,
            operation: Operation::new(OperationKind::Delete)
                .with_database("d")
                .with_table("t")
                .with_condition([("id", 1)]),
        };
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "replicate");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["operation"]["type"], "DELETE");
        assert_eq!(json["operation"]["condition"]["id"], 1);
        assert!(json["operation"].get("data").is_none());
    }

    #[test]
    fn test_reply_envelopes() {
        let ok: Reply = Outcome::Completed.into();
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"status": "ok", "message": SUCCESS_MESSAGE})
        );

        let row: Row = [("id".to_string(), Value::Int(1))].into_iter().collect();
        let rows: Reply = Outcome::Rows(vec![row]).into();
        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            serde_json::json!({"status": "rows", "rows": [{"id": 1}]})
        );

        let err = Reply::failure(&Error::Authority("DROP_DB is only permitted on the master".into()));
        assert!(err.is_error());
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "status": "error",
                "class": "authority",
                "message": "Not permitted: DROP_DB is only permitted on the master"
            })
        );
    }

    #[test]
    fn test_frame_header() {
        let data = b"test message data";
        let header = FrameHeader::new(data);
        let bytes = header.to_bytes();
        let restored = FrameHeader::from_bytes(&bytes);

        assert_eq!(header.length, restored.length);
        assert_eq!(header.checksum, restored.checksum);
    }
}
