//! Wire format between the orchestrator and pool workers
//!
//! The shared context travels once per call inside a checksummed
//! `ContextEnvelope`; task arguments travel on their own as small JSON
//! payloads so the large shared inputs are never re-sent per task.

use crate::error::TaskFailure;
use crate::task::{SharedContext, TaskArgument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Envelope format version
pub const PROTOCOL_VERSION: u32 = 1;

/// A serialized shared context with integrity check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEnvelope {
    /// Unique envelope ID
    pub id: String,
    /// Call the context belongs to
    pub call_id: String,
    /// When the orchestrator sealed it
    pub pushed_at: DateTime<Utc>,
    /// SHA256 of `body`
    pub checksum: String,
    /// JSON-encoded `SharedContext`
    pub body: String,
    pub version: u32,
}

impl ContextEnvelope {
    /// Serialize a context into a new envelope
    pub fn seal(context: &SharedContext) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(context)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            call_id: context.call_id.clone(),
            pushed_at: Utc::now(),
            checksum: checksum(&body),
            body,
            version: PROTOCOL_VERSION,
        })
    }

    /// Verify and decode the context
    pub fn open(&self) -> Result<SharedContext, TaskFailure> {
        if self.version != PROTOCOL_VERSION {
            return Err(TaskFailure::Decode(format!(
                "unsupported envelope version {}",
                self.version
            )));
        }
        if checksum(&self.body) != self.checksum {
            return Err(TaskFailure::Decode(format!(
                "checksum mismatch for context of call {}",
                self.call_id
            )));
        }
        let context: SharedContext =
            serde_json::from_str(&self.body).map_err(|e| TaskFailure::Decode(e.to_string()))?;
        if context.call_id != self.call_id {
            return Err(TaskFailure::Decode(format!(
                "envelope for call {} holds context of call {}",
                self.call_id, context.call_id
            )));
        }
        Ok(context)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TaskFailure> {
        serde_json::from_slice(data).map_err(|e| TaskFailure::Decode(e.to_string()))
    }
}

impl TaskArgument {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TaskFailure> {
        serde_json::from_slice(data).map_err(|e| TaskFailure::Decode(e.to_string()))
    }
}

fn checksum(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}
