//! Digest reply protocol
//!
//! Every inbound data message is answered with `{"sha": "<hex>"}`, the SHA-256
//! of the exact bytes received, letting the peer confirm byte-exact receipt.

use super::{WsError, WsResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reply sent for each inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestReply {
    pub sha: String,
}

impl DigestReply {
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            sha: digest_hex(payload),
        }
    }

    pub fn to_json(&self) -> String {
        format!("{{\"sha\":\"{}\"}}", self.sha)
    }
}

/// Lowercase hex SHA-256 of `payload`
pub fn digest_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

/// Reject payloads above the configured ceiling
pub fn check_size(size: usize, limit: usize) -> WsResult<()> {
    if size > limit {
        return Err(WsError::PayloadTooLarge { size, limit });
    }
    Ok(())
}
