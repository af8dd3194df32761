//! Hash chain over audit entries.
//!
//! Each entry's hash covers its own content plus the previous entry's
//! hash, so editing any historical entry breaks every hash after it.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{InventoryAction, InventoryLog};

/// The hashed portion of a log entry. Field order fixes the canonical
/// JSON form and must not change between releases.
#[derive(Serialize)]
struct ChainBody<'a> {
    id: &'a str,
    item_id: &'a str,
    item_name: &'a str,
    action: &'a InventoryAction,
    quantity_change: Option<i64>,
    notes: &'a str,
    user: &'a str,
    timestamp: &'a str,
    prev_hash: &'a str,
}

/// Seal an entry onto the chain whose tip is `prev_hash`. The first
/// entry seals onto the empty string.
pub fn seal(log: &mut InventoryLog, prev_hash: &str) -> Result<(), serde_json::Error> {
    log.prev_hash = prev_hash.to_string();
    log.entry_hash = entry_hash(log)?;
    Ok(())
}

/// Compute the hash an entry should carry given its content and link.
pub fn entry_hash(log: &InventoryLog) -> Result<String, serde_json::Error> {
    let body = ChainBody {
        id: &log.id,
        item_id: &log.item_id,
        item_name: &log.item_name,
        action: &log.action,
        quantity_change: log.quantity_change,
        notes: &log.notes,
        user: &log.user,
        timestamp: &log.timestamp,
        prev_hash: &log.prev_hash,
    };
    Ok(hash_bytes(serde_json::to_string(&body)?.as_bytes()))
}

/// Outcome of a chain verification pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainStatus {
    /// Every entry links and hashes correctly.
    Intact {
        /// Number of entries checked
        entries: usize,
    },
    /// The first defect found, walking oldest to newest.
    Broken {
        /// Position in chain order
        index: usize,
        /// ID of the offending entry
        entry_id: String,
        /// What failed
        reason: BreakReason,
    },
}

/// How a chain entry failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// `prev_hash` does not match the preceding entry's hash
    BrokenLink,
    /// `entry_hash` does not match the entry's own content
    TamperedBody,
}

/// Walk entries oldest-first and report the first defect, if any.
pub fn verify_chain(logs: &[InventoryLog]) -> Result<ChainStatus, serde_json::Error> {
    let mut tip = String::new();

    for (index, log) in logs.iter().enumerate() {
        if log.prev_hash != tip {
            return Ok(ChainStatus::Broken {
                index,
                entry_id: log.id.clone(),
                reason: BreakReason::BrokenLink,
            });
        }
        if log.entry_hash != entry_hash(log)? {
            return Ok(ChainStatus::Broken {
                index,
                entry_id: log.id.clone(),
                reason: BreakReason::TamperedBody,
            });
        }
        tip = log.entry_hash.clone();
    }

    Ok(ChainStatus::Intact {
        entries: logs.len(),
    })
}

/// Compute SHA-256 hash of data.
fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
