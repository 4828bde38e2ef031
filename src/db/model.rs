//! Row models returned by the store repositories.
//!
//! Keep these structs focused on the data returned by queries. Diffing and
//! change classification live in `reconcile`.

use serde_json::Value;

/// A record body as persisted for one domain, plus its storage id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub natural_key: String,
    pub body: Value,
}

/// One scheduled write of a batch upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRow {
    pub natural_key: String,
    pub body: Value,
}

/// A NOTAM that must be monitored for silent disappearance until `expires_at`
/// (unix milliseconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub notam_id: String,
    pub expires_at: i64,
    /// Reported removed; kept until expiry to recognise a repost.
    pub removed: bool,
}
