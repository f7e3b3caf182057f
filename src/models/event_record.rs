use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorType {
    /// Gateway or internal machinery.
    System,
    /// An authorized API caller (identity validated upstream).
    Caller,
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventOutcome {
    Accepted,
    Applied,
    NoOp,
    Rejected,
    Unmatched,
    /// Session exists at the gateway but the local payment row was never
    /// written; resolvable later via the verification poller.
    ReconciliationGap,
}

/// One append-only record per inbound gateway event or security-relevant
/// action. Used for replay detection and forensic reconstruction, never as
/// the system of record for business state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub timestamp: i64,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: EventOutcome,
    pub metadata: Option<serde_json::Value>,
}

/// Filter for forensic queries over the audit trail.
#[derive(Debug, Default, Deserialize)]
pub struct EventRecordQuery {
    pub action: Option<String>,
    pub resource_id: Option<String>,
    pub from_timestamp: Option<i64>,
    pub to_timestamp: Option<i64>,
    /// Maximum number of items to return (default: 50, max: 100)
    pub limit: Option<i64>,
}

impl EventRecordQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }
}
