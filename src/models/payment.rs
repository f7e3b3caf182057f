use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Payment lifecycle status.
///
/// `initiated -> succeeded` or `initiated -> failed`; terminal once settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Failed)
    }
}

/// A payment attempt for a booking, tracking the gateway session from
/// creation through webhook/poller settlement.
///
/// At most one payment per booking may ever be `succeeded`; further attempts
/// after a terminal success are rejected at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    /// Gateway checkout session id, set at creation.
    pub session_id: String,
    /// Gateway transaction/intent id, set once the gateway settles.
    pub intent_id: Option<String>,
    /// Integer minor units (cents), as sent to the gateway.
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Raw gateway response snapshot for audit/debug; never used for logic.
    pub gateway_response: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug)]
pub struct CreatePayment {
    pub booking_id: String,
    pub session_id: String,
    pub amount_minor: i64,
    pub currency: String,
}
