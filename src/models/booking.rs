use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Booking lifecycle status.
///
/// `pending -> confirmed` or `pending -> failed`; terminal once confirmed or
/// failed. A booking reaches `confirmed` if and only if some payment linked
/// to it reached `succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Failed,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Failed)
    }
}

/// A charter booking awaiting settlement. Created by the upstream booking
/// flow in `pending`; mutated only by the settlement transition; never
/// deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    /// Decimal amount in major units (e.g. "1250.00" USD).
    pub amount: Decimal,
    pub currency: String,
    pub status: BookingStatus,
    /// Opaque payer identity, forwarded to the gateway as metadata when set.
    pub payer_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for booking creation. The booking flow itself is out of scope;
/// this exists for seeding and tests.
#[derive(Debug, Deserialize)]
pub struct CreateBooking {
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub payer_id: Option<String>,
}
