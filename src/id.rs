//! Prefixed ID generation for CharterPay entities.
//!
//! All IDs use a `cp_` brand prefix to guarantee collision avoidance with
//! payment gateway IDs (Stripe's `cs_`, `pi_`, `cus_`, etc.).
//!
//! Format: `cp_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["cp_bkg_", "cp_pay_", "cp_evt_"];

/// Validate that a string is a valid CharterPay prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `cp_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in CharterPay.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Booking,
    Payment,
    EventRecord,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Booking => "cp_bkg",
            Self::Payment => "cp_pay",
            Self::EventRecord => "cp_evt",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
