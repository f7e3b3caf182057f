//! CharterPay - payment settlement reconciliation for a charter-flight marketplace
//!
//! This library implements the pipeline that turns a customer's intent to pay
//! into a durable, consistent booking state: session initiation against the
//! payment gateway, webhook reconciliation, a synchronous verification poller,
//! and the shared idempotent transition they all converge on.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod id;
pub mod models;
pub mod rate_limit;
pub mod settlement;
