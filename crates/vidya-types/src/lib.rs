//! Vidya Types - Shared domain types
//!
//! This crate contains domain types used across Vidya services:
//! - User identity and roles
//! - Plans and subscriptions
//! - Entitlements (per-feature usage allowances)
//! - Payment orders, invoices and transactions
//! - Referrals, study schedule tasks and audit entries

pub mod billing;
pub mod entitlement;
pub mod error;
pub mod plan;
pub mod referral;
pub mod schedule;
pub mod subscription;
pub mod user;

pub use billing::*;
pub use entitlement::*;
pub use error::*;
pub use plan::*;
pub use referral::*;
pub use schedule::*;
pub use subscription::*;
pub use user::*;
