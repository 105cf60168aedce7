//! REST API handlers

pub mod admin;
pub mod entitlements;
pub mod health;
pub mod invoices;
pub mod payments;
pub mod schedule;
pub mod shared;
pub mod subscription;
pub mod webhook;

pub use admin::*;
pub use entitlements::*;
pub use health::*;
pub use invoices::*;
pub use payments::*;
pub use schedule::*;
pub use subscription::*;
pub use webhook::*;
