//! Domain services
pub mod checkout;
pub mod discount;
pub mod fulfillment;
pub mod permissions;
pub mod presentation;
pub mod pricing;

/// Read-modify-write attempts before a stale write is reported to the caller.
pub(crate) const WRITE_ATTEMPTS: u32 = 3;
