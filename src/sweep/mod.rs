//! Sweep Module
//!
//! The proactive side of the system: a rate-limited background pass that
//! reminds idle workers, built on the lease manager and the task selector.
//! Delivery goes through the `Notifier` seam so the messaging platform
//! stays external.

pub mod notifier;
pub mod reminder;
