//! Handler modules for trialbase-api.

pub mod activity;
pub mod drugs;
pub mod pending_changes;
pub mod records;
pub mod trials;
pub mod users;
