//! API-layer services.

pub mod aggregate;

pub use aggregate::{AggregateKind, AggregateService};
