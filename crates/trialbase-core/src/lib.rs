//! # trialbase-core
//!
//! Shared models, error taxonomy, field normalization, and repository traits
//! for the trialbase clinical-trial and drug-development records backend.

pub mod error;
pub mod models;
pub mod normalize;
pub mod traits;

pub use error::{Error, Result};
pub use models::*;
pub use normalize::{ensure_array_fields, ensure_string_fields, scalar_to_string};
pub use traits::*;
