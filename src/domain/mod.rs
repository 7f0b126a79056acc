//! Shared domain types.
//!
//! - `types`: training set, run configuration, policy enums
//! - `model`: per-pixel fits, the assembled model and its file form

pub mod model;
pub mod types;

pub use model::*;
pub use types::*;
