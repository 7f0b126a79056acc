//! Data sources for training: deterministic synthetic reference sets.

pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticSet, generate};
