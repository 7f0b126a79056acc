//! Training orchestration.
//!
//! Responsibilities:
//!
//! - generate the log-scatter grid
//! - search the scatter of each pixel (grid + quadratic refinement)
//! - fit every pixel (sequential or parallel) under a failure policy
//! - assemble the per-pixel fits into a model

pub mod assemble;
pub mod profiler;
pub mod scatter_grid;
pub mod trainer;

pub use assemble::*;
pub use profiler::*;
pub use scatter_grid::*;
pub use trainer::*;
