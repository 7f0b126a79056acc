//! Numerical building blocks: the quadratic label vector and weighted least squares.

pub mod label_vector;
pub mod wls;

pub use label_vector::{LabelVector, lvec_width, quadratic_pairs};
pub use wls::{Regression, effective_ivar, solve_at_scatter};
