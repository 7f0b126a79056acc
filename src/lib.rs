//! `cannon-train` library crate.
//!
//! Trains a quadratic data-driven spectral model: for every pixel, a
//! weighted least-squares fit of flux against a quadratic function of stellar
//! labels, with a per-pixel intrinsic scatter chosen by profiling.
//!
//! The binary (`cannon`) is a thin wrapper around this library so that the
//! training core is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
