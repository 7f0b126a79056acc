//! Read/write model JSON files.
//!
//! The schema is `domain::ModelFile`: coefficients, scatters, covariances and
//! chi-squared diagnostics plus the label names, pivots and star ids needed to
//! interpret them.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::domain::{ModelFile, TrainedModel};
use crate::error::AppError;

/// Write a trained model as pretty-printed JSON.
pub fn write_model_json(path: &Path, model: &TrainedModel) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create model JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(BufWriter::new(file), &ModelFile::from_model(model))
        .map_err(|e| AppError::new(2, format!("Failed to write model JSON: {e}")))?;

    Ok(())
}

/// Read a model JSON file back into memory.
pub fn read_model_json(path: &Path) -> Result<TrainedModel, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open model JSON '{}': {e}", path.display())))?;
    let parsed: ModelFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid model JSON: {e}")))?;
    parsed
        .into_model()
        .map_err(|e| AppError::new(2, format!("Inconsistent model JSON '{}': {e}", path.display())))
}
