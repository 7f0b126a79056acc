//! Export a training set as the three CSV tables `cannon train` reads.
//!
//! Used by `cannon synth`; the layout matches `io::ingest`.

use std::fs::{self, File};
use std::path::Path;

use nalgebra::DMatrix;

use crate::domain::TrainingSet;
use crate::error::AppError;
use crate::io::ingest::InputPaths;

/// Write `labels.csv`, `flux.csv` and `ivar.csv` under `dir`.
pub fn write_training_set_csv(dir: &Path, set: &TrainingSet) -> Result<InputPaths, AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create output dir '{}': {e}", dir.display())))?;

    let paths = InputPaths {
        labels: dir.join("labels.csv"),
        flux: dir.join("flux.csv"),
        ivar: dir.join("ivar.csv"),
    };

    write_table(&paths.labels, &set.ids, &set.label_names, &set.labels)?;
    let wavelengths: Vec<String> = set.wavelengths.iter().map(|w| format!("{w}")).collect();
    write_table(&paths.flux, &set.ids, &wavelengths, &set.fluxes)?;
    write_table(&paths.ivar, &set.ids, &wavelengths, &set.ivars)?;

    Ok(paths)
}

fn write_table(path: &Path, ids: &[String], columns: &[String], values: &DMatrix<f64>) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write CSV '{}': {e}", path.display()));

    let mut header = Vec::with_capacity(columns.len() + 1);
    header.push("id".to_string());
    header.extend(columns.iter().cloned());
    writer.write_record(&header).map_err(write_err)?;

    for (id, row) in ids.iter().zip(values.row_iter()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(id.clone());
        record.extend(row.iter().map(|v| format!("{v}")));
        writer.write_record(&record).map_err(write_err)?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticConfig, generate};
    use crate::io::ingest::load_training_set;

    #[test]
    fn exported_tables_load_back_unchanged() {
        let cfg = SyntheticConfig {
            n_stars: 25,
            n_pixels: 5,
            n_labels: 2,
            bad_fraction: 0.1,
            ..SyntheticConfig::default()
        };
        let set = generate(&cfg).unwrap().set;
        let dir = std::env::temp_dir().join(format!("cannon-export-{}", std::process::id()));

        let paths = write_training_set_csv(&dir, &set).unwrap();
        let loaded = load_training_set(&paths, None).unwrap();

        assert!(loaded.row_errors.is_empty());
        assert_eq!(loaded.set, set);
    }
}
