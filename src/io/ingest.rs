//! CSV ingest of a reference set.
//!
//! Three files, all keyed by a leading `id` column:
//!
//! - labels: `id,<label name>,<label name>,...`, one row per star
//! - flux:   `id,<wavelength>,<wavelength>,...`, one row per star
//! - ivar:   same header as flux
//!
//! Star order follows the labels file. Rows that cannot be used are skipped
//! and reported; a missing column or mismatched wavelength header is fatal.
//! Entries with a non-finite flux or ivar are kept as masked entries
//! (flux 1, ivar 0) so the ivar floor handles them like any other bad pixel.
//! A duplicated id keeps its first row in every file.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use nalgebra::DMatrix;

use crate::domain::TrainingSet;
use crate::error::AppError;

/// Locations of the three input tables.
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub labels: PathBuf,
    pub flux: PathBuf,
    pub ivar: PathBuf,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub file: &'static str,
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Ingest output: the training set plus what was dropped on the way.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub set: TrainingSet,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
    pub n_masked: usize,
}

struct LabelRow {
    line: usize,
    id: String,
    values: Vec<f64>,
}

struct SpectraTable {
    wavelengths: Vec<f64>,
    rows: HashMap<String, Vec<f64>>,
}

fn is_masked(flux: f64, ivar: f64) -> bool {
    !(flux.is_finite() && ivar.is_finite())
}

/// Load and join the label, flux and ivar tables.
///
/// `label_cols` restricts (and orders) the labels used; `None` keeps them all.
pub fn load_training_set(paths: &InputPaths, label_cols: Option<&[String]>) -> Result<IngestedData, AppError> {
    let mut row_errors = Vec::new();

    let (label_names, label_rows, rows_read) = read_labels(&paths.labels, label_cols, &mut row_errors)?;
    let flux = read_spectra(&paths.flux, "flux", &mut row_errors)?;
    let ivar = read_spectra(&paths.ivar, "ivar", &mut row_errors)?;

    if flux.wavelengths != ivar.wavelengths {
        return Err(AppError::new(
            2,
            "Flux and ivar files must have identical wavelength headers.",
        ));
    }

    let mut ids = Vec::new();
    let mut label_values = Vec::new();
    let mut flux_values = Vec::new();
    let mut ivar_values = Vec::new();
    let mut n_masked = 0usize;

    for row in label_rows {
        let (Some(flux_row), Some(ivar_row)) = (flux.rows.get(&row.id), ivar.rows.get(&row.id)) else {
            row_errors.push(RowError {
                file: "labels",
                line: row.line,
                id: Some(row.id.clone()),
                message: "star has no flux or ivar row".to_string(),
            });
            continue;
        };
        for (&fv, &iv) in flux_row.iter().zip(ivar_row) {
            if is_masked(fv, iv) {
                n_masked += 1;
                flux_values.push(1.0);
                ivar_values.push(0.0);
            } else {
                flux_values.push(fv);
                ivar_values.push(iv);
            }
        }
        label_values.extend_from_slice(&row.values);
        ids.push(row.id);
    }

    let n_stars = ids.len();
    if n_stars == 0 {
        return Err(AppError::new(3, "No stars remain after joining labels, flux and ivar."));
    }
    let n_labels = label_names.len();
    let n_pixels = flux.wavelengths.len();

    let set = TrainingSet::new(
        ids,
        label_names,
        flux.wavelengths,
        DMatrix::from_row_slice(n_stars, n_labels, &label_values),
        DMatrix::from_row_slice(n_stars, n_pixels, &flux_values),
        DMatrix::from_row_slice(n_stars, n_pixels, &ivar_values),
    )?;

    Ok(IngestedData {
        set,
        row_errors,
        rows_read,
        rows_used: n_stars,
        n_masked,
    })
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn read_headers(reader: &mut csv::Reader<File>, path: &Path) -> Result<Vec<String>, AppError> {
    let headers: StringRecord = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers of '{}': {e}", path.display())))?
        .clone();
    let names: Vec<String> = headers.iter().map(normalize_header_name).collect();
    if names.first().map(String::as_str) != Some("id") {
        return Err(AppError::new(
            2,
            format!("First column of '{}' must be 'id'.", path.display()),
        ));
    }
    if names.len() < 2 {
        return Err(AppError::new(2, format!("'{}' has no data columns.", path.display())));
    }
    Ok(names)
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn read_labels(
    path: &Path,
    label_cols: Option<&[String]>,
    row_errors: &mut Vec<RowError>,
) -> Result<(Vec<String>, Vec<LabelRow>, usize), AppError> {
    let mut reader = open_reader(path)?;
    let headers = read_headers(&mut reader, path)?;

    let columns: Vec<(String, usize)> = match label_cols {
        None => headers[1..]
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i + 1))
            .collect(),
        Some(wanted) => wanted
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .position(|h| h == name)
                    .filter(|&idx| idx > 0)
                    .map(|idx| (name.clone(), idx))
                    .ok_or_else(|| {
                        AppError::new(2, format!("Label column '{name}' not found in '{}'.", path.display()))
                    })
            })
            .collect::<Result<_, _>>()?,
    };

    let mut rows = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    file: "labels",
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        let id = record.get(0).unwrap_or_default().to_string();
        if id.is_empty() {
            row_errors.push(RowError {
                file: "labels",
                line,
                id: None,
                message: "missing id".to_string(),
            });
            continue;
        }
        if let Some(first) = seen.get(&id) {
            row_errors.push(RowError {
                file: "labels",
                line,
                id: Some(id),
                message: format!("duplicate id (first seen on line {first})"),
            });
            continue;
        }

        let parsed: Result<Vec<f64>, String> = columns
            .iter()
            .map(|(name, col)| {
                let raw = record.get(*col).unwrap_or_default();
                match raw.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(format!("label '{name}' is not a finite number: '{raw}'")),
                }
            })
            .collect();

        match parsed {
            Ok(values) => {
                seen.insert(id.clone(), line);
                rows.push(LabelRow { line, id, values });
            }
            Err(message) => row_errors.push(RowError {
                file: "labels",
                line,
                id: Some(id),
                message,
            }),
        }
    }

    let names = columns.into_iter().map(|(name, _)| name).collect();
    Ok((names, rows, rows_read))
}

fn read_spectra(
    path: &Path,
    file: &'static str,
    row_errors: &mut Vec<RowError>,
) -> Result<SpectraTable, AppError> {
    let mut reader = open_reader(path)?;
    let headers = read_headers(&mut reader, path)?;

    let wavelengths = headers[1..]
        .iter()
        .map(|h| {
            h.parse::<f64>().map_err(|_| {
                AppError::new(2, format!("Header '{h}' of '{}' is not a wavelength.", path.display()))
            })
        })
        .collect::<Result<Vec<f64>, AppError>>()?;
    let n_pixels = wavelengths.len();

    let mut rows = HashMap::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    file,
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        let id = record.get(0).unwrap_or_default().to_string();
        if let Some(first) = seen.get(&id) {
            row_errors.push(RowError {
                file,
                line,
                id: Some(id),
                message: format!("duplicate id (first seen on line {first})"),
            });
            continue;
        }
        if record.len() != n_pixels + 1 {
            row_errors.push(RowError {
                file,
                line,
                id: Some(id),
                message: format!("expected {} values, found {}", n_pixels, record.len().saturating_sub(1)),
            });
            continue;
        }
        let values: Result<Vec<f64>, String> = record
            .iter()
            .skip(1)
            .map(|raw| {
                raw.parse::<f64>()
                    .map_err(|_| format!("value '{raw}' is not a number"))
            })
            .collect();
        match values {
            Ok(v) => {
                seen.insert(id.clone(), line);
                rows.insert(id, v);
            }
            Err(message) => row_errors.push(RowError {
                file,
                line,
                id: Some(id),
                message,
            }),
        }
    }

    Ok(SpectraTable { wavelengths, rows })
}
