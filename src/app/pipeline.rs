//! Shared training workflow:
//! CSV ingest -> training -> outlier diagnostics.
//!
//! Presentation and file output stay in `app`.

use crate::cli::TrainArgs;
use crate::domain::{TrainConfig, TrainedModel};
use crate::error::AppError;
use crate::io::ingest::{IngestedData, InputPaths, load_training_set};
use crate::report::{FlaggedStar, flag_outlier_stars};

/// All computed outputs of a single `cannon train` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub model: TrainedModel,
    pub flagged: Vec<FlaggedStar>,
}

/// Load the reference set named by `args` and train on it.
pub fn run_train(args: &TrainArgs, config: &TrainConfig) -> Result<RunOutput, AppError> {
    let paths = InputPaths {
        labels: args.labels.clone(),
        flux: args.flux.clone(),
        ivar: args.ivar.clone(),
    };
    let ingest = load_training_set(&paths, args.label_cols.as_deref())?;
    run_train_on(ingest, config, args.flag_sigma)
}

/// Train on an already-loaded reference set.
pub fn run_train_on(ingest: IngestedData, config: &TrainConfig, flag_sigma: f64) -> Result<RunOutput, AppError> {
    let model = crate::fit::train(&ingest.set, config)?;
    let flagged = flag_outlier_stars(&model, flag_sigma);

    Ok(RunOutput {
        ingest,
        model,
        flagged,
    })
}
