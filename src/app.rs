//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads or generates reference sets
//! - trains and writes models
//! - prints summaries

use clap::Parser;
use log::info;

use crate::cli::{Command, SummaryArgs, SynthArgs, TrainArgs};
use crate::data::SyntheticConfig;
use crate::domain::{Execution, TrainConfig};
use crate::error::AppError;
use crate::fit::ScatterGrid;

pub mod pipeline;

/// Entry point for the `cannon` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Synth(args) => handle_synth(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let config = train_config_from_args(&args)?;
    let run = pipeline::run_train(&args, &config)?;

    println!("{}", crate::report::format_ingest_summary(&run.ingest));
    println!(
        "{}",
        crate::report::format_training_summary(&run.model, &run.flagged)
    );

    crate::io::write_model_json(&args.out, &run.model)?;
    info!("Wrote model to {}", args.out.display());
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = SyntheticConfig {
        n_stars: args.stars,
        n_pixels: args.pixels,
        n_labels: args.labels,
        seed: args.seed,
        max_scatter: args.scatter,
        snr: args.snr,
        bad_fraction: args.bad_fraction,
        ..SyntheticConfig::default()
    };
    let synthetic = crate::data::generate(&config)?;
    let paths = crate::io::write_training_set_csv(&args.out_dir, &synthetic.set)?;

    println!(
        "Wrote {} stars x {} pixels ({} labels) to:\n  {}\n  {}\n  {}",
        args.stars,
        args.pixels,
        args.labels,
        paths.labels.display(),
        paths.flux.display(),
        paths.ivar.display()
    );
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<(), AppError> {
    let model = crate::io::read_model_json(&args.model)?;
    let flagged = crate::report::flag_outlier_stars(&model, args.flag_sigma);
    println!("{}", crate::report::format_training_summary(&model, &flagged));
    Ok(())
}

pub fn train_config_from_args(args: &TrainArgs) -> Result<TrainConfig, AppError> {
    let defaults = ScatterGrid::default();
    let scatter_grid = ScatterGrid::from_scatter_range(args.min_scatter, defaults.ln_max.exp(), defaults.ln_step)?;
    if args.threads == Some(0) {
        return Err(AppError::new(2, "--threads must be at least 1."));
    }

    Ok(TrainConfig {
        ivar_floor: args.ivar_floor,
        scatter_grid,
        execution: if args.sequential {
            Execution::Sequential
        } else {
            Execution::Parallel
        },
        threads: args.threads,
        failure_policy: args.on_pixel_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailurePolicy;

    fn args() -> TrainArgs {
        TrainArgs::parse_from([
            "train", "--labels", "l.csv", "--flux", "f.csv", "--ivar", "i.csv", "--out", "m.json",
        ])
    }

    #[test]
    fn default_arguments_give_default_config() {
        let config = train_config_from_args(&args()).unwrap();
        let defaults = TrainConfig::default();
        assert_eq!(config.ivar_floor, defaults.ivar_floor);
        assert_eq!(config.execution, Execution::Parallel);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(
            config.scatter_grid.ln_values().unwrap().len(),
            defaults.scatter_grid.ln_values().unwrap().len()
        );
    }

    #[test]
    fn rejects_zero_threads_and_bad_scatter() {
        let mut a = args();
        a.threads = Some(0);
        assert_eq!(train_config_from_args(&a).unwrap_err().exit_code(), 2);

        let mut b = args();
        b.min_scatter = 2.0;
        assert!(train_config_from_args(&b).is_err());
    }
}
