//! Command-line parsing for the `cannon` training tool.
//!
//! Argument parsing and command dispatch stay separate from the fitting code;
//! `app::train_config_from_args` turns parsed arguments into a `TrainConfig`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{DEFAULT_IVAR_FLOOR, FailurePolicy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "cannon",
    version,
    about = "Train a quadratic data-driven spectral model on a reference set"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train a model from labels/flux/ivar CSV files and write it as JSON.
    Train(TrainArgs),
    /// Generate a synthetic reference set as CSV files.
    Synth(SynthArgs),
    /// Print diagnostics for a previously trained model JSON.
    Summary(SummaryArgs),
}

/// Options for `cannon train`.
#[derive(Debug, Parser, Clone)]
pub struct TrainArgs {
    /// Labels CSV (`id,<label>,...`).
    #[arg(long, value_name = "CSV")]
    pub labels: PathBuf,

    /// Flux CSV (`id,<wavelength>,...`).
    #[arg(long, value_name = "CSV")]
    pub flux: PathBuf,

    /// Inverse-variance CSV with the same header as the flux file.
    #[arg(long, value_name = "CSV")]
    pub ivar: PathBuf,

    /// Output model JSON.
    #[arg(long, value_name = "JSON")]
    pub out: PathBuf,

    /// Comma-separated label columns to train on (default: all).
    #[arg(long, value_delimiter = ',')]
    pub label_cols: Option<Vec<String>>,

    /// Inverse variances below this value are raised to it.
    #[arg(long, default_value_t = DEFAULT_IVAR_FLOOR)]
    pub ivar_floor: f64,

    /// Smallest scatter on the search grid.
    #[arg(long, default_value_t = crate::fit::DEFAULT_MIN_SCATTER)]
    pub min_scatter: f64,

    /// Train pixels one after another instead of in parallel.
    #[arg(long)]
    pub sequential: bool,

    /// Worker threads for parallel training (default: one per core).
    #[arg(long, env = "CANNON_THREADS")]
    pub threads: Option<usize>,

    /// What to do when a pixel cannot be fit.
    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    pub on_pixel_error: FailurePolicy,

    /// Flag reference stars whose chi^2 is this many sigma above the mean.
    #[arg(long, default_value_t = 3.0)]
    pub flag_sigma: f64,
}

/// Options for `cannon synth`.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Number of reference stars.
    #[arg(long, default_value_t = 200)]
    pub stars: usize,

    /// Number of pixels.
    #[arg(long, default_value_t = 50)]
    pub pixels: usize,

    /// Number of labels.
    #[arg(long, default_value_t = 3)]
    pub labels: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Largest true intrinsic scatter.
    #[arg(long, default_value_t = 0.02)]
    pub scatter: f64,

    /// Per-pixel signal-to-noise ratio.
    #[arg(long, default_value_t = 100.0)]
    pub snr: f64,

    /// Fraction of flux entries marked bad (ivar = 0).
    #[arg(long, default_value_t = 0.0)]
    pub bad_fraction: f64,

    /// Directory for labels.csv, flux.csv and ivar.csv.
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,
}

/// Options for `cannon summary`.
#[derive(Debug, Parser)]
pub struct SummaryArgs {
    /// Model JSON produced by `cannon train`.
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,

    /// Flag reference stars whose chi^2 is this many sigma above the mean.
    #[arg(long, default_value_t = 3.0)]
    pub flag_sigma: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_train_arguments() {
        let cli = Cli::parse_from([
            "cannon",
            "train",
            "--labels",
            "l.csv",
            "--flux",
            "f.csv",
            "--ivar",
            "i.csv",
            "--out",
            "m.json",
            "--label-cols",
            "teff,logg",
            "--sequential",
            "--on-pixel-error",
            "skip",
        ]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.label_cols, Some(vec!["teff".to_string(), "logg".to_string()]));
        assert!(args.sequential);
        assert_eq!(args.on_pixel_error, FailurePolicy::Skip);
        assert_eq!(args.ivar_floor, DEFAULT_IVAR_FLOOR);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
