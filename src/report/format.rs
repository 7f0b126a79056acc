//! Formatted terminal output.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! concerns and output changes stay localized.

use crate::domain::TrainedModel;
use crate::domain::types::median;
use crate::io::ingest::IngestedData;
use crate::report::FlaggedStar;

/// Row errors shown before the list is elided.
const MAX_ROW_ERRORS: usize = 10;

/// Describe what ingest kept and dropped.
pub fn format_ingest_summary(ingest: &IngestedData) -> String {
    let mut out = String::new();
    let set = &ingest.set;

    out.push_str("=== cannon - Reference Set ===\n");
    out.push_str(&format!(
        "Stars: used={} | read={} | dropped rows={}\n",
        ingest.rows_used,
        ingest.rows_read,
        ingest.row_errors.len()
    ));
    out.push_str(&format!("Labels: {}\n", set.label_names.join(", ")));
    out.push_str(&format!(
        "Pixels: n={} | wavelength=[{:.3}, {:.3}]\n",
        set.n_pixels(),
        set.wavelengths.first().copied().unwrap_or(f64::NAN),
        set.wavelengths.last().copied().unwrap_or(f64::NAN),
    ));
    if ingest.n_masked > 0 {
        out.push_str(&format!("Masked non-finite entries: {}\n", ingest.n_masked));
    }

    let mut snrs = set.snrs();
    if let Some(median_snr) = median(&mut snrs) {
        out.push_str(&format!(
            "SNR: min={:.1} median={median_snr:.1} max={:.1}\n",
            snrs[0],
            snrs[snrs.len() - 1]
        ));
    }
    let counts = set.usable_pixel_counts();
    if let (Some(min), Some(max)) = (counts.iter().min(), counts.iter().max()) {
        out.push_str(&format!(
            "Usable pixels per star: min={min} max={max} of {}\n",
            set.n_pixels()
        ));
    }

    for err in ingest.row_errors.iter().take(MAX_ROW_ERRORS) {
        let line = if err.line > 0 { format!(":{}", err.line) } else { String::new() };
        out.push_str(&format!(
            "  ({}{line}) {}{}\n",
            err.file,
            err.id.as_deref().map(|id| format!("{id}: ")).unwrap_or_default(),
            err.message
        ));
    }
    if ingest.row_errors.len() > MAX_ROW_ERRORS {
        out.push_str(&format!(
            "  ... and {} more\n",
            ingest.row_errors.len() - MAX_ROW_ERRORS
        ));
    }

    out
}

/// Summarize a trained model: sizes, scatter distribution, search outcomes,
/// skipped pixels and chi-squared, followed by any flagged stars.
pub fn format_training_summary(model: &TrainedModel, flagged: &[FlaggedStar]) -> String {
    let mut out = String::new();
    let diag = &model.diagnostics;

    out.push_str("=== cannon - Training Summary ===\n");
    out.push_str(&format!(
        "Labels: {} | pivots={}\n",
        model.label_names.join(", "),
        fmt_vec(model.pivots.as_slice())
    ));
    out.push_str(&format!(
        "Stars: n={} | Pixels: n={} | coefficients/pixel={}\n",
        model.star_ids.len(),
        model.n_pixels(),
        model.width()
    ));

    let mut scatters: Vec<f64> = model
        .scatters
        .iter()
        .enumerate()
        .filter(|&(m, _)| model.is_trained(m))
        .map(|(_, &s)| s)
        .collect();
    scatters.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if let (Some(min), Some(max)) = (scatters.first(), scatters.last()) {
        out.push_str(&format!(
            "Scatter: min={min:.3e} median={:.3e} max={max:.3e}\n",
            scatters[scatters.len() / 2]
        ));
    }

    out.push_str("\nScatter search:\n");
    for (kind, n) in model.outcome_counts() {
        out.push_str(&format!("  {:<16} {n}\n", kind.display_name()));
    }
    out.push_str(&format!("  {:<16} {}\n", "skipped", diag.n_skipped));
    for skip in &model.skipped {
        out.push_str(&format!(
            "  (skipped pixel {} @ {}) {}\n",
            skip.index, skip.wavelength, skip.reason
        ));
    }

    let n_stars = diag.per_star.len().max(1) as f64;
    out.push_str(&format!(
        "\nChi^2: total={:.3} | mean per star={:.3}\n",
        diag.total,
        diag.total / n_stars
    ));

    if !flagged.is_empty() {
        out.push_str("\nOutlier stars (high chi^2):\n");
        out.push_str(&format!("{:<24} {:>12} {:>8}\n", "id", "chi^2", "sigma"));
        out.push_str(&format!("{:-<24} {:-<12} {:-<8}\n", "", "", ""));
        for star in flagged {
            out.push_str(&format!(
                "{:<24} {:>12.3} {:>8.2}\n",
                truncate(&star.id, 24),
                star.chisq,
                star.sigma
            ));
        }
    }

    out
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.4}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
