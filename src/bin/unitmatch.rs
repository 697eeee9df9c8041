use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use unitmatch::{
    evaluate_output, run_matching, DerivedParams, DriftCorrection, MatchConfig,
    io::{write_outcome, UnitRecording},
};

#[derive(Parser)]
#[command(name = "unitmatch", about = "Match spike-sorted units across recording sessions")]
struct Args {
    /// units.safetensors with waveform, waw_per_tp, avg_centroid, amplitude,
    /// spatial_decay and units_per_session
    #[arg(long)]
    input: PathBuf,

    /// matches.safetensors output path
    #[arg(long)]
    output: PathBuf,

    /// JSON file with MatchConfig fields; missing fields keep their default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of drift-correction rounds (overrides the config)
    #[arg(long)]
    iterations: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<MatchConfig>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => MatchConfig::default(),
    };
    if let Some(n) = args.iterations {
        cfg.drift_iterations = n;
    }

    let rec = UnitRecording::load(&args.input)?;
    let layout = rec.layout()?;
    let derived = DerivedParams::from_data(rec.data.n_units(), rec.data.spike_width())?;
    log::info!(
        "{} units over {} sessions, {} samples per waveform",
        rec.data.n_units(),
        layout.n_sessions(),
        derived.spike_width
    );

    let outcome = run_matching(&rec.data, rec.positions, &layout, &cfg, &derived)?;
    let corrected = outcome
        .drift
        .iter()
        .filter(|r| !matches!(r.correction, DriftCorrection::Skipped))
        .count();
    log::info!("{corrected} of {} session boundaries drift-corrected", outcome.drift.len());
    evaluate_output(&outcome.total, &layout, outcome.threshold.threshold);

    write_outcome(&outcome, &args.output)?;
    Ok(())
}
