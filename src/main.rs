use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use reidmetric::{synthetic, MetricConfig, MetricPipeline};

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

fn parse_args() -> Result<Option<PathBuf>> {
    let mut args = env::args().skip(1);
    let config = args.next().map(PathBuf::from);
    if let Some(extra) = args.next() {
        anyhow::bail!("Unexpected extra argument: {extra}");
    }
    Ok(config)
}

fn main() -> Result<()> {
    init_logging();
    let config = match parse_args()? {
        Some(path) => {
            info!("Reading configuration from {:?}", path);
            MetricConfig::from_path(&path)?
        }
        None => MetricConfig::default(),
    };

    let dataset =
        synthetic::generate(&config.synthetic).context("generate synthetic identities")?;
    info!(
        "Generated {} samples of dimension {} ({} training rows)",
        dataset.data.len(),
        dataset.data.dim(),
        dataset.train_idx.len()
    );

    let pipeline = MetricPipeline::new(config);
    let summary = pipeline.run(&dataset.data, &dataset.train_idx)?;
    let outcome = &summary.outcome;

    info!(
        "Subspace stage {:?}, optimization {:?}, total {:?}",
        summary.subspace_duration, summary.optimize_duration, summary.total_duration
    );
    info!(
        "Metric learned in {} iterations ({:?}): g = {:.4}, f = {:.6}, eps = {:.3e}",
        outcome.iterations,
        outcome.termination,
        outcome.objective,
        outcome.feasibility,
        outcome.step
    );

    let weights = serde_json::to_string(outcome.metric.weights().as_slice())
        .context("serialize metric weights")?;
    println!("{weights}");
    Ok(())
}
