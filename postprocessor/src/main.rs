use anyhow::Context;
use rework_postprocessor::PostprocessConfig;
use std::fs::File;

fn main() -> anyhow::Result<()> {
    let cli = rework_cli::init();

    let mut config = PostprocessConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    if let Some(base_log) = cli.base_log {
        config.event_log_filename = base_log;
    }
    if let Some(final_log) = cli.final_log {
        config.final_event_log_filename = final_log;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let report = rework_postprocessor::run(&config, cli.in_memory)?;

    println!("{}", report.table());
    println!("Seed: {}", report.seed);

    if let Some(path) = cli.report {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create report file {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report).context("Failed to write report")?;
        log::info!("Report written to {}", path.display());
    }

    Ok(())
}
