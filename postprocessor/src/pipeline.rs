use crate::config::{ConfigError, PostprocessConfig};
use crate::filter::{apply_filter, FilterChain};
use crate::model::{PipelineReport, StageReport};
use crate::scenario::{apply_injector, InsertedLoop, LongRework, ReworkInjector, SingleRework};
use anyhow::Context;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rework_event_log::{read_event_log, write_event_log, EventRow};
use std::path::Path;

/// The enabled rework stages of a configuration followed by the calendar filters.
pub struct Pipeline {
    injectors: Vec<Box<dyn ReworkInjector>>,
    filters: FilterChain,
}

impl Pipeline {
    pub fn new(injectors: Vec<Box<dyn ReworkInjector>>, filters: FilterChain) -> Self {
        Self { injectors, filters }
    }

    /// Build the stages of a configuration.
    ///
    /// Rework families run single first, then long, then inserted loops, each in configuration
    /// order. A later stage sees the rows an earlier one inserted, so this order is part of what
    /// a configuration means.
    pub fn from_config(config: &PostprocessConfig) -> Result<Self, ConfigError> {
        let mut injectors: Vec<Box<dyn ReworkInjector>> = Vec::new();
        for scenario in config.single_rework_scenarios.iter().filter(|s| s.enabled) {
            injectors.push(Box::new(SingleRework::from(scenario)));
        }
        for scenario in config.long_rework_scenarios.iter().filter(|s| s.enabled) {
            injectors.push(Box::new(LongRework::from(scenario)));
        }
        for scenario in config.inserted_loop_scenarios.iter().filter(|s| s.enabled) {
            injectors.push(Box::new(InsertedLoop::try_from(scenario)?));
        }

        Ok(Self::new(injectors, FilterChain::from_config(config)?))
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.injectors
            .iter()
            .map(|injector| injector.name())
            .chain(self.filters.filters().iter().map(|filter| filter.name()))
            .collect()
    }

    /// Run every stage on rows held in memory.
    pub fn run_in_memory(
        &self,
        rows: Vec<EventRow>,
        rng: &mut dyn RngCore,
    ) -> (Vec<EventRow>, Vec<StageReport>) {
        let mut reports = Vec::with_capacity(self.injectors.len() + 3);
        let mut rows = rows;
        for injector in &self.injectors {
            let outcome = apply_injector(injector.as_ref(), rows, rng);
            reports.push(outcome.report);
            rows = outcome.rows;
        }

        let (rows, filter_reports) = self.filters.apply(rows);
        reports.extend(filter_reports);

        (rows, reports)
    }

    /// Run every stage through files.
    ///
    /// The first stage reads `base_log` and every stage writes `final_log`, which the next stage
    /// reads back. When there is no rework stage the base log is copied to `final_log` before
    /// filtering, unless both paths name the same file.
    pub fn run_with_files(
        &self,
        base_log: &Path,
        final_log: &Path,
        separator: u8,
        rng: &mut dyn RngCore,
    ) -> anyhow::Result<Vec<StageReport>> {
        let mut reports = Vec::with_capacity(self.injectors.len() + 3);

        let mut input = base_log;
        for injector in &self.injectors {
            let rows = read_event_log(input, separator)
                .with_context(|| format!("Failed to read event log for {}", injector.name()))?;
            let outcome = apply_injector(injector.as_ref(), rows, rng);
            write_event_log(&outcome.rows, final_log, separator)
                .with_context(|| format!("Failed to write event log for {}", injector.name()))?;
            log::info!(
                "{} event log saved to {}",
                injector.name(),
                final_log.display()
            );
            reports.push(outcome.report);
            input = final_log;
        }

        if self.injectors.is_empty() && !same_file(base_log, final_log) {
            std::fs::copy(base_log, final_log).with_context(|| {
                format!(
                    "Failed to copy base event log {} to {}",
                    base_log.display(),
                    final_log.display()
                )
            })?;
            log::info!(
                "No rework applied, copied {} to {}",
                base_log.display(),
                final_log.display()
            );
        }

        for filter in self.filters.filters() {
            let rows = read_event_log(final_log, separator)
                .with_context(|| format!("Failed to read event log for {}", filter.name()))?;
            let outcome = apply_filter(filter, rows);
            write_event_log(&outcome.rows, final_log, separator)
                .with_context(|| format!("Failed to write event log for {}", filter.name()))?;
            reports.push(outcome.report);
        }

        Ok(reports)
    }
}

/// Whether both paths resolve to the same existing file.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Post-process the base log a configuration names into its final log.
///
/// With `in_memory` the base log is read once and the final log written once. Otherwise every
/// stage hands over to the next through the final log file.
pub fn run(config: &PostprocessConfig, in_memory: bool) -> anyhow::Result<PipelineReport> {
    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    log::info!("Post-processing with seed {seed}");

    if let Some(period) = &config.calendar_period {
        log::info!(
            "Simulated calendar period {} to {} ({} minutes)",
            period.start,
            period.end,
            period.minutes()
        );
    }

    let separator = config.separator_byte()?;
    let pipeline = Pipeline::from_config(config)?;
    log::debug!("Stages: {}", pipeline.stage_names().join(" -> "));

    let base_log = config.event_log_filename.as_path();
    let final_log = config.final_event_log_filename.as_path();

    let stages = if in_memory {
        let rows = read_event_log(base_log, separator).context("Failed to read base event log")?;
        let (rows, reports) = pipeline.run_in_memory(rows, &mut rng);
        write_event_log(&rows, final_log, separator).context("Failed to write final event log")?;
        reports
    } else {
        pipeline.run_with_files(base_log, final_log, separator, &mut rng)?
    };
    log::info!("Final event log saved to {}", final_log.display());

    Ok(PipelineReport {
        config_fingerprint: config.fingerprint()?,
        seed,
        stages,
    })
}
