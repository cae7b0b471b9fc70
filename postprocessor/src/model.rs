use rework_event_log::EventRow;
use serde::{Deserialize, Serialize};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// What one stage did to the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Tabled)]
pub struct StageReport {
    pub stage: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub cases_in: usize,
    pub cases_out: usize,
    /// Cases a rework stage injected into, or cases a filter dropped.
    pub cases_affected: usize,
}

impl StageReport {
    /// The report of a stage that had no rows to work on.
    pub(crate) fn empty(stage: String) -> Self {
        Self {
            stage,
            rows_in: 0,
            rows_out: 0,
            cases_in: 0,
            cases_out: 0,
            cases_affected: 0,
        }
    }
}

/// The rows a stage produced, with its report.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub rows: Vec<EventRow>,
    pub report: StageReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineReport {
    pub config_fingerprint: String,
    /// The seed every random decision of the run was drawn from.
    pub seed: u64,
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn table(&self) -> String {
        let mut table = Table::new(&self.stages);
        table.with(Style::modern());
        table.to_string()
    }
}
