mod inserted_loop;
mod long_rework;
mod single_rework;

use crate::model::{StageOutcome, StageReport};
use rand::{Rng, RngCore};
use rework_event_log::{group_by_case, EventRow};

pub use inserted_loop::InsertedLoop;
pub use long_rework::{LongRework, LongReworkKind};
pub use single_rework::SingleRework;

/// A rework pattern that can be spliced into a single case.
pub trait ReworkInjector {
    /// Stage name used in logs and reports.
    fn name(&self) -> String;

    /// Inject into one case's rows, in place.
    ///
    /// Returns true if the case was modified. A case without the rows the pattern is anchored on
    /// is left as it is.
    fn inject_case(&self, case_id: &str, rows: &mut Vec<EventRow>, rng: &mut dyn RngCore) -> bool;
}

/// Run an injector over every case of a log.
///
/// Cases come out in the order they were first seen in `rows`.
pub fn apply_injector(
    injector: &dyn ReworkInjector,
    rows: Vec<EventRow>,
    rng: &mut dyn RngCore,
) -> StageOutcome {
    let stage = injector.name();
    if rows.is_empty() {
        log::info!("Event log is empty, skipping {stage}");
        return StageOutcome {
            report: StageReport::empty(stage),
            rows,
        };
    }

    let rows_in = rows.len();
    let cases = group_by_case(rows);
    let cases_in = cases.len();

    let mut affected = 0;
    let mut output = Vec::with_capacity(rows_in);
    for mut case in cases {
        if injector.inject_case(&case.id, &mut case.rows, rng) {
            affected += 1;
        }
        output.extend(case.rows);
    }

    log::info!("{stage} injected rework into {affected} of {cases_in} cases");

    StageOutcome {
        report: StageReport {
            stage,
            rows_in,
            rows_out: output.len(),
            cases_in,
            cases_out: cases_in,
            cases_affected: affected,
        },
        rows: output,
    }
}

/// Bernoulli trial with success probability `probability`.
pub(crate) fn draw(rng: &mut dyn RngCore, probability: f64) -> bool {
    rng.gen::<f64>() < probability
}
