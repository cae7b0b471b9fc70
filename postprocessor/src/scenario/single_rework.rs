use super::{draw, ReworkInjector};
use crate::config::SingleReworkScenario;
use chrono::TimeDelta;
use rand::RngCore;
use rework_event_log::{parse_times, seconds, shift_row_time, EventRow, ExecutionWindow};

/// Repeats an activity right after it completed.
#[derive(Debug, Clone)]
pub struct SingleRework {
    activities: Vec<String>,
    probability: f64,
    delay: TimeDelta,
}

impl SingleRework {
    pub fn new(activities: Vec<String>, probability: f64, delay: TimeDelta) -> Self {
        Self {
            activities,
            probability,
            delay,
        }
    }
}

impl From<&SingleReworkScenario> for SingleRework {
    fn from(scenario: &SingleReworkScenario) -> Self {
        Self::new(
            scenario.affected_activities.clone(),
            scenario.rework_percentage,
            seconds(scenario.additional_delay),
        )
    }
}

impl ReworkInjector for SingleRework {
    fn name(&self) -> String {
        format!("single_rework[{}]", self.activities.join(","))
    }

    /// Each configured activity gets its own draw, so one case can be reworked for several of them.
    fn inject_case(&self, case_id: &str, rows: &mut Vec<EventRow>, rng: &mut dyn RngCore) -> bool {
        let mut injected = false;
        for activity in &self.activities {
            if draw(rng, self.probability) {
                log::debug!("Injecting single rework for {activity} in case {case_id}");
                injected |= duplicate_first_occurrence(case_id, rows, activity, self.delay);
            }
        }
        injected
    }
}

fn duplicate_first_occurrence(
    case_id: &str,
    rows: &mut Vec<EventRow>,
    activity: &str,
    delay: TimeDelta,
) -> bool {
    // Occurrences with malformed timestamps are passed over.
    let found = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.task() == activity)
        .find_map(|(index, row)| parse_times(row).map(|window| (index, window)));
    let Some((index, window)) = found else {
        log::debug!("No usable occurrence of {activity} in case {case_id}, skipping single rework");
        return false;
    };

    let repeated_window = ExecutionWindow::following(window.completion, delay, window.duration());
    let Some(repeated_window) = repeated_window else {
        log::warn!("Repeating {activity} in case {case_id} overflows the calendar, skipping");
        return false;
    };
    let mut repeated = rows[index].clone();
    repeated.set_window(repeated_window);
    rows.insert(index + 1, repeated);

    // Later rows move by the delay only, not by the repeated duration, so the row that follows the
    // repetition may overlap it.
    for row in rows.iter_mut().skip(index + 2) {
        shift_row_time(row, delay);
    }

    true
}
