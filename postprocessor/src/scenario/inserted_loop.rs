use super::{draw, ReworkInjector};
use crate::config::{require, ConfigError, InsertedLoopScenario};
use chrono::{NaiveDateTime, TimeDelta};
use itertools::Itertools;
use rand::{Rng, RngCore};
use rework_event_log::{
    minutes, parse_times, parse_timestamp, seconds, shift_row_time, EventRow, ExecutionWindow,
    START_TIME,
};

/// Names the entry in errors raised while building an injector.
const LABEL: &str = "inserted_loop_scenario";

/// Minutes a repeated target activity takes, drawn uniformly.
const TARGET_MINUTES: (f64, f64) = (55.0, 75.0);

/// Gap between an inserted row and the target row that follows it.
fn target_gap() -> TimeDelta {
    TimeDelta::seconds(1)
}

/// Loops an extra activity and a repeat of a target activity after an anchor activity.
///
/// Only the first occurrence of the anchor in a case starts a loop. Every case this injector
/// sees is re-sorted by start time, whether or not a loop was added to it.
#[derive(Debug, Clone)]
pub struct InsertedLoop {
    after_activity: String,
    inserted_activity: String,
    target_activity: String,
    max_iterations: u32,
    processing_minutes: (f64, f64),
    probability: f64,
    delay: TimeDelta,
    terminal_activities: Vec<String>,
}

impl TryFrom<&InsertedLoopScenario> for InsertedLoop {
    type Error = ConfigError;

    fn try_from(scenario: &InsertedLoopScenario) -> Result<Self, ConfigError> {
        scenario.check(LABEL)?;
        let after_activity = require(LABEL, "after_activity", scenario.after_activity.clone())?;
        let inserted_activity = require(
            LABEL,
            "inserted_activity",
            scenario.inserted_activity.clone(),
        )?;
        let target_activity = scenario
            .target_activity
            .clone()
            .unwrap_or_else(|| after_activity.clone());

        Ok(Self {
            after_activity,
            inserted_activity,
            target_activity,
            max_iterations: require(LABEL, "max_iterations", scenario.max_iterations)?,
            processing_minutes: require(LABEL, "processing_time", scenario.processing_time)?,
            probability: require(LABEL, "percentage", scenario.percentage)?,
            delay: seconds(require(LABEL, "additional_delay", scenario.additional_delay)?),
            terminal_activities: scenario.terminal_activities.clone(),
        })
    }
}

impl InsertedLoop {
    /// Insert up to `iterations` pairs after `anchor_index`, shifting the rows after it.
    ///
    /// Returns the number of rows inserted.
    fn insert_loop(
        &self,
        rows: &mut Vec<EventRow>,
        anchor_index: usize,
        iterations: u32,
        rng: &mut dyn RngCore,
    ) -> usize {
        let mut looped: Vec<EventRow> = Vec::new();
        for _ in 0..iterations {
            let anchor = looped.last().unwrap_or(&rows[anchor_index]);
            let Some(anchor_window) = parse_times(anchor) else {
                break;
            };

            let windows = self.loop_windows(anchor_window.completion, rng);
            let Some((inserted_window, target_window)) = windows else {
                log::warn!(
                    "Loop iteration after {} overflows the calendar, stopping",
                    self.after_activity
                );
                break;
            };
            let mut inserted = anchor.with_task(&self.inserted_activity);
            inserted.set_window(inserted_window);
            let mut target = anchor.with_task(&self.target_activity);
            target.set_window(target_window);

            let shift = target_window.completion - anchor_window.completion;
            for row in rows.iter_mut().skip(anchor_index + 1) {
                shift_row_time(row, shift);
            }

            looped.push(inserted);
            looped.push(target);
        }

        let count = looped.len();
        rows.splice(anchor_index + 1..anchor_index + 1, looped);
        count
    }

    /// Draw the durations of one iteration and place it after `anchor_completion`.
    fn loop_windows(
        &self,
        anchor_completion: NaiveDateTime,
        rng: &mut dyn RngCore,
    ) -> Option<(ExecutionWindow, ExecutionWindow)> {
        let (min, max) = self.processing_minutes;
        let inserted_length = minutes(rng.gen_range(min..=max));
        let target_length = minutes(rng.gen_range(TARGET_MINUTES.0..=TARGET_MINUTES.1));

        let inserted = ExecutionWindow::following(anchor_completion, self.delay, inserted_length)?;
        let target = ExecutionWindow::following(inserted.completion, target_gap(), target_length)?;
        Some((inserted, target))
    }
}

impl ReworkInjector for InsertedLoop {
    fn name(&self) -> String {
        format!(
            "inserted_loop[{}->{}]",
            self.after_activity, self.inserted_activity
        )
    }

    fn inject_case(&self, case_id: &str, rows: &mut Vec<EventRow>, rng: &mut dyn RngCore) -> bool {
        let apply = draw(rng, self.probability);
        let terminal = rows
            .iter()
            .rev()
            .find(|row| self.terminal_activities.iter().any(|t| t == row.task()))
            .cloned();

        let mut inserted = 0;
        if apply {
            let anchor_index = rows
                .iter()
                .position(|row| row.task() == self.after_activity);
            if let Some(anchor_index) = anchor_index {
                let iterations = rng.gen_range(1..=self.max_iterations.max(1));
                log::debug!(
                    "Inserting {iterations} loop iteration(s) of {} after {} in case {case_id}",
                    self.inserted_activity,
                    self.after_activity
                );
                inserted = self.insert_loop(rows, anchor_index, iterations, rng);
            } else {
                log::debug!(
                    "No occurrence of {} in case {case_id}, skipping inserted loop",
                    self.after_activity
                );
            }
        }

        if let Some(terminal) = terminal {
            if !rows.iter().any(|row| row.task() == terminal.task()) {
                rows.push(terminal);
            }
        }

        // Stable, so rows with an unparseable start keep their relative order at the front.
        rows.sort_by_cached_key(|row| parse_timestamp(START_TIME, row.start_time()).ok());

        log::trace!(
            "Case {case_id} sequence: {}",
            rows.iter().map(EventRow::task).join(", ")
        );

        inserted > 0
    }
}
