use super::{draw, ReworkInjector};
use crate::config::LongReworkScenario;
use chrono::{NaiveDateTime, TimeDelta};
use rand::RngCore;
use rework_event_log::{parse_times, seconds, shift_row_time, EventRow, ExecutionWindow};

/// Task name of the follow-up row a jump-back always adds.
const JUMP_BACK_FOLLOW_UP: &str = "credit_check";

fn follow_up_duration() -> TimeDelta {
    TimeDelta::minutes(15)
}

fn step_duration() -> TimeDelta {
    TimeDelta::minutes(10)
}

/// What a long rework splices in after its trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum LongReworkKind {
    /// Repeat the latest `back_to[0]` row at or before the trigger, followed by a credit check.
    JumpBack { back_to: Vec<String> },
    /// Insert a chain of new activities.
    Sequence { activities: Vec<String> },
}

/// Rework that reaches back past the row it was triggered by.
#[derive(Debug, Clone)]
pub struct LongRework {
    trigger: String,
    kind: LongReworkKind,
    probability: f64,
    delay: TimeDelta,
}

impl LongRework {
    pub fn new(trigger: String, kind: LongReworkKind, probability: f64, delay: TimeDelta) -> Self {
        Self {
            trigger,
            kind,
            probability,
            delay,
        }
    }
}

impl From<&LongReworkScenario> for LongRework {
    fn from(scenario: &LongReworkScenario) -> Self {
        // A `back_to` key selects the jump-back even when its list is empty.
        let kind = match &scenario.back_to {
            Some(back_to) => LongReworkKind::JumpBack {
                back_to: back_to.clone(),
            },
            None => LongReworkKind::Sequence {
                activities: scenario.sequence_of_new_activities.clone(),
            },
        };
        Self::new(
            scenario.trigger_activity.clone(),
            kind,
            scenario.rework_percentage,
            seconds(scenario.additional_delay),
        )
    }
}

impl ReworkInjector for LongRework {
    fn name(&self) -> String {
        match &self.kind {
            LongReworkKind::JumpBack { .. } => format!("long_rework_jump_back[{}]", self.trigger),
            LongReworkKind::Sequence { .. } => format!("long_rework_sequence[{}]", self.trigger),
        }
    }

    fn inject_case(&self, case_id: &str, rows: &mut Vec<EventRow>, rng: &mut dyn RngCore) -> bool {
        if !draw(rng, self.probability) {
            return false;
        }

        let Some(trigger_index) = rows.iter().position(|row| row.task() == self.trigger) else {
            log::debug!(
                "No occurrence of {} in case {case_id}, skipping long rework",
                self.trigger
            );
            return false;
        };

        log::debug!(
            "Injecting long rework in case {case_id} triggered by {}",
            self.trigger
        );
        match &self.kind {
            LongReworkKind::JumpBack { back_to } => {
                jump_back(case_id, rows, trigger_index, back_to, self.delay)
            }
            LongReworkKind::Sequence { activities } => {
                insert_sequence(case_id, rows, trigger_index, activities, self.delay)
            }
        }
    }
}

fn jump_back(
    case_id: &str,
    rows: &mut Vec<EventRow>,
    trigger_index: usize,
    back_to: &[String],
    delay: TimeDelta,
) -> bool {
    let Some(target) = back_to.first() else {
        log::warn!("Long rework has an empty back_to list, skipping case {case_id}");
        return false;
    };
    // The trigger row itself counts when it is the back-to activity.
    let Some(target_index) = rows[..=trigger_index]
        .iter()
        .rposition(|row| row.task() == target)
    else {
        log::warn!("No {target} at or before the trigger in case {case_id}, skipping rework");
        return false;
    };
    let Some(trigger_window) = parse_times(&rows[trigger_index]) else {
        return false;
    };
    let Some(target_window) = parse_times(&rows[target_index]) else {
        return false;
    };

    let windows = jump_back_windows(trigger_window.completion, target_window.duration(), delay);
    let Some((repeated_window, follow_up_window)) = windows else {
        log::warn!("Jump-back in case {case_id} overflows the calendar, skipping rework");
        return false;
    };

    let mut repeated = rows[target_index].clone();
    repeated.set_window(repeated_window);
    let mut follow_up = repeated.with_task(JUMP_BACK_FOLLOW_UP);
    follow_up.set_window(follow_up_window);

    rows.splice(trigger_index + 1..trigger_index + 1, [repeated, follow_up]);

    let shift = target_window.duration() + follow_up_duration() + delay * 2;
    for row in rows.iter_mut().skip(trigger_index + 3) {
        shift_row_time(row, shift);
    }

    true
}

/// Windows of the repeated target and of the follow-up after it.
fn jump_back_windows(
    trigger_completion: NaiveDateTime,
    target_duration: TimeDelta,
    delay: TimeDelta,
) -> Option<(ExecutionWindow, ExecutionWindow)> {
    let repeated = ExecutionWindow::following(trigger_completion, delay, target_duration)?;
    let follow_up = ExecutionWindow::following(repeated.completion, delay, follow_up_duration())?;
    Some((repeated, follow_up))
}

fn insert_sequence(
    case_id: &str,
    rows: &mut Vec<EventRow>,
    trigger_index: usize,
    activities: &[String],
    delay: TimeDelta,
) -> bool {
    if activities.is_empty() {
        log::warn!("Long rework has no sequence_of_new_activities, skipping case {case_id}");
        return false;
    }
    let Some(trigger_window) = parse_times(&rows[trigger_index]) else {
        return false;
    };

    let mut cursor = trigger_window.completion;
    let mut inserted = Vec::with_capacity(activities.len());
    for activity in activities {
        let Some(window) = ExecutionWindow::following(cursor, delay, step_duration()) else {
            log::warn!("Sequence in case {case_id} overflows the calendar, skipping rework");
            return false;
        };
        let mut step = rows[trigger_index].with_task(activity);
        step.set_window(window);
        cursor = window.completion;
        inserted.push(step);
    }

    let resume_at = trigger_index + 1 + inserted.len();
    rows.splice(trigger_index + 1..trigger_index + 1, inserted);

    let shift = cursor - trigger_window.completion;
    for row in rows.iter_mut().skip(resume_at) {
        shift_row_time(row, shift);
    }

    true
}
