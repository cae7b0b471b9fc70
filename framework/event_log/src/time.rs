use crate::{EventRow, COMPLETION_TIME, START_TIME};
use chrono::{NaiveDateTime, TimeDelta};

/// The layout every timestamp is written with, microsecond precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Same layout as [TIMESTAMP_FORMAT] but tolerant of any fractional precision, including none.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A timestamp field that does not follow [TIMESTAMP_FORMAT].
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("cannot parse {column} `{value}`")]
pub struct TimeParseError {
    column: &'static str,
    value: String,
}

/// The parsed start and completion of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionWindow {
    pub start: NaiveDateTime,
    pub completion: NaiveDateTime,
}

impl ExecutionWindow {
    /// `None` if the completion would fall outside the representable calendar.
    pub fn starting_at(start: NaiveDateTime, duration: TimeDelta) -> Option<Self> {
        Some(Self {
            start,
            completion: start.checked_add_signed(duration)?,
        })
    }

    /// A window of `duration` opening `gap` after `instant`.
    pub fn following(instant: NaiveDateTime, gap: TimeDelta, duration: TimeDelta) -> Option<Self> {
        Self::starting_at(instant.checked_add_signed(gap)?, duration)
    }

    pub fn duration(&self) -> TimeDelta {
        self.completion - self.start
    }

    pub fn shifted(self, delta: TimeDelta) -> Option<Self> {
        Some(Self {
            start: self.start.checked_add_signed(delta)?,
            completion: self.completion.checked_add_signed(delta)?,
        })
    }
}

pub fn parse_timestamp(column: &'static str, value: &str) -> Result<NaiveDateTime, TimeParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT).map_err(|_| TimeParseError {
        column,
        value: value.to_string(),
    })
}

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Convert fractional seconds to a delta, rounded to the microsecond.
pub fn seconds(value: f64) -> TimeDelta {
    TimeDelta::microseconds((value * 1_000_000.0).round() as i64)
}

/// Convert fractional minutes to a delta, rounded to the microsecond.
pub fn minutes(value: f64) -> TimeDelta {
    seconds(value * 60.0)
}

impl EventRow {
    pub fn window(&self) -> Result<ExecutionWindow, TimeParseError> {
        Ok(ExecutionWindow {
            start: parse_timestamp(START_TIME, self.start_time())?,
            completion: parse_timestamp(COMPLETION_TIME, self.completion_time())?,
        })
    }

    /// Overwrite both timestamps of this row.
    pub fn set_window(&mut self, window: ExecutionWindow) {
        self.set(START_TIME, format_timestamp(&window.start));
        self.set(COMPLETION_TIME, format_timestamp(&window.completion));
    }
}

/// Parse both timestamps of a row.
///
/// A malformed row is logged and reported as `None`; callers skip whatever depended on it.
pub fn parse_times(row: &EventRow) -> Option<ExecutionWindow> {
    match row.window() {
        Ok(window) => Some(window),
        Err(e) => {
            log::warn!(
                "Time parse error in case {} for task {}: {}",
                row.case_id(),
                row.task(),
                e
            );
            None
        }
    }
}

/// Move a row by `delta`.
///
/// Returns false, leaving the row untouched, if its timestamps are malformed or the shift would
/// leave the representable calendar.
pub fn shift_row_time(row: &mut EventRow, delta: TimeDelta) -> bool {
    let Some(window) = parse_times(row) else {
        return false;
    };
    match window.shifted(delta) {
        Some(shifted) => {
            row.set_window(shifted);
            true
        }
        None => {
            log::warn!(
                "Shifting case {} task {} by {} overflows the calendar",
                row.case_id(),
                row.task(),
                delta
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn ts(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 7)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micro)
            .unwrap()
    }

    #[test]
    fn parse_and_format_keep_microseconds() {
        let parsed = parse_timestamp(START_TIME, "2021-06-07 09:15:30.250000").unwrap();
        assert_eq!(parsed, ts(9, 15, 30, 250_000));
        assert_eq!(format_timestamp(&parsed), "2021-06-07 09:15:30.250000");
    }

    #[test]
    fn parse_accepts_missing_fraction() {
        assert_eq!(
            parse_timestamp(START_TIME, "2021-06-07 09:15:30").unwrap(),
            ts(9, 15, 30, 0)
        );
    }

    #[test]
    fn parse_rejects_other_layouts() {
        let err = parse_timestamp(START_TIME, "07/06/2021 09:15").unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot parse start_time `07/06/2021 09:15`"
        );
    }

    #[test]
    fn fractional_seconds_round_to_microseconds() {
        assert_eq!(seconds(1.5), TimeDelta::milliseconds(1500));
        assert_eq!(seconds(0.0000004), TimeDelta::zero());
        assert_eq!(minutes(2.0), TimeDelta::seconds(120));
        assert_eq!(seconds(-2.0), TimeDelta::seconds(-2));
    }

    #[test]
    fn shift_moves_both_timestamps() {
        let mut row = EventRow::new(
            "1",
            "a",
            "r",
            "2021-06-07 09:00:00.000000",
            "2021-06-07 09:10:00.000000",
        );
        assert!(shift_row_time(&mut row, TimeDelta::minutes(5)));
        assert_eq!(row.start_time(), "2021-06-07 09:05:00.000000");
        assert_eq!(row.completion_time(), "2021-06-07 09:15:00.000000");

        assert!(shift_row_time(&mut row, seconds(-1.0)));
        assert_eq!(row.start_time(), "2021-06-07 09:04:59.000000");
    }

    #[test]
    fn shift_of_malformed_row_is_a_no_op() {
        let mut row = EventRow::new("1", "a", "r", "not a time", "2021-06-07 09:10:00.000000");
        let before = row.clone();
        assert!(!shift_row_time(&mut row, TimeDelta::minutes(5)));
        assert_eq!(row, before);
    }

    #[test]
    fn window_duration() {
        let window = ExecutionWindow::starting_at(ts(9, 0, 0, 0), TimeDelta::minutes(15)).unwrap();
        assert_eq!(window.completion, ts(9, 15, 0, 0));
        assert_eq!(window.duration(), TimeDelta::minutes(15));

        let following =
            ExecutionWindow::following(window.completion, seconds(30.0), TimeDelta::minutes(5));
        assert_eq!(
            following,
            Some(ExecutionWindow {
                start: ts(9, 15, 30, 0),
                completion: ts(9, 20, 30, 0),
            })
        );
    }

    #[test]
    fn windows_past_the_calendar_are_none() {
        let huge = seconds(1e13);
        assert_eq!(ExecutionWindow::starting_at(ts(9, 0, 0, 0), huge), None);
        assert_eq!(
            ExecutionWindow::following(ts(9, 0, 0, 0), huge, TimeDelta::zero()),
            None
        );
    }

    #[test]
    fn shift_past_the_calendar_is_a_no_op() {
        let mut row = EventRow::new(
            "1",
            "a",
            "r",
            "2021-06-07 09:00:00.000000",
            "2021-06-07 09:10:00.000000",
        );
        let before = row.clone();
        assert!(!shift_row_time(&mut row, seconds(1e13)));
        assert_eq!(row, before);
    }
}
