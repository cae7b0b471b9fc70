use crate::config::{ConfigError, PostprocessConfig, WorkingHours};
use crate::model::{StageOutcome, StageReport};
use chrono::{Datelike, NaiveTime, Weekday};
use itertools::Itertools;
use rework_event_log::{group_by_case, parse_times, parse_timestamp, EventRow, COMPLETION_TIME};

/// Admits or drops a whole case.
pub trait CaseFilter {
    fn name(&self) -> String;

    fn admit(&self, case_id: &str, rows: &[EventRow]) -> bool;
}

/// Run a filter over every case of a log. Admitted cases keep their rows and order untouched.
pub fn apply_filter(filter: &dyn CaseFilter, rows: Vec<EventRow>) -> StageOutcome {
    let stage = filter.name();
    if rows.is_empty() {
        log::info!("No rows to filter for {stage}");
        return StageOutcome {
            report: StageReport::empty(stage),
            rows,
        };
    }

    let rows_in = rows.len();
    let cases = group_by_case(rows);
    let cases_in = cases.len();

    let mut cases_out = 0;
    let mut output = Vec::with_capacity(rows_in);
    for case in cases {
        if filter.admit(&case.id, &case.rows) {
            cases_out += 1;
            output.extend(case.rows);
        } else {
            log::debug!("Case {} filtered out by {stage}", case.id);
        }
    }

    log::info!("{stage} kept {cases_out} of {cases_in} cases");

    StageOutcome {
        report: StageReport {
            stage,
            rows_in,
            rows_out: output.len(),
            cases_in,
            cases_out,
            cases_affected: cases_in - cases_out,
        },
        rows: output,
    }
}

/// Drops cases with any row starting or completing outside the daily working hours.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingHoursFilter {
    start: NaiveTime,
    end: NaiveTime,
}

impl WorkingHoursFilter {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

impl From<&WorkingHours> for WorkingHoursFilter {
    fn from(hours: &WorkingHours) -> Self {
        Self::new(hours.start, hours.end)
    }
}

impl CaseFilter for WorkingHoursFilter {
    fn name(&self) -> String {
        format!("working_hours[{}-{}]", self.start, self.end)
    }

    fn admit(&self, case_id: &str, rows: &[EventRow]) -> bool {
        rows.iter().all(|row| {
            let Some(window) = parse_times(row) else {
                return false;
            };
            let (start, end) = (window.start.time(), window.completion.time());
            let inside = self.contains(start) && self.contains(end);
            if !inside {
                log::debug!(
                    "Case {case_id} has task {} outside working hours ({start} - {end})",
                    row.task()
                );
            }
            inside
        })
    }
}

/// Drops cases whose first end task did not complete on an allowed weekday.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekdayFilter {
    allowed: Vec<Weekday>,
    end_tasks: Vec<String>,
}

impl WeekdayFilter {
    pub fn new(allowed: Vec<Weekday>, end_tasks: Vec<String>) -> Self {
        Self { allowed, end_tasks }
    }
}

impl CaseFilter for WeekdayFilter {
    fn name(&self) -> String {
        format!(
            "weekdays[{}]",
            self.allowed
                .iter()
                .map(|day| day.num_days_from_monday())
                .join(",")
        )
    }

    fn admit(&self, case_id: &str, rows: &[EventRow]) -> bool {
        let Some(end_row) = rows
            .iter()
            .find(|row| self.end_tasks.iter().any(|task| task == row.task()))
        else {
            log::debug!("Case {case_id} has no end task");
            return false;
        };

        match parse_timestamp(COMPLETION_TIME, end_row.completion_time()) {
            Ok(completed) => {
                let weekday = completed.weekday();
                let allowed = self.allowed.contains(&weekday);
                if !allowed {
                    log::debug!(
                        "Case {case_id} completed on weekday {} which is not allowed",
                        weekday.num_days_from_monday()
                    );
                }
                allowed
            }
            Err(e) => {
                log::warn!("Case {case_id} end task: {e}");
                false
            }
        }
    }
}

/// Keeps cases that reached at least one end task.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessFilter {
    end_tasks: Vec<String>,
}

impl CompletenessFilter {
    pub fn new(end_tasks: Vec<String>) -> Self {
        Self { end_tasks }
    }
}

impl CaseFilter for CompletenessFilter {
    fn name(&self) -> String {
        "complete_cases".to_string()
    }

    fn admit(&self, _case_id: &str, rows: &[EventRow]) -> bool {
        rows.iter()
            .any(|row| self.end_tasks.iter().any(|task| task == row.task()))
    }
}

/// The calendar filters, applied in a fixed order: working hours (when configured), weekday,
/// completeness.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    working_hours: Option<WorkingHoursFilter>,
    weekday: WeekdayFilter,
    completeness: CompletenessFilter,
}

impl FilterChain {
    pub fn new(
        working_hours: Option<WorkingHoursFilter>,
        weekday: WeekdayFilter,
        completeness: CompletenessFilter,
    ) -> Self {
        Self {
            working_hours,
            weekday,
            completeness,
        }
    }

    pub fn from_config(config: &PostprocessConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.working_hours.as_ref().map(WorkingHoursFilter::from),
            WeekdayFilter::new(config.weekdays()?, config.end_tasks.clone()),
            CompletenessFilter::new(config.end_tasks.clone()),
        ))
    }

    pub fn filters(&self) -> Vec<&dyn CaseFilter> {
        let mut filters: Vec<&dyn CaseFilter> = Vec::with_capacity(3);
        if let Some(working_hours) = &self.working_hours {
            filters.push(working_hours);
        }
        filters.push(&self.weekday);
        filters.push(&self.completeness);
        filters
    }

    pub fn apply(&self, rows: Vec<EventRow>) -> (Vec<EventRow>, Vec<StageReport>) {
        let mut reports = Vec::new();
        let rows = self.filters().into_iter().fold(rows, |rows, filter| {
            let outcome = apply_filter(filter, rows);
            reports.push(outcome.report);
            outcome.rows
        });
        (rows, reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A row in June 2021, with `start` and `end` given as "DD HH:MM:SS".
    fn at(case_id: &str, task: &str, start: &str, end: &str) -> EventRow {
        let start = format!("2021-06-{start}");
        let end = format!("2021-06-{end}");
        EventRow::new(case_id, task, "", &start, &end)
    }

    fn end_tasks() -> Vec<String> {
        vec!["application_approved".to_string()]
    }

    fn workdays() -> Vec<Weekday> {
        vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]
    }

    fn office_hours() -> WorkingHoursFilter {
        WorkingHoursFilter::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
    }

    fn case_ids(rows: &[EventRow]) -> Vec<&str> {
        rows.iter().map(EventRow::case_id).dedup().collect()
    }

    #[test]
    fn sunday_completion_is_dropped() {
        let sunday = at("1", "application_approved", "06 10:00:00", "06 10:00:00");

        let outcome = apply_filter(&WeekdayFilter::new(workdays(), end_tasks()), vec![sunday]);

        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.report.cases_affected, 1);
    }

    #[test]
    fn weekday_uses_first_end_task_completion() {
        let rows = vec![
            at("1", "application_approved", "04 16:00:00", "04 16:30:00"),
            at("1", "application_approved", "05 09:00:00", "05 09:10:00"),
            at("2", "review_application", "07 09:00:00", "07 09:10:00"),
        ];

        let outcome = apply_filter(&WeekdayFilter::new(workdays(), end_tasks()), rows);

        // Friday completion admits case 1; case 2 never finished
        assert_eq!(case_ids(&outcome.rows), vec!["1"]);
        assert_eq!(outcome.rows.len(), 2);
    }

    #[test]
    fn completeness_keeps_only_finished_cases() {
        let rows = vec![
            at("1", "review_application", "07 09:00:00", "07 09:10:00"),
            at("2", "review_application", "07 09:00:00", "07 09:10:00"),
            at("2", "application_approved", "07 09:20:00", "07 09:20:00"),
        ];

        let outcome = apply_filter(&CompletenessFilter::new(end_tasks()), rows);

        assert_eq!(case_ids(&outcome.rows), vec!["2"]);
        assert_eq!(
            outcome.report,
            StageReport {
                stage: "complete_cases".to_string(),
                rows_in: 3,
                rows_out: 2,
                cases_in: 2,
                cases_out: 1,
                cases_affected: 1,
            }
        );
    }

    #[test]
    fn working_hours_bounds_are_inclusive() {
        let filter = office_hours();
        let inside = at("1", "review_application", "07 08:00:00", "07 17:00:00");
        let late = at("2", "credit_check", "07 16:30:00", "07 17:00:00.000001");
        let early = at("3", "review_application", "07 07:59:59", "07 08:30:00");

        assert!(filter.admit("1", &[inside]));
        assert!(!filter.admit("2", &[late]));
        assert!(!filter.admit("3", &[early]));
    }

    #[test]
    fn working_hours_drop_case_with_unparseable_row() {
        let rows = [
            at("1", "review_application", "07 09:00:00", "07 09:10:00"),
            at("1", "credit_check", "tomorrow", "07 09:30:00"),
        ];
        assert!(!office_hours().admit("1", &rows));
    }

    #[test]
    fn filters_pass_empty_log_through() {
        let outcome = apply_filter(&CompletenessFilter::new(end_tasks()), Vec::new());
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.report.cases_in, 0);
    }

    #[test]
    fn chain_skips_unconfigured_working_hours() {
        let config = PostprocessConfig::default();
        let chain = FilterChain::from_config(&config).unwrap();
        let names = chain
            .filters()
            .iter()
            .map(|filter| filter.name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["weekdays[0,1,2,3,4]", "complete_cases"]);
    }

    #[test]
    fn chain_output_is_a_subset_of_its_input() {
        let config = PostprocessConfig {
            working_hours: Some(WorkingHours {
                start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            }),
            end_tasks: end_tasks(),
            ..PostprocessConfig::default()
        };
        let rows = vec![
            // after hours
            at("1", "application_approved", "07 18:00:00", "07 18:05:00"),
            // Saturday
            at("2", "application_approved", "05 10:00:00", "05 10:05:00"),
            // incomplete
            at("3", "review_application", "07 10:00:00", "07 10:05:00"),
            at("4", "review_application", "07 10:00:00", "07 10:05:00"),
            at("4", "application_approved", "07 11:00:00", "07 11:05:00"),
        ];
        let input_ids = group_by_case(rows.clone())
            .case_ids()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let (rows, reports) = FilterChain::from_config(&config).unwrap().apply(rows);

        assert_eq!(case_ids(&rows), vec!["4"]);
        assert!(case_ids(&rows)
            .iter()
            .all(|id| input_ids.iter().any(|input| input == id)));
        assert_eq!(
            reports
                .iter()
                .map(|report| report.cases_affected)
                .collect::<Vec<_>>(),
            vec![1, 2, 0]
        );
    }
}
