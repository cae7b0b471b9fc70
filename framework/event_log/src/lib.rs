use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod case;
mod time;

pub use case::{group_by_case, Case, CaseIndex};
pub use time::{
    format_timestamp, minutes, parse_timestamp, parse_times, seconds, shift_row_time,
    ExecutionWindow, TimeParseError, TIMESTAMP_FORMAT,
};

pub const CASE_ID: &str = "case_id";
pub const TASK: &str = "task";
pub const RESOURCE: &str = "resource";
pub const START_TIME: &str = "start_time";
pub const COMPLETION_TIME: &str = "completion_time";

/// The schema written when there are no rows to take a header from.
pub const DEFAULT_COLUMNS: [&str; 5] = [CASE_ID, TASK, RESOURCE, START_TIME, COMPLETION_TIME];

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Event log I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed event log: {0}")]
    Csv(#[from] csv::Error),
    #[error("Event log header is missing required column `{column}`")]
    MissingColumn { column: &'static str },
}

/// One task execution within a case.
///
/// Fields are kept in the column order of the log the row was read from, so that columns this
/// crate knows nothing about (case attributes and the like) survive every rewrite untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    fields: Vec<(String, String)>,
}

impl EventRow {
    /// Create a row with exactly the [DEFAULT_COLUMNS].
    pub fn new(
        case_id: &str,
        task: &str,
        resource: &str,
        start_time: &str,
        completion_time: &str,
    ) -> Self {
        Self::from_fields([
            (CASE_ID, case_id),
            (TASK, task),
            (RESOURCE, resource),
            (START_TIME, start_time),
            (COMPLETION_TIME, completion_time),
        ])
    }

    /// Create a row from ordered `(column, value)` pairs.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Set the value of a column, appending the column if the row does not have it yet.
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn case_id(&self) -> &str {
        self.get(CASE_ID).unwrap_or_default()
    }

    pub fn task(&self) -> &str {
        self.get(TASK).unwrap_or_default()
    }

    pub fn resource(&self) -> &str {
        self.get(RESOURCE).unwrap_or_default()
    }

    pub fn start_time(&self) -> &str {
        self.get(START_TIME).unwrap_or_default()
    }

    pub fn completion_time(&self) -> &str {
        self.get(COMPLETION_TIME).unwrap_or_default()
    }

    /// A copy of this row with a different task name.
    pub fn with_task(&self, task: &str) -> Self {
        let mut row = self.clone();
        row.set(TASK, task);
        row
    }
}

/// Load an event log from a reader.
///
/// The first record is the header. Input with no header at all is an empty log.
pub fn load_event_log<R: Read>(reader: R, separator: u8) -> Result<Vec<EventRow>, LogError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    for column in DEFAULT_COLUMNS {
        if !headers.iter().any(|header| header == column) {
            return Err(LogError::MissingColumn { column });
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(EventRow::from_fields(headers.iter().zip(record.iter())));
    }

    Ok(rows)
}

/// Load an event log from a file.
pub fn read_event_log(path: impl AsRef<Path>, separator: u8) -> Result<Vec<EventRow>, LogError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let rows = load_event_log(file, separator)?;
    log::debug!("Read {} rows from {}", rows.len(), path.display());

    Ok(rows)
}

/// Serialize rows to a writer.
///
/// The header is taken from the first row. A row that lacks one of the header columns writes an
/// empty field for it.
pub fn store_event_log<W: Write>(
    rows: &[EventRow],
    writer: W,
    separator: u8,
) -> Result<(), LogError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(separator)
        .from_writer(writer);

    let header: Vec<&str> = match rows.first() {
        Some(first) => first.columns().collect(),
        None => DEFAULT_COLUMNS.to_vec(),
    };
    writer.write_record(&header)?;

    for row in rows {
        writer.write_record(
            header
                .iter()
                .map(|column| row.get(column).unwrap_or_default()),
        )?;
    }

    writer.flush().map_err(csv::Error::from)?;

    Ok(())
}

/// Write rows to a file, replacing any existing content.
pub fn write_event_log(
    rows: &[EventRow],
    path: impl AsRef<Path>,
    separator: u8,
) -> Result<(), LogError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| LogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    store_event_log(rows, file, separator)?;
    log::debug!("Wrote {} rows to {}", rows.len(), path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_row() -> EventRow {
        EventRow::new(
            "7",
            "review_application",
            "officer1",
            "2021-06-07 09:00:00.000000",
            "2021-06-07 09:20:00.000000",
        )
    }

    #[test]
    fn accessors_read_named_columns() {
        let row = sample_row();
        assert_eq!(row.case_id(), "7");
        assert_eq!(row.task(), "review_application");
        assert_eq!(row.resource(), "officer1");
        assert_eq!(row.start_time(), "2021-06-07 09:00:00.000000");
        assert_eq!(row.completion_time(), "2021-06-07 09:20:00.000000");
        assert_eq!(row.get("amount"), None);
    }

    #[test]
    fn set_replaces_in_place_and_appends_new_columns() {
        let mut row = sample_row();
        row.set(RESOURCE, "officer2");
        row.set("amount", "1200");

        assert_eq!(row.resource(), "officer2");
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            vec![
                CASE_ID,
                TASK,
                RESOURCE,
                START_TIME,
                COMPLETION_TIME,
                "amount"
            ]
        );
    }

    #[test]
    fn with_task_keeps_other_fields() {
        let row = sample_row().with_task("credit_check");
        assert_eq!(row.task(), "credit_check");
        assert_eq!(row.resource(), "officer1");
        assert_eq!(row.start_time(), "2021-06-07 09:00:00.000000");
    }

    #[test]
    fn load_keeps_column_order() -> anyhow::Result<()> {
        let input = "amount;case_id;task;resource;start_time;completion_time\n\
                     500;1;a;r1;2021-06-07 09:00:00.000000;2021-06-07 09:10:00.000000\n";
        let rows = load_event_log(input.as_bytes(), b';')?;

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].columns().collect::<Vec<_>>(),
            vec![
                "amount",
                CASE_ID,
                TASK,
                RESOURCE,
                START_TIME,
                COMPLETION_TIME
            ]
        );
        assert_eq!(rows[0].get("amount"), Some("500"));
        Ok(())
    }

    #[test]
    fn load_empty_input_is_empty_log() -> anyhow::Result<()> {
        assert!(load_event_log("".as_bytes(), b',')?.is_empty());
        assert!(load_event_log(
            "case_id,task,resource,start_time,completion_time\n".as_bytes(),
            b','
        )?
        .is_empty());
        Ok(())
    }

    #[test]
    fn load_rejects_missing_required_column() {
        let err = load_event_log("case_id,task,resource,start_time\n".as_bytes(), b',')
            .unwrap_err();
        assert!(matches!(
            err,
            LogError::MissingColumn {
                column: COMPLETION_TIME
            }
        ));
    }

    #[test]
    fn load_rejects_short_rows() {
        let input = "case_id,task,resource,start_time,completion_time\n1,a,r\n";
        assert!(matches!(
            load_event_log(input.as_bytes(), b','),
            Err(LogError::Csv(_))
        ));
    }

    #[test]
    fn store_empty_writes_default_header() -> anyhow::Result<()> {
        let mut out = Vec::new();
        store_event_log(&[], &mut out, b';')?;
        assert_eq!(
            String::from_utf8(out)?,
            "case_id;task;resource;start_time;completion_time\n"
        );
        Ok(())
    }

    #[test]
    fn store_fills_missing_columns_with_empty_fields() -> anyhow::Result<()> {
        let mut first = sample_row();
        first.set("amount", "10");
        let second = sample_row().with_task("credit_check");

        let mut out = Vec::new();
        store_event_log(&[first, second], &mut out, b',')?;
        let text = String::from_utf8(out)?;
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(
            lines[0],
            "case_id,task,resource,start_time,completion_time,amount"
        );
        assert!(lines[2].ends_with(','));
        Ok(())
    }
}
