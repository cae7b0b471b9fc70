use chrono::{NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest accepted `additional_delay`, in seconds (one year).
pub const MAX_DELAY_SECONDS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Largest accepted processing time bound, in minutes (one week).
pub const MAX_PROCESSING_MINUTES: f64 = 7.0 * 24.0 * 60.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("separator must be a single ASCII character, got {0:?}")]
    Separator(String),
    #[error("{field} must be within [0, 1], got {value}")]
    Probability { field: String, value: f64 },
    #[error("{field} must be between 0 seconds and one year, got {value}")]
    Delay { field: String, value: f64 },
    #[error("{field} is required when the scenario is enabled")]
    Missing { field: String },
    #[error("{field} must be at least 1")]
    Iterations { field: String },
    #[error("{field} must be [min, max] minutes with 0 <= min <= max <= 10080, got [{min}, {max}]")]
    ProcessingTime { field: String, min: f64, max: f64 },
    #[error("allowed weekday {0} is out of range, expected 0 (Monday) to 6 (Sunday)")]
    Weekday(u8),
    #[error("working_hours end {end} is before start {start}")]
    WorkingHours { start: NaiveTime, end: NaiveTime },
    #[error("calendar_period end {end} is before start {start}")]
    CalendarPeriod {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// The post-processing section of a simulation configuration file.
///
/// Keys the post-processor does not use, such as the process model setup, are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostprocessConfig {
    #[serde(default = "default_event_log_filename")]
    pub event_log_filename: PathBuf,
    #[serde(default = "default_final_event_log_filename")]
    pub final_event_log_filename: PathBuf,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub calendar_period: Option<CalendarPeriod>,
    #[serde(default)]
    pub working_hours: Option<WorkingHours>,
    /// Monday is 0, Sunday is 6.
    #[serde(default = "default_allowed_weekdays")]
    pub allowed_weekdays: Vec<u8>,
    #[serde(default = "default_end_tasks")]
    pub end_tasks: Vec<String>,
    #[serde(default)]
    pub single_rework_scenarios: Vec<SingleReworkScenario>,
    #[serde(default)]
    pub long_rework_scenarios: Vec<LongReworkScenario>,
    #[serde(default)]
    pub inserted_loop_scenarios: Vec<InsertedLoopScenario>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// The window the external simulation covered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CalendarPeriod {
    #[serde(with = "calendar_format")]
    pub start: NaiveDateTime,
    #[serde(with = "calendar_format")]
    pub end: NaiveDateTime,
}

impl CalendarPeriod {
    pub fn minutes(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 60.0
    }
}

/// Daily bounds every task of an admitted case must start and complete within.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleReworkScenario {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub affected_activities: Vec<String>,
    #[serde(default = "default_single_rework_percentage")]
    pub rework_percentage: f64,
    /// Seconds
    #[serde(default = "default_single_additional_delay")]
    pub additional_delay: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LongReworkScenario {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_trigger_activity")]
    pub trigger_activity: String,
    /// When present, even if empty, the scenario jumps back instead of inserting a sequence.
    #[serde(default)]
    pub back_to: Option<Vec<String>>,
    #[serde(default)]
    pub sequence_of_new_activities: Vec<String>,
    #[serde(default = "default_long_rework_percentage")]
    pub rework_percentage: f64,
    /// Seconds
    #[serde(default = "default_long_additional_delay")]
    pub additional_delay: f64,
}

/// An inserted loop entry.
///
/// Everything but `target_activity` and `terminal_activities` is required once the entry is
/// enabled. Disabled entries may leave them out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsertedLoopScenario {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub after_activity: Option<String>,
    #[serde(default)]
    pub inserted_activity: Option<String>,
    /// Defaults to `after_activity`.
    #[serde(default)]
    pub target_activity: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    /// Minutes, `[min, max]`
    #[serde(default)]
    pub processing_time: Option<(f64, f64)>,
    #[serde(default)]
    pub percentage: Option<f64>,
    /// Seconds
    #[serde(default)]
    pub additional_delay: Option<f64>,
    #[serde(default = "default_terminal_activities")]
    pub terminal_activities: Vec<String>,
}

impl PostprocessConfig {
    /// Load and validate a configuration file.
    ///
    /// Files with a `.toml` extension are read as TOML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.separator_byte()?;
        self.weekdays()?;

        if let Some(hours) = &self.working_hours {
            if hours.end < hours.start {
                return Err(ConfigError::WorkingHours {
                    start: hours.start,
                    end: hours.end,
                });
            }
        }

        if let Some(period) = &self.calendar_period {
            if period.end < period.start {
                return Err(ConfigError::CalendarPeriod {
                    start: period.start,
                    end: period.end,
                });
            }
        }

        // Disabled entries are never read and are not checked.
        let single = self.single_rework_scenarios.iter().enumerate();
        for (i, scenario) in single.filter(|(_, scenario)| scenario.enabled) {
            let label = format!("single_rework_scenarios[{i}]");
            check_probability(&label, "rework_percentage", scenario.rework_percentage)?;
            check_delay(&label, "additional_delay", scenario.additional_delay)?;
        }

        let long = self.long_rework_scenarios.iter().enumerate();
        for (i, scenario) in long.filter(|(_, scenario)| scenario.enabled) {
            let label = format!("long_rework_scenarios[{i}]");
            check_probability(&label, "rework_percentage", scenario.rework_percentage)?;
            check_delay(&label, "additional_delay", scenario.additional_delay)?;
        }

        let inserted_loop = self.inserted_loop_scenarios.iter().enumerate();
        for (i, scenario) in inserted_loop.filter(|(_, scenario)| scenario.enabled) {
            scenario.check(&format!("inserted_loop_scenarios[{i}]"))?;
        }

        Ok(())
    }

    pub fn separator_byte(&self) -> Result<u8, ConfigError> {
        match self.separator.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(ConfigError::Separator(self.separator.clone())),
        }
    }

    pub fn weekdays(&self) -> Result<Vec<Weekday>, ConfigError> {
        self.allowed_weekdays
            .iter()
            .map(|&day| Weekday::try_from(day).map_err(|_| ConfigError::Weekday(day)))
            .collect()
    }

    /// Identifies the configuration a run used.
    ///
    /// Computed with [sha3::Sha3_256] over the JSON form of the configuration, so two runs with the
    /// same fingerprint applied the same scenarios and filters to their logs.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, serde_json::to_vec(self)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl InsertedLoopScenario {
    /// Check that every required field is present and within bounds.
    pub fn check(&self, label: &str) -> Result<(), ConfigError> {
        require(label, "after_activity", self.after_activity.as_ref())?;
        require(label, "inserted_activity", self.inserted_activity.as_ref())?;

        let percentage = require(label, "percentage", self.percentage)?;
        check_probability(label, "percentage", percentage)?;
        let delay = require(label, "additional_delay", self.additional_delay)?;
        check_delay(label, "additional_delay", delay)?;

        if require(label, "max_iterations", self.max_iterations)? < 1 {
            return Err(ConfigError::Iterations {
                field: format!("{label}.max_iterations"),
            });
        }

        let (min, max) = require(label, "processing_time", self.processing_time)?;
        if (0.0..=max).contains(&min) && (min..=MAX_PROCESSING_MINUTES).contains(&max) {
            Ok(())
        } else {
            Err(ConfigError::ProcessingTime {
                field: format!("{label}.processing_time"),
                min,
                max,
            })
        }
    }
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            event_log_filename: default_event_log_filename(),
            final_event_log_filename: default_final_event_log_filename(),
            separator: default_separator(),
            calendar_period: None,
            working_hours: None,
            allowed_weekdays: default_allowed_weekdays(),
            end_tasks: default_end_tasks(),
            single_rework_scenarios: Vec::new(),
            long_rework_scenarios: Vec::new(),
            inserted_loop_scenarios: Vec::new(),
            seed: None,
        }
    }
}

fn check_probability(label: &str, name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability {
            field: format!("{label}.{name}"),
            value,
        })
    }
}

/// The value of a field an enabled scenario cannot do without.
pub(crate) fn require<T>(label: &str, name: &str, value: Option<T>) -> Result<T, ConfigError> {
    value.ok_or_else(|| ConfigError::Missing {
        field: format!("{label}.{name}"),
    })
}

fn check_delay(label: &str, name: &str, value: f64) -> Result<(), ConfigError> {
    // Also rejects NaN and infinities.
    if (0.0..=MAX_DELAY_SECONDS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Delay {
            field: format!("{label}.{name}"),
            value,
        })
    }
}

fn default_event_log_filename() -> PathBuf {
    PathBuf::from("my_event_log.csv")
}

fn default_final_event_log_filename() -> PathBuf {
    PathBuf::from("my_event_log_final.csv")
}

fn default_separator() -> String {
    ";".to_string()
}

fn default_allowed_weekdays() -> Vec<u8> {
    vec![0, 1, 2, 3, 4]
}

fn default_end_tasks() -> Vec<String> {
    vec!["application_completed".to_string()]
}

fn default_single_rework_percentage() -> f64 {
    0.15
}

fn default_single_additional_delay() -> f64 {
    1.0
}

fn default_trigger_activity() -> String {
    "credit_check".to_string()
}

fn default_long_rework_percentage() -> f64 {
    0.2
}

fn default_long_additional_delay() -> f64 {
    2.0
}

fn default_terminal_activities() -> Vec<String> {
    vec![
        "application_approved".to_string(),
        "application_rejected".to_string(),
    ]
}

mod calendar_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let value = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&value, FORMAT).map_err(serde::de::Error::custom)
    }
}
