//! Post-processing of finished simulation event logs.
//!
//! A [Pipeline] injects rework into the cases of a log and then drops the cases that fail the
//! calendar filters. Every random decision is drawn from one generator passed in by the caller.

pub mod config;
pub mod filter;
pub mod model;
pub mod pipeline;
pub mod scenario;

pub use config::{
    CalendarPeriod, ConfigError, InsertedLoopScenario, LongReworkScenario, PostprocessConfig,
    SingleReworkScenario, WorkingHours,
};
pub use filter::{
    apply_filter, CaseFilter, CompletenessFilter, FilterChain, WeekdayFilter, WorkingHoursFilter,
};
pub use model::{PipelineReport, StageOutcome, StageReport};
pub use pipeline::{run, Pipeline};
pub use scenario::{
    apply_injector, InsertedLoop, LongRework, LongReworkKind, ReworkInjector, SingleRework,
};
