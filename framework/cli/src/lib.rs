use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct ReworkCli {
    /// Path to the scenario configuration, JSON or (with a `.toml` extension) TOML
    #[clap(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Read the base event log from this path instead of the configured `event_log_filename`
    #[clap(long)]
    pub base_log: Option<PathBuf>,

    /// Write the final event log to this path instead of the configured `final_event_log_filename`
    #[clap(long)]
    pub final_log: Option<PathBuf>,

    /// Seed for every random decision. Overrides the configured seed.
    ///
    /// When neither is given a seed is drawn from entropy and reported, so the run can be repeated.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Keep the log in memory between stages and only write the final log.
    ///
    /// By default every stage writes the final log path and the next stage reads it back.
    #[clap(long, default_value = "false")]
    pub in_memory: bool,

    /// Write a JSON report of every stage to this path
    #[clap(long)]
    pub report: Option<PathBuf>,
}

/// Initialise logging and parse the command line.
pub fn init() -> ReworkCli {
    env_logger::init();

    ReworkCli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = ReworkCli::parse_from(["rework-postprocessor"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert!(cli.base_log.is_none());
        assert!(cli.seed.is_none());
        assert!(!cli.in_memory);
    }

    #[test]
    fn overrides() {
        let cli = ReworkCli::parse_from([
            "rework-postprocessor",
            "-c",
            "loan.toml",
            "--base-log",
            "base.csv",
            "--final-log",
            "final.csv",
            "--seed",
            "42",
            "--in-memory",
            "--report",
            "report.json",
        ]);
        assert_eq!(cli.config, PathBuf::from("loan.toml"));
        assert_eq!(cli.base_log, Some(PathBuf::from("base.csv")));
        assert_eq!(cli.final_log, Some(PathBuf::from("final.csv")));
        assert_eq!(cli.seed, Some(42));
        assert!(cli.in_memory);
        assert_eq!(cli.report, Some(PathBuf::from("report.json")));
    }
}
