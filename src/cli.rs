//! Minimal CLI parsing for run mode overrides.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::app_mode::RunMode;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub run_mode_override: Option<RunMode>,
    pub dry_run: bool,
    pub verbose: bool,
    pub interval_override: Option<Duration>,
    /// Where a dry run writes its plan; setting it implies `--dry-run`
    pub plan_dir: Option<PathBuf>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    /// Parse arguments (without the program name). Unknown ones are ignored.
    pub fn parse<I>(args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut options = CliOptions::default();
        let mut args = args.into_iter().map(Into::<String>::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--once" => options.run_mode_override = Some(RunMode::Once),
                "--watch" => options.run_mode_override = Some(RunMode::Watch),
                "--dry-run" => options.dry_run = true,
                "--verbose" | "-v" => options.verbose = true,
                "--interval" => {
                    if let Some(value) = args.next() {
                        options.interval_override = parse_interval(&value);
                    }
                }
                "--plan" => {
                    if let Some(value) = args.next() {
                        options.set_plan_dir(&value);
                    }
                }
                "--run-mode" => {
                    if let Some(value) = args.next() {
                        options.run_mode_override = RunMode::from_arg(&value);
                    }
                }
                _ if arg.starts_with("--interval=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.interval_override = parse_interval(value);
                    }
                }
                _ if arg.starts_with("--plan=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.set_plan_dir(value);
                    }
                }
                _ if arg.starts_with("--run-mode=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.run_mode_override = RunMode::from_arg(value);
                    }
                }
                _ => {}
            }
        }
        options
    }

    fn set_plan_dir(&mut self, value: &str) {
        if !value.is_empty() {
            self.plan_dir = Some(PathBuf::from(value));
            self.dry_run = true;
        }
    }

    /// Final run mode: a dry run is always a single pass
    pub fn run_mode(&self, from_env: RunMode) -> RunMode {
        if self.dry_run {
            return RunMode::Once;
        }
        self.run_mode_override.unwrap_or(from_env)
    }
}

fn parse_interval(value: &str) -> Option<Duration> {
    value
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
