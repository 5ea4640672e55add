//! Background jobs

pub mod scanner;

pub use scanner::{PLAN_FILE, SUMMARY_FILE, Schedule, run_forever, run_once, write_plan};
