//! How the program runs: a single sweep or a long-lived watcher.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Watch,
    Once,
}

impl RunMode {
    pub fn from_env() -> Self {
        env::var("RUN_MODE")
            .ok()
            .as_deref()
            .and_then(Self::from_arg)
            .unwrap_or_default()
    }

    pub fn from_arg(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "watch" | "monitor" => Some(RunMode::Watch),
            "once" | "scan" => Some(RunMode::Once),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Watch => "watch",
            RunMode::Once => "once",
        }
    }
}
