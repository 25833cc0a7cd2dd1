use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "NOTENBUCH_WORKSPACE";
pub const LOG_ENV: &str = "NOTENBUCH_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

/// Startup settings taken from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Workspace opened before the first request is read.
    pub workspace: Option<PathBuf>,
    /// `tracing` filter directive, e.g. `info` or `notenbuchd=debug`.
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::var(WORKSPACE_ENV).ok(), std::env::var(LOG_ENV).ok())
    }

    fn from_vars(workspace: Option<String>, log_filter: Option<String>) -> Self {
        let workspace = workspace
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let log_filter = log_filter
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Self {
            workspace,
            log_filter,
        }
    }
}
