//! Command line and environment configuration for the daemon.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use watchpost_core::error::ConfigError;
use watchpost_core::Settings;

use crate::scheduler::SchedulerOptions;

/// Daemon command line; every value can also come from a `WATCHPOST_*` variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "watchpost-daemon", version, about = "Runs scheduled validations")]
pub struct Args {
    /// TOML settings file; flags and environment override its values.
    #[arg(long, env = "WATCHPOST_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Root directory holding `validations/`.
    #[arg(long, env = "WATCHPOST_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Only these validations run (comma separated).
    #[arg(long, env = "WATCHPOST_RUN_ONLY_VALIDATIONS", value_delimiter = ',')]
    pub run_only_validations: Vec<String>,

    /// Validations that never run (comma separated).
    #[arg(long, env = "WATCHPOST_SKIP_VALIDATIONS", value_delimiter = ',')]
    pub skip_validations: Vec<String>,

    /// Default for `notification.add_to_history`.
    #[arg(long, env = "WATCHPOST_APPEND_NOTIFICATION_TO_HISTORY")]
    pub append_notification_to_history: Option<bool>,

    /// Notifier identifiers (comma separated).
    #[arg(long, env = "WATCHPOST_NOTIFIERS", value_delimiter = ',')]
    pub notifiers: Vec<String>,

    /// Dispatch loop tick in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    pub tick_ms: u64,

    /// Seconds between checks of validation files for changes.
    #[arg(long, env = "WATCHPOST_RELOAD_INTERVAL_SECS", default_value_t = 15)]
    pub reload_interval_secs: u64,

    /// Run each fired validation on its own blocking thread.
    #[arg(long, env = "WATCHPOST_THREADED")]
    pub threaded: bool,

    /// Log level (env-filter syntax).
    #[arg(long, env = "WATCHPOST_LOG", default_value = "info")]
    pub log: String,
}

impl Args {
    /// Settings from the optional file with command line values applied on top.
    pub fn resolve_settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = match &self.settings {
            Some(path) => Settings::load_from(path)?,
            None => Settings::default(),
        };
        if let Some(directory) = &self.directory {
            settings.directory = directory.clone();
        }
        if !self.run_only_validations.is_empty() {
            settings.run_only_validations = self.run_only_validations.clone();
        }
        if !self.skip_validations.is_empty() {
            settings.skip_validations = self.skip_validations.clone();
        }
        if let Some(append) = self.append_notification_to_history {
            settings.append_notification_to_history = append;
        }
        if !self.notifiers.is_empty() {
            settings.notifiers = self.notifiers.clone();
        }
        Ok(settings)
    }

    /// Loop timing and threading from the flags.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            tick: Duration::from_millis(self.tick_ms.max(1)),
            reload_interval: Duration::from_secs(self.reload_interval_secs.max(1)),
            threaded: self.threaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_file_values() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "directory = \"/from/file\"").unwrap();
        writeln!(f, "skip_validations = [\"file_skip\"]").unwrap();
        let path = f.path().to_str().unwrap().to_string();

        let args = Args::try_parse_from([
            "watchpost-daemon",
            "--settings",
            path.as_str(),
            "--directory",
            "/from/flag",
            "--run-only-validations",
            "a,b",
        ])
        .unwrap();
        let settings = args.resolve_settings().unwrap();
        assert_eq!(settings.directory, PathBuf::from("/from/flag"));
        assert_eq!(settings.run_only_validations, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(settings.skip_validations, vec!["file_skip".to_string()]);
    }

    #[test]
    fn scheduler_options_from_flags() {
        let args = Args::try_parse_from(["watchpost-daemon", "--threaded", "--tick-ms", "250"]).unwrap();
        let options = args.scheduler_options();
        assert!(options.threaded);
        assert_eq!(options.tick, Duration::from_millis(250));
        assert_eq!(options.reload_interval, Duration::from_secs(15));
    }
}
