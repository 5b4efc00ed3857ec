//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

/// CLI argument parsing structure
#[derive(Debug, Parser)]
#[command(name = "focus-vigil")]
#[command(about = "Authoritative focus/pomodoro timer engine for the devotional dashboard")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory holding the persisted timer record
    #[arg(short, long, default_value = ".focus-vigil")]
    pub data_dir: PathBuf,

    /// Keep the timer record in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// How long a command may wait for the engine, in milliseconds
    #[arg(long, default_value = "2000")]
    pub command_timeout_ms: u64,

    /// Upper bound on how late a wake-up can fire after host sleep, in seconds
    #[arg(long, default_value = "5")]
    pub alarm_recheck_secs: u64,

    /// Attach a mirror that logs the live countdown
    #[arg(short, long)]
    pub mirror: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(1))
    }

    pub fn alarm_recheck(&self) -> Duration {
        Duration::from_secs(self.alarm_recheck_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["focus-vigil"]).unwrap();
        assert_eq!(config.address(), "127.0.0.1:20554");
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.command_timeout(), Duration::from_secs(2));
        assert!(!config.ephemeral);
    }

    #[test]
    fn zero_durations_are_floored() {
        let config = Config::try_parse_from([
            "focus-vigil",
            "--command-timeout-ms",
            "0",
            "--alarm-recheck-secs",
            "0",
            "-v",
        ])
        .unwrap();
        assert_eq!(config.command_timeout(), Duration::from_millis(1));
        assert_eq!(config.alarm_recheck(), Duration::from_secs(1));
        assert_eq!(config.log_level(), "debug");
    }
}
