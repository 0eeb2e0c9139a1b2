//! CLI argument definitions for logwarden-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use logwarden_core::config::LogwardenConfig;

/// logwarden log monitoring daemon.
///
/// Watches the configured log sources, groups matched lines into
/// incidents, and delivers one report per incident.
#[derive(Parser, Debug)]
#[command(name = "logwarden-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logwarden.toml configuration file.
    #[arg(short, long, default_value = "/etc/logwarden/logwarden.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file, print it with secrets redacted, and exit.
    #[arg(long)]
    pub validate: bool,

    /// Stop every monitor at the end of its stream instead of reconnecting.
    #[arg(long)]
    pub oneshot: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut LogwardenConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
        if self.oneshot {
            config.general.oneshot = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = DaemonCli::parse_from(["logwarden-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/logwarden/logwarden.toml"));
        assert!(!cli.validate);
        assert!(!cli.oneshot);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_overrides_take_precedence() {
        // Given: CLI flags for level, format, pid file and oneshot
        let cli = DaemonCli::parse_from([
            "logwarden-daemon",
            "--config",
            "/tmp/lw.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--pid-file",
            "/tmp/lw.pid",
            "--oneshot",
        ]);
        let mut config = LogwardenConfig::default();

        // When: Applying overrides
        cli.apply_overrides(&mut config);

        // Then: Config reflects every flag
        assert_eq!(cli.config, PathBuf::from("/tmp/lw.toml"));
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.general.pid_file, "/tmp/lw.pid");
        assert!(config.general.oneshot);
    }

    #[test]
    fn test_absent_flags_keep_config_values() {
        let cli = DaemonCli::parse_from(["logwarden-daemon"]);
        let mut config = LogwardenConfig::default();
        config.general.log_level = "warn".to_owned();

        cli.apply_overrides(&mut config);

        assert_eq!(config.general.log_level, "warn");
        assert!(!config.general.oneshot);
    }
}
