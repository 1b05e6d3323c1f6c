//! SSH settings for the remote session, loaded via `ortho-config`.
//!
//! Values merge defaults, `kiln.toml` discovery, and `KILN_SSH_*`
//! environment variables. The defaults target freshly booted cloud
//! instances: batch mode, no host key pinning, and the `ubuntu` login.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use super::SessionError;

/// SSH settings used to reach the build instance.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "KILN_SSH",
    discovery(
        app_name = "kiln",
        env_var = "KILN_CONFIG_PATH",
        config_file_name = "kiln.toml",
        dotfile_name = ".kiln.toml",
        project_file_name = "kiln.toml"
    )
)]
pub struct SessionConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub ssh_user: String,
    /// TCP port of the remote SSH daemon.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; disabled by default because
    /// build instances are ephemeral.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Per-attempt TCP connect timeout handed to `ssh`.
    #[ortho_config(default = 30)]
    pub connect_timeout_secs: u64,
    /// Number of connection attempts before giving up.
    #[ortho_config(default = 30)]
    pub connect_attempts: u32,
    /// Delay between connection attempts.
    #[ortho_config(default = 10)]
    pub connect_backoff_secs: u64,
}

/// Errors raised when loading the session configuration from layered
/// sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SessionConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("session configuration parsing failed: {0}")]
    Parse(String),
}

impl SessionConfig {
    /// Ensures configuration values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when a required field is empty
    /// or a counter is zero.
    pub fn validate(&self) -> Result<(), SessionError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        if self.ssh_port == 0 {
            return Err(SessionError::InvalidConfig {
                field: String::from("ssh_port"),
            });
        }
        if self.connect_attempts == 0 {
            return Err(SessionError::InvalidConfig {
                field: String::from("connect_attempts"),
            });
        }
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SessionConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("kiln")])
            .map_err(|err| SessionConfigLoadError::Parse(err.to_string()))
    }

    /// Delay between connection attempts.
    #[must_use]
    pub const fn connect_backoff(&self) -> Duration {
        Duration::from_secs(self.connect_backoff_secs)
    }

    fn require_value(value: &str, field: &str) -> Result<(), SessionError> {
        if value.trim().is_empty() {
            return Err(SessionError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
