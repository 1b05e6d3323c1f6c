//! Authenticated remote shell on the build instance.
//!
//! The session drives the system `ssh` client: every command and upload is
//! a separate `ssh` invocation against the same host, user, and identity.
//! Connecting probes the host until it accepts the key, so callers only see
//! a session once the instance is actually reachable. Uploads speak the
//! `scp -t` sink protocol over the ssh channel rather than shelling out to
//! a local `scp`.

use std::ffi::OsString;
use std::io::Read;
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::{debug, info, warn};

mod config;
mod identity;
mod transfer;
mod types;
mod util;

pub use config::{SessionConfig, SessionConfigLoadError};
pub use identity::{Identity, KeyFormat};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, StreamingCommandRunner};
pub use util::expand_tilde;

/// Errors surfaced while connecting to or driving the remote host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set KILN_SSH_{env_suffix} or add {field} to kiln.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when the private key cannot be used.
    #[error("unusable SSH private key {path}: {message}")]
    Identity {
        /// Key location after tilde expansion.
        path: Utf8PathBuf,
        /// Reason the key was rejected.
        message: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when every connection attempt failed.
    #[error("could not connect to {host} after {attempts} attempts: {last_error}")]
    ConnectionTimeout {
        /// Host that never accepted the connection.
        host: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error reported by the final attempt.
        last_error: String,
    },
    /// Raised when an operation is attempted on a closed session.
    #[error("session to {host} is not connected")]
    NotConnected {
        /// Host the session pointed at.
        host: String,
    },
    /// Raised when a remote command exits non-zero.
    #[error("remote command `{command}` {reason} (exit status {status_text}): {stderr}")]
    Command {
        /// Command line executed remotely.
        command: String,
        /// Short description of what went wrong.
        reason: String,
        /// Exit status as reported by `ssh`.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when a file upload fails.
    #[error("failed to upload {local} to {remote}: {message}")]
    Transfer {
        /// Local source file.
        local: Utf8PathBuf,
        /// Remote destination path.
        remote: String,
        /// Reason reported by the local reader or remote sink.
        message: String,
    },
}

/// Operations the provisioning pipeline needs from a remote host.
pub trait RemoteShell {
    /// Runs `command` remotely, failing on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Command`] on non-zero exit, or a transport
    /// error when the command could not be delivered.
    fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Copies `local` to the remote path `remote`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transfer`] when the file cannot be read or the
    /// remote side rejects it.
    fn upload(&mut self, local: &Utf8Path, remote: &str) -> Result<(), SessionError>;

    /// Marks the remote file executable and runs it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Command`] when either step exits non-zero.
    fn run_script(&mut self, remote_path: &str) -> Result<(), SessionError>;

    /// Releases the session. Safe to call more than once.
    fn close(&mut self);
}

/// Opens remote sessions for a given host and key.
pub trait Connector {
    /// Session type produced by this connector.
    type Session: RemoteShell;

    /// Connects to `host` authenticating with the key at `identity_path`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Identity`] for unusable keys and
    /// [`SessionError::ConnectionTimeout`] when the host never accepts the
    /// connection.
    fn connect(&self, host: &str, identity_path: &str) -> Result<Self::Session, SessionError>;

    /// Checks that the key at `identity_path` could be used by [`connect`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Identity`] when the key is missing or
    /// unusable.
    ///
    /// [`connect`]: Connector::connect
    fn check_identity(&self, identity_path: &str) -> Result<(), SessionError>;
}

/// Connector that opens [`RemoteSession`]s through the system `ssh` client.
#[derive(Clone, Debug)]
pub struct SshConnector<R: CommandRunner> {
    config: SessionConfig,
    runner: R,
}

impl<R: CommandRunner + Clone> SshConnector<R> {
    /// Creates a connector using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when validation fails.
    pub fn new(config: SessionConfig, runner: R) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self { config, runner })
    }
}

impl<R: CommandRunner + Clone> Connector for SshConnector<R> {
    type Session = RemoteSession<R>;

    fn connect(&self, host: &str, identity_path: &str) -> Result<Self::Session, SessionError> {
        RemoteSession::connect(self.config.clone(), self.runner.clone(), host, identity_path)
    }

    fn check_identity(&self, identity_path: &str) -> Result<(), SessionError> {
        Identity::load(identity_path).map(drop)
    }
}

/// A connected shell on one remote host.
#[derive(Debug)]
pub struct RemoteSession<R: CommandRunner> {
    config: SessionConfig,
    runner: R,
    identity: Identity,
    host: String,
    connected: bool,
}

impl<R: CommandRunner> RemoteSession<R> {
    /// Loads the key and probes `host` until it accepts a connection.
    ///
    /// Attempts are spaced by the configured backoff; the error from the
    /// final attempt is carried in [`SessionError::ConnectionTimeout`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`], [`SessionError::Identity`],
    /// or [`SessionError::ConnectionTimeout`].
    pub fn connect(
        config: SessionConfig,
        runner: R,
        host: &str,
        identity_path: &str,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let identity = Identity::load(identity_path)?;
        let mut session = Self {
            config,
            runner,
            identity,
            host: host.to_owned(),
            connected: false,
        };
        session.establish()?;
        Ok(session)
    }

    /// Host this session targets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the session is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn establish(&mut self) -> Result<(), SessionError> {
        let attempts = self.config.connect_attempts;
        let backoff = self.config.connect_backoff();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.probe() {
                Ok(()) => {
                    info!(host = %self.host, attempt, "SSH connection established");
                    self.connected = true;
                    return Ok(());
                }
                Err(message) => {
                    warn!(
                        host = %self.host,
                        attempt,
                        max_attempts = attempts,
                        "SSH connection attempt failed: {message}"
                    );
                    last_error = message;
                    if attempt < attempts {
                        thread::sleep(backoff);
                    }
                }
            }
        }

        Err(SessionError::ConnectionTimeout {
            host: self.host.clone(),
            attempts,
            last_error,
        })
    }

    fn probe(&self) -> Result<(), String> {
        let args = self.ssh_args("true");
        let output = self
            .runner
            .run(&self.config.ssh_bin, &args)
            .map_err(|err| err.to_string())?;
        if output.is_success() {
            return Ok(());
        }
        let stderr = output.stderr.trim();
        Err(if stderr.is_empty() {
            format!("ssh exited with status {}", output.status_text())
        } else {
            stderr.to_owned()
        })
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected {
                host: self.host.clone(),
            })
        }
    }

    fn execute(&self, command: &str, reason: &str) -> Result<CommandOutput, SessionError> {
        self.ensure_connected()?;
        info!(host = %self.host, "Executing command: {command}");
        let args = self.ssh_args(command);
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        if output.is_success() {
            return Ok(output);
        }

        Err(SessionError::Command {
            command: command.to_owned(),
            reason: reason.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })
    }

    fn ssh_args(&self, remote_command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
            OsString::from("-i"),
            OsString::from(self.identity.path().as_str()),
            OsString::from("-o"),
            OsString::from(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout_secs
            )),
        ];

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from(format!(
            "{}@{}",
            self.config.ssh_user, self.host
        )));
        args.push(OsString::from(remote_command));
        args
    }
}

impl<R: CommandRunner> RemoteShell for RemoteSession<R> {
    fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        self.execute(command, "failed")
    }

    fn upload(&mut self, local: &Utf8Path, remote: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let transfer_error = |message: String| SessionError::Transfer {
            local: local.to_path_buf(),
            remote: remote.to_owned(),
            message,
        };

        let file = util::open_local(local).map_err(|err| transfer_error(err.to_string()))?;
        let size = file
            .metadata()
            .map_err(|err| transfer_error(err.to_string()))?
            .len();
        info!("Uploading {local} to {remote} ({size} bytes)");

        let header = transfer::copy_header(transfer::UPLOAD_MODE, size, remote);
        let mut payload = transfer::framed(header, file);
        let sink = format!("scp -t {}", escape(remote.into()));
        let args = self.ssh_args(&sink);
        let output = self.runner.run_with_input(
            &self.config.ssh_bin,
            &args,
            &mut payload as &mut dyn Read,
        )?;

        if let Some(message) = transfer::sink_error(&output.stdout) {
            return Err(transfer_error(message));
        }
        if !output.is_success() {
            let stderr = output.stderr.trim();
            return Err(transfer_error(if stderr.is_empty() {
                format!("scp exited with status {}", output.status_text())
            } else {
                stderr.to_owned()
            }));
        }
        Ok(())
    }

    fn run_script(&mut self, remote_path: &str) -> Result<(), SessionError> {
        let quoted = escape(remote_path.into());
        self.execute(
            &format!("chmod +x {quoted}"),
            "failed to make script executable",
        )?;
        self.execute(&quoted, "failed")?;
        Ok(())
    }

    fn close(&mut self) {
        if self.connected {
            debug!(host = %self.host, "Closing SSH session");
            self.connected = false;
        }
    }
}
