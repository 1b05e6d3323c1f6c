//! Error types for the provisioning pipeline.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::session::SessionError;

/// Errors raised while validating or applying a provisioning plan.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when a step's local source file does not exist.
    #[error("step {number}: local source {path} not found")]
    MissingSource {
        /// 1-based step number.
        number: usize,
        /// Expected source location.
        path: Utf8PathBuf,
    },
    /// Raised when a file step targets a relative remote path.
    #[error("step {number}: deployment destination {remote} must be an absolute path")]
    RelativeDestination {
        /// 1-based step number.
        number: usize,
        /// Offending destination.
        remote: String,
    },
    /// Raised when the remote scratch directory cannot be created.
    #[error("failed to prepare remote directory {path}")]
    Scratch {
        /// Remote scratch directory.
        path: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// Raised when a step fails on the remote host.
    #[error("step {number} ({name}) failed")]
    Step {
        /// 1-based step number.
        number: usize,
        /// Script or file name.
        name: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
}

impl ProvisionError {
    /// Returns `true` for errors detectable before touching the remote host.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingSource { .. } | Self::RelativeDestination { .. }
        )
    }
}
