//! Error types for the build orchestrator.

use thiserror::Error;

use super::BuildStage;
use crate::provision::ProvisionError;
use crate::session::SessionError;

/// Errors surfaced while building an image.
#[derive(Debug, Error)]
pub enum BuildError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when the build inputs are incomplete.
    #[error("invalid build input: {0}")]
    Validation(String),
    /// Raised when the provisioning plan is rejected before any remote work.
    #[error("provisioning plan rejected: {0}")]
    Plan(#[source] ProvisionError),
    /// Raised when a provider call fails.
    #[error("{stage}: provider call for {resource} failed")]
    Provider {
        /// Stage the build had reached.
        stage: BuildStage,
        /// Resource the call concerned.
        resource: String,
        /// Provider error.
        #[source]
        source: BackendError,
    },
    /// Raised when a polled resource never reaches its target state.
    #[error("{stage}: {resource} did not become ready after {attempts} polls")]
    ReadinessTimeout {
        /// Stage the build had reached.
        stage: BuildStage,
        /// Resource being polled.
        resource: String,
        /// Number of polls performed.
        attempts: u32,
    },
    /// Raised when no remote session could be opened.
    #[error("could not open a remote session to {host}")]
    Session {
        /// Host that was dialled.
        host: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// Raised when provisioning fails on the instance.
    #[error("provisioning instance {instance_id} failed: {source}")]
    Provision {
        /// Instance being provisioned.
        instance_id: u64,
        /// Underlying provisioning error.
        #[source]
        source: ProvisionError,
    },
}

impl<E> BuildError<E>
where
    E: std::error::Error + 'static,
{
    /// Stage the build had reached when the error occurred.
    #[must_use]
    pub const fn stage(&self) -> BuildStage {
        match self {
            Self::Validation(_) | Self::Plan(_) => BuildStage::Created,
            Self::Provider { stage, .. } | Self::ReadinessTimeout { stage, .. } => *stage,
            Self::Session { .. } | Self::Provision { .. } => BuildStage::InstanceReady,
        }
    }
}
