//! Core library for the kiln GPU image builder.
//!
//! The crate bakes reusable machine images on Hyperstack: it creates a
//! temporary instance from a base image, provisions it over SSH, snapshots it,
//! publishes an image from the snapshot, and always deletes the instance. The
//! provider sits behind the [`ResourceBackend`] and [`Catalog`] traits, and the
//! remote shell behind [`Connector`], so the lifecycle can be exercised with
//! in-memory doubles.

pub mod authoring;
pub mod backend;
pub mod build;
pub mod catalog;
pub mod config;
pub mod config_store;
pub mod hyperstack;
pub mod poll;
pub mod provision;
pub mod report;
pub mod session;
pub mod test_support;

pub use authoring::{AuthoringError, ConfigAuthor, Prompter, TerminalPrompter, confirm_creation};
pub use backend::{
    BackendError, ImageHandle, InstanceHandle, InstanceRequest, InstanceRequestBuilder,
    ResourceBackend, SecurityRule, SnapshotHandle,
};
pub use build::{BuildError, BuildOrchestrator, BuildReport, BuildSpec, BuildStage};
pub use catalog::Catalog;
pub use config::{ApiConfig, BuildConfig, ConfigError};
pub use config_store::{BuildConfigStore, ConfigStoreError};
pub use hyperstack::{HyperstackBackend, HyperstackError};
pub use poll::{PollError, PollPolicy};
pub use provision::{ProvisionError, ProvisioningPipeline, ProvisioningPlan, ProvisioningStep};
pub use report::render_error_chain;
pub use session::{
    CommandOutput, CommandRunner, Connector, ProcessCommandRunner, RemoteSession, RemoteShell,
    SessionConfig, SessionError, SshConnector, StreamingCommandRunner,
};
