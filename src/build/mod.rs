//! Orchestrates one image build end to end.
//!
//! The build creates an instance from the base image, waits until it is
//! reachable, provisions it over SSH, snapshots its disk, waits for the
//! snapshot, and publishes an image from it. Once the instance exists it is
//! deleted exactly once on every path; a failed deletion is logged and does
//! not change the build's outcome.

use tracing::{info, warn};

use crate::backend::{ImageHandle, InstanceHandle, ResourceBackend, SnapshotHandle};
use crate::poll::{PollError, PollPolicy, Polled, poll_until};
use crate::provision::ProvisioningPipeline;
use crate::session::{Connector, RemoteShell};

mod error;
pub mod naming;
mod request;
mod stage;

pub use error::BuildError;
pub use naming::{Clock, PLATFORM_LABELS, SystemClock};
pub use request::BuildSpec;
pub use stage::BuildStage;

/// Outcome of a successful build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildReport {
    /// Published image.
    pub image: ImageHandle,
    /// Name the build instance was created with.
    pub instance_name: String,
    /// Snapshot the image was published from.
    pub snapshot: SnapshotHandle,
    /// Whether the build instance was deleted.
    pub instance_deleted: bool,
}

struct Captured {
    snapshot: SnapshotHandle,
    image: ImageHandle,
}

/// Drives a [`ResourceBackend`] and a [`Connector`] through one build.
#[derive(Debug)]
pub struct BuildOrchestrator<B, C, K = SystemClock> {
    backend: B,
    connector: C,
    pipeline: ProvisioningPipeline,
    clock: K,
    instance_poll: PollPolicy,
    snapshot_poll: PollPolicy,
}

impl<B, C> BuildOrchestrator<B, C, SystemClock> {
    /// Creates an orchestrator using the system clock and default polling.
    #[must_use]
    pub const fn new(backend: B, connector: C, pipeline: ProvisioningPipeline) -> Self {
        Self {
            backend,
            connector,
            pipeline,
            clock: SystemClock,
            instance_poll: PollPolicy::INSTANCE_READY,
            snapshot_poll: PollPolicy::SNAPSHOT_READY,
        }
    }
}

impl<B, C, K> BuildOrchestrator<B, C, K>
where
    B: ResourceBackend,
    C: Connector,
    K: Clock,
{
    /// Replaces the clock used for resource names.
    #[must_use]
    pub fn with_clock<K2: Clock>(self, clock: K2) -> BuildOrchestrator<B, C, K2> {
        BuildOrchestrator {
            backend: self.backend,
            connector: self.connector,
            pipeline: self.pipeline,
            clock,
            instance_poll: self.instance_poll,
            snapshot_poll: self.snapshot_poll,
        }
    }

    /// Overrides instance readiness polling.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_instance_poll(mut self, policy: PollPolicy) -> Self {
        self.instance_poll = policy;
        self
    }

    /// Overrides snapshot completion polling.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_snapshot_poll(mut self, policy: PollPolicy) -> Self {
        self.snapshot_poll = policy;
        self
    }

    /// Runs the build.
    ///
    /// Inputs, the provisioning plan, and the SSH private key are validated
    /// before any provider call. Once the instance has been created it is deleted on every
    /// path, and the result of that deletion is reported in
    /// [`BuildReport::instance_deleted`] rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] for the first failing stage.
    pub async fn execute(&self, spec: &BuildSpec) -> Result<BuildReport, BuildError<B::Error>> {
        spec.validate()
            .map_err(|err| BuildError::Validation(err.to_string()))?;
        self.pipeline
            .plan()
            .validate()
            .map_err(BuildError::Plan)?;
        self.connector
            .check_identity(&spec.private_key_path)
            .map_err(|err| BuildError::Validation(err.to_string()))?;

        let instance_name = naming::instance_name(&spec.vm_name, self.clock.epoch_seconds());
        let request = spec
            .instance_request(&instance_name)
            .map_err(|err| BuildError::Validation(err.to_string()))?;

        enter(BuildStage::InstanceRequested);
        info!("Creating virtual machine: {instance_name}");
        let instance = self
            .backend
            .create_instance(&request)
            .await
            .map_err(|source| BuildError::Provider {
                stage: BuildStage::InstanceRequested,
                resource: format!("instance {instance_name}"),
                source,
            })?;
        info!("Created VM: {} (ID: {})", instance.name, instance.id);

        let outcome = self.capture(spec, &instance).await;
        let instance_deleted = self.release(instance.id).await;

        let captured = outcome?;
        enter(BuildStage::Complete);
        Ok(BuildReport {
            image: captured.image,
            instance_name,
            snapshot: captured.snapshot,
            instance_deleted,
        })
    }

    async fn capture(
        &self,
        spec: &BuildSpec,
        instance: &InstanceHandle,
    ) -> Result<Captured, BuildError<B::Error>> {
        let ready = self.wait_for_instance(instance.id).await?;
        enter(BuildStage::InstanceReady);
        info!(
            "VM is ready at IP: {} (fixed IP: {})",
            ready.floating_ip, ready.fixed_ip
        );

        self.provision(spec, &ready)?;
        enter(BuildStage::Provisioned);

        let snapshot_name = naming::snapshot_name(&spec.vm_name, self.clock.epoch_seconds());
        enter(BuildStage::SnapshotRequested);
        info!("Creating snapshot: {snapshot_name}");
        let requested = self
            .backend
            .create_snapshot(instance.id, &snapshot_name)
            .await
            .map_err(|source| BuildError::Provider {
                stage: BuildStage::SnapshotRequested,
                resource: format!("snapshot {snapshot_name}"),
                source,
            })?;
        info!("Created snapshot: {} (ID: {})", requested.name, requested.id);

        let snapshot = self.wait_for_snapshot(requested.id).await?;
        enter(BuildStage::SnapshotReady);

        let image_name = naming::image_name(&spec.image_name, &spec.image_version);
        let labels = naming::image_labels(&spec.tags);
        enter(BuildStage::ImageRequested);
        info!("Creating image: {image_name}");
        let image = self
            .backend
            .create_image(snapshot.id, &image_name, &labels)
            .await
            .map_err(|source| BuildError::Provider {
                stage: BuildStage::ImageRequested,
                resource: format!("image {image_name}"),
                source,
            })?;
        info!("Created image: {} (ID: {})", image.name, image.id);

        Ok(Captured { snapshot, image })
    }

    async fn wait_for_instance(&self, id: u64) -> Result<InstanceHandle, BuildError<B::Error>> {
        info!("Waiting for VM {id} to be ready");
        let polled = poll_until(
            self.instance_poll,
            || self.backend.get_instance(id),
            |instance: &InstanceHandle, attempt| {
                let ready = instance.is_ready();
                if !ready {
                    info!(
                        attempt,
                        "VM status: {}, floating IP status: {}",
                        instance.status,
                        instance.floating_ip_status
                    );
                }
                ready
            },
        )
        .await;
        settle(polled, BuildStage::InstanceRequested, format!("instance {id}"))
    }

    async fn wait_for_snapshot(&self, id: u64) -> Result<SnapshotHandle, BuildError<B::Error>> {
        info!("Waiting for snapshot {id} to be ready");
        let polled = poll_until(
            self.snapshot_poll,
            || self.backend.get_snapshot(id),
            |snapshot: &SnapshotHandle, attempt| {
                let ready = snapshot.is_ready();
                if !ready {
                    info!(attempt, "Snapshot status: {}", snapshot.status);
                }
                ready
            },
        )
        .await;
        settle(polled, BuildStage::SnapshotRequested, format!("snapshot {id}"))
    }

    fn provision(
        &self,
        spec: &BuildSpec,
        instance: &InstanceHandle,
    ) -> Result<(), BuildError<B::Error>> {
        let host = instance.floating_ip.clone();
        info!("Connecting to {host} over SSH");
        let mut session = self
            .connector
            .connect(&host, &spec.private_key_path)
            .map_err(|source| BuildError::Session {
                host: host.clone(),
                source,
            })?;

        let outcome = self.pipeline.apply(&mut session);
        session.close();
        let steps = outcome.map_err(|source| BuildError::Provision {
            instance_id: instance.id,
            source,
        })?;
        info!(steps, "Provisioned instance {}", instance.id);
        Ok(())
    }

    async fn release(&self, id: u64) -> bool {
        info!("Cleaning up VM: {id}");
        match self.backend.delete_instance(id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    instance_id = id,
                    "Failed to delete VM {id}; delete it manually: {err}"
                );
                false
            }
        }
    }
}

fn enter(stage: BuildStage) {
    info!(%stage, "Build stage reached");
}

fn settle<T, E>(
    polled: Result<Polled<T>, PollError<E>>,
    stage: BuildStage,
    resource: String,
) -> Result<T, BuildError<E>>
where
    E: std::error::Error + 'static,
{
    match polled {
        Ok(Polled { value, .. }) => Ok(value),
        Err(PollError::Exhausted { attempts }) => Err(BuildError::ReadinessTimeout {
            stage,
            resource,
            attempts,
        }),
        Err(PollError::Fetch { source, .. }) => Err(BuildError::Provider {
            stage,
            resource,
            source,
        }),
    }
}
