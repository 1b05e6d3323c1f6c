//! Applies a provisioning plan to a remote host.
//!
//! Scripts are uploaded into a scratch directory and executed in order;
//! files are staged and then moved into place with `sudo`. The first failing
//! step aborts the run, and later steps are never attempted. Removing the
//! scratch directory afterwards is best effort.

use camino::Utf8Path;
use shell_escape::unix::escape;
use tracing::{info, warn};

use crate::session::{RemoteShell, SessionError};

mod error;
mod plan;

pub use error::ProvisionError;
pub use plan::{
    DEFAULT_FILES_DIR, DEFAULT_REMOTE_SCRATCH_DIR, DEFAULT_SCRIPTS_DIR, DEFAULT_STAGING_DIR,
    ProvisioningPlan, ProvisioningStep,
};

/// Runs a [`ProvisioningPlan`] over a [`RemoteShell`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisioningPipeline {
    plan: ProvisioningPlan,
}

impl ProvisioningPipeline {
    /// Creates a pipeline for `plan`.
    #[must_use]
    pub const fn new(plan: ProvisioningPlan) -> Self {
        Self { plan }
    }

    /// The plan this pipeline applies.
    #[must_use]
    pub const fn plan(&self) -> &ProvisioningPlan {
        &self.plan
    }

    /// Applies every step in order.
    ///
    /// Returns the number of steps applied.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Scratch`] when the scratch directory cannot
    /// be created, [`ProvisionError::MissingSource`] when a source vanished
    /// since validation, and [`ProvisionError::Step`] for the first step
    /// whose upload or remote command fails.
    pub fn apply<S: RemoteShell>(&self, session: &mut S) -> Result<usize, ProvisionError> {
        let scratch = &self.plan.remote_scratch_dir;
        info!("Creating remote script directory: {scratch}");
        session
            .run(&format!("mkdir -p {}", escape(scratch.into())))
            .map_err(|source| ProvisionError::Scratch {
                path: scratch.clone(),
                source,
            })?;

        for (index, step) in self.plan.steps.iter().enumerate() {
            self.apply_step(session, index.saturating_add(1), step)?;
        }

        self.remove_scratch(session);
        info!("Provisioning completed successfully");
        Ok(self.plan.steps.len())
    }

    fn apply_step<S: RemoteShell>(
        &self,
        session: &mut S,
        number: usize,
        step: &ProvisioningStep,
    ) -> Result<(), ProvisionError> {
        let source = self.plan.check_source(number, step)?;
        let outcome = match step {
            ProvisioningStep::Script { name } => {
                let remote = self.plan.remote_script_path(name);
                info!(step = number, "Uploading script {name} to {remote}");
                session
                    .upload(&source, &remote)
                    .and_then(|()| session.run_script(&remote))
            }
            ProvisioningStep::FileDeploy { local, remote } => {
                info!(step = number, "Deploying {local} to {remote}");
                self.deploy_file(session, &source, local, remote)
            }
        };

        outcome.map_err(|err| ProvisionError::Step {
            number,
            name: step.label().to_owned(),
            source: err,
        })
    }

    fn deploy_file<S: RemoteShell>(
        &self,
        session: &mut S,
        source: &Utf8Path,
        local: &str,
        remote: &str,
    ) -> Result<(), SessionError> {
        if let Some(parent) = Utf8Path::new(remote)
            .parent()
            .filter(|parent| !parent.as_str().is_empty() && parent.as_str() != "/")
        {
            session.run(&format!("sudo mkdir -p {}", escape(parent.as_str().into())))?;
        }

        let staged = self.plan.staging_path(local);
        session.upload(source, &staged)?;
        session.run(&format!(
            "sudo mv {} {}",
            escape(staged.as_str().into()),
            escape(remote.into())
        ))?;
        Ok(())
    }

    fn remove_scratch<S: RemoteShell>(&self, session: &mut S) {
        let scratch = &self.plan.remote_scratch_dir;
        if let Err(err) = session.run(&format!("rm -rf {}", escape(scratch.into()))) {
            warn!("Failed to remove remote script directory {scratch}: {err}");
        }
    }
}
