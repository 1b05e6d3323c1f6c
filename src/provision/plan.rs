//! Declarative description of what to install on the build instance.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::ProvisionError;

/// Default directory holding provisioning scripts.
pub const DEFAULT_SCRIPTS_DIR: &str = "scripts";
/// Default directory holding files deployed verbatim.
pub const DEFAULT_FILES_DIR: &str = "files";
/// Remote directory receiving uploaded scripts.
pub const DEFAULT_REMOTE_SCRATCH_DIR: &str = "/tmp/provisioning-scripts";
/// Remote directory receiving files before they are moved into place.
pub const DEFAULT_STAGING_DIR: &str = "/tmp";

/// One unit of provisioning work.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisioningStep {
    /// Upload a script from the scripts directory and execute it.
    Script {
        /// File name inside the scripts directory.
        name: String,
    },
    /// Upload a file from the files directory and install it at an
    /// absolute remote path with elevated privileges.
    #[serde(rename = "file")]
    FileDeploy {
        /// File name inside the files directory.
        local: String,
        /// Absolute destination on the remote host.
        remote: String,
    },
}

impl ProvisioningStep {
    /// Short name used in logs and error messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Script { name } => name,
            Self::FileDeploy { local, .. } => local,
        }
    }
}

/// Ordered provisioning steps plus the directories they resolve against.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProvisioningPlan {
    /// Local directory holding scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: Utf8PathBuf,
    /// Local directory holding deployable files.
    #[serde(default = "default_files_dir")]
    pub files_dir: Utf8PathBuf,
    /// Remote directory scripts are uploaded into; removed afterwards.
    #[serde(default = "default_remote_scratch_dir")]
    pub remote_scratch_dir: String,
    /// Remote directory files are staged in before being moved.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// Steps applied in order.
    #[serde(default = "default_steps")]
    pub steps: Vec<ProvisioningStep>,
}

impl Default for ProvisioningPlan {
    /// GPU node plan: purge stale CUDA packages, install drivers, install the
    /// NVIDIA container toolkit, then deploy the gVisor runtime config.
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            files_dir: default_files_dir(),
            remote_scratch_dir: default_remote_scratch_dir(),
            staging_dir: default_staging_dir(),
            steps: default_steps(),
        }
    }
}

impl ProvisioningPlan {
    /// Resolves the local source file for `step`.
    #[must_use]
    pub fn local_source(&self, step: &ProvisioningStep) -> Utf8PathBuf {
        match step {
            ProvisioningStep::Script { name } => self.scripts_dir.join(name),
            ProvisioningStep::FileDeploy { local, .. } => self.files_dir.join(local),
        }
    }

    /// Remote path a script step is uploaded to.
    #[must_use]
    pub fn remote_script_path(&self, name: &str) -> String {
        format!("{}/{name}", self.remote_scratch_dir.trim_end_matches('/'))
    }

    /// Remote path a file step is staged at before being moved.
    #[must_use]
    pub fn staging_path(&self, local: &str) -> String {
        let file_name = Utf8Path::new(local).file_name().unwrap_or(local);
        format!("{}/{file_name}", self.staging_dir.trim_end_matches('/'))
    }

    /// Resolves relative local directories against `base`.
    pub fn rebase(&mut self, base: &Utf8Path) {
        if self.scripts_dir.is_relative() {
            self.scripts_dir = base.join(&self.scripts_dir);
        }
        if self.files_dir.is_relative() {
            self.files_dir = base.join(&self.files_dir);
        }
    }

    /// Checks every step before any remote resource exists: sources must be
    /// present locally and file destinations must be absolute.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::MissingSource`] or
    /// [`ProvisionError::RelativeDestination`] for the first offending step.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        for (index, step) in self.steps.iter().enumerate() {
            let number = index.saturating_add(1);
            if let ProvisioningStep::FileDeploy { remote, .. } = step
                && !remote.starts_with('/')
            {
                return Err(ProvisionError::RelativeDestination {
                    number,
                    remote: remote.clone(),
                });
            }
            self.check_source(number, step)?;
        }
        Ok(())
    }

    pub(crate) fn check_source(
        &self,
        number: usize,
        step: &ProvisioningStep,
    ) -> Result<Utf8PathBuf, ProvisionError> {
        let path = self.local_source(step);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ProvisionError::MissingSource { number, path })
        }
    }
}

fn default_scripts_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_SCRIPTS_DIR)
}

fn default_files_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_FILES_DIR)
}

fn default_remote_scratch_dir() -> String {
    String::from(DEFAULT_REMOTE_SCRATCH_DIR)
}

fn default_staging_dir() -> String {
    String::from(DEFAULT_STAGING_DIR)
}

fn default_steps() -> Vec<ProvisioningStep> {
    vec![
        ProvisioningStep::Script {
            name: String::from("cleanup-nvidia-cuda.sh"),
        },
        ProvisioningStep::Script {
            name: String::from("install-drivers.sh"),
        },
        ProvisioningStep::Script {
            name: String::from("install-nvidia-container-toolkit.sh"),
        },
        ProvisioningStep::FileDeploy {
            local: String::from("runsc.toml"),
            remote: String::from("/etc/containerd/runsc.toml"),
        },
    ]
}
