//! Shared fixtures for build BDD scenarios.

use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;
use kiln::config::BuildConfig;
use kiln::provision::{ProvisioningPlan, ProvisioningStep};
use kiln::test_support::{RecordingConnector, RecordingShell, ScriptedBackend};
use kiln::{BuildConfigStore, BuildReport};
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;

pub const IMAGE_VERSION: &str = "202508.15.0";

#[derive(Clone, Debug)]
pub struct BuildContext {
    pub dir: Arc<TempDir>,
    pub config_path: Utf8PathBuf,
    pub backend: ScriptedBackend,
    pub connector: RecordingConnector,
    pub outcome: Option<BuildResult>,
}

impl BuildContext {
    pub fn root(&self) -> Utf8PathBuf {
        utf8_root(&self.dir)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildFailure {
    pub kind: String,
    pub message: String,
}

#[derive(Clone, Debug)]
pub enum BuildResult {
    Success(BuildReport),
    Failure(BuildFailure),
}

#[derive(Debug, Error)]
pub enum BuildTestError {
    #[error("fixture I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] kiln::ConfigStoreError),
    #[error("invalid build fixture: {0}")]
    Fixture(String),
}

pub type BuildContextResult = Result<BuildContext, BuildTestError>;

#[fixture]
pub fn build_context_result() -> BuildContextResult {
    create_build_context()
}

#[fixture]
pub fn build_context(build_context_result: BuildContextResult) -> BuildContext {
    build_context_result
        .unwrap_or_else(|err| panic!("build context fixture should initialise: {err}"))
}

fn utf8_root(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non-utf8 temp path: {}", path.display()))
}

fn create_build_context() -> BuildContextResult {
    let dir = TempDir::new()?;
    let root = utf8_root(&dir);
    for (sub, name) in [("scripts", "s1.sh"), ("scripts", "s2.sh"), ("files", "f1")] {
        fs::create_dir_all(root.join(sub))?;
        fs::write(root.join(sub).join(name), "#!/bin/sh\ntrue\n")?;
    }

    let config = BuildConfig {
        region: String::from("CANADA-1"),
        image_name: String::from("gpu-node"),
        image_version: String::from(IMAGE_VERSION),
        vm_name: String::from("thunder-build-vm"),
        keypair_name: String::from("build-key"),
        private_key_path: String::from("~/.ssh/id_rsa"),
        environment_name: String::from("default-CANADA-1"),
        tags: vec![String::from("k8s"), String::from("gpu")],
        provisioning: Some(ProvisioningPlan {
            scripts_dir: Utf8PathBuf::from("scripts"),
            files_dir: Utf8PathBuf::from("files"),
            steps: vec![
                ProvisioningStep::Script {
                    name: String::from("s1.sh"),
                },
                ProvisioningStep::Script {
                    name: String::from("s2.sh"),
                },
                ProvisioningStep::FileDeploy {
                    local: String::from("f1"),
                    remote: String::from("/etc/f1"),
                },
            ],
            ..ProvisioningPlan::default()
        }),
        ..BuildConfig::default()
    }
    .with_defaults();
    config
        .validate()
        .map_err(|err| BuildTestError::Fixture(err.to_string()))?;

    let config_path = root.join("build.json");
    BuildConfigStore::new(config_path.clone()).save(&config)?;

    Ok(BuildContext {
        dir: Arc::new(dir),
        config_path,
        backend: ScriptedBackend::new(),
        connector: RecordingConnector::new(RecordingShell::new()),
        outcome: None,
    })
}
