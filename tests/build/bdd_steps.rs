//! BDD step definitions for the image build workflow.

use std::fs;
use std::time::Duration;

use kiln::test_support::{
    BackendCall, BackendOperation, FixedClock, SCRIPTED_FLOATING_IP, ScriptedBackendError,
};
use kiln::{BuildConfigStore, BuildError, BuildOrchestrator, PollPolicy, ProvisioningPipeline};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{BuildContext, BuildFailure, BuildResult, BuildTestError};

const STARTED_AT: u64 = 1_755_216_000;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] BuildTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn assertion(message: impl Into<String>) -> StepError {
    StepError::Assertion(message.into())
}

#[given("a build configuration with two scripts and one file")]
fn configured_build(build_context: BuildContext) -> BuildContext {
    build_context
}

#[given("the remote script \"{name}\" fails")]
fn remote_script_fails(build_context: BuildContext, name: String) -> BuildContext {
    build_context
        .connector
        .shell()
        .fail_when(format!("script /tmp/provisioning-scripts/{name}"));
    build_context
}

#[given("the local script \"{name}\" is missing")]
fn local_script_missing(build_context: BuildContext, name: String) -> Result<BuildContext, StepError> {
    let path = build_context.root().join("scripts").join(&name);
    fs::remove_file(&path).map_err(BuildTestError::from)?;
    Ok(build_context)
}

#[given("instance deletion fails")]
fn deletion_fails(build_context: BuildContext) -> BuildContext {
    build_context
        .backend
        .fail_on(BackendOperation::DeleteInstance);
    build_context
}

#[given("the instance never becomes ready")]
fn never_ready(build_context: BuildContext) -> BuildContext {
    build_context.backend.instance_ready_at(None);
    build_context
}

#[when("I run the build")]
fn run_build(build_context: BuildContext) -> Result<BuildContext, StepError> {
    let runtime = Runtime::new().map_err(|err| assertion(err.to_string()))?;
    let config = BuildConfigStore::new(build_context.config_path.clone())
        .load()
        .map_err(BuildTestError::from)?;
    let spec = config
        .to_build_spec()
        .map_err(|err| BuildTestError::Fixture(err.to_string()))?;

    let orchestrator = BuildOrchestrator::new(
        build_context.backend.clone(),
        build_context.connector.clone(),
        ProvisioningPipeline::new(config.provisioning_plan()),
    )
    .with_clock(FixedClock(STARTED_AT))
    .with_instance_poll(PollPolicy::new(Duration::ZERO, 60))
    .with_snapshot_poll(PollPolicy::new(Duration::ZERO, 120));

    let result = runtime.block_on(async { orchestrator.execute(&spec).await });
    let outcome = match result {
        Ok(report) => BuildResult::Success(report),
        Err(err) => BuildResult::Failure(BuildFailure {
            kind: failure_kind(&err).to_owned(),
            message: err.to_string(),
        }),
    };

    Ok(BuildContext {
        outcome: Some(outcome),
        ..build_context
    })
}

#[then("the build succeeds")]
fn build_succeeds(build_context: &BuildContext) -> Result<(), StepError> {
    match build_context.outcome {
        Some(BuildResult::Success(_)) => Ok(()),
        Some(BuildResult::Failure(ref failure)) => Err(assertion(format!(
            "expected success, got failure: {}",
            failure.message
        ))),
        None => Err(assertion("missing outcome")),
    }
}

#[then("the build fails with kind \"{kind}\"")]
fn build_fails_with(build_context: &BuildContext, kind: String) -> Result<(), StepError> {
    let Some(BuildResult::Failure(failure)) = &build_context.outcome else {
        return Err(assertion("expected failure outcome"));
    };
    if failure.kind == kind {
        Ok(())
    } else {
        Err(assertion(format!(
            "expected failure kind {kind}, got {} ({})",
            failure.kind, failure.message
        )))
    }
}

#[then("the image \"{name}\" is published with label \"{label}\"")]
fn image_published(build_context: &BuildContext, name: String, label: String) -> Result<(), StepError> {
    let published = build_context.backend.calls().into_iter().find_map(|call| match call {
        BackendCall::CreateImage {
            name: image, labels, ..
        } => Some((image, labels)),
        _ => None,
    });
    let Some((image, labels)) = published else {
        return Err(assertion("no image was requested"));
    };
    if image != name {
        return Err(assertion(format!("expected image {name}, got {image}")));
    }
    if !labels.iter().any(|existing| *existing == label) {
        return Err(assertion(format!("label {label} missing from {labels:?}")));
    }
    Ok(())
}

#[then("the provisioning steps ran in order")]
fn steps_in_order(build_context: &BuildContext) -> Result<(), StepError> {
    let connections = build_context.connector.connections();
    if connections.first().map(|(host, _)| host.as_str()) != Some(SCRIPTED_FLOATING_IP) {
        return Err(assertion(format!(
            "expected one connection to {SCRIPTED_FLOATING_IP}, got {connections:?}"
        )));
    }

    let root = build_context.root();
    let expected = [
        format!("upload {root}/scripts/s1.sh -> /tmp/provisioning-scripts/s1.sh"),
        String::from("script /tmp/provisioning-scripts/s1.sh"),
        format!("upload {root}/scripts/s2.sh -> /tmp/provisioning-scripts/s2.sh"),
        String::from("script /tmp/provisioning-scripts/s2.sh"),
        format!("upload {root}/files/f1 -> /tmp/f1"),
        String::from("run sudo mv /tmp/f1 /etc/f1"),
    ];
    let transcript = build_context.connector.shell().transcript();
    let mut remaining = transcript.iter();
    for line in &expected {
        if !remaining.any(|entry| entry == line) {
            return Err(assertion(format!(
                "expected {line} in order within {transcript:?}"
            )));
        }
    }
    Ok(())
}

#[then("the file \"{name}\" is not deployed")]
fn file_not_deployed(build_context: &BuildContext, name: String) -> Result<(), StepError> {
    let transcript = build_context.connector.shell().transcript();
    if transcript
        .iter()
        .any(|line| line.starts_with("upload") && line.contains(&format!("/files/{name}")))
    {
        return Err(assertion(format!("{name} was deployed: {transcript:?}")));
    }
    Ok(())
}

#[then("no snapshot is requested")]
fn no_snapshot(build_context: &BuildContext) -> Result<(), StepError> {
    match build_context.backend.snapshot_requests() {
        0 => Ok(()),
        count => Err(assertion(format!("expected no snapshot, got {count}"))),
    }
}

#[then("no instance is created")]
fn no_instance(build_context: &BuildContext) -> Result<(), StepError> {
    let calls = build_context.backend.calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(assertion(format!("expected no provider calls, got {calls:?}")))
    }
}

#[then("no SSH connection was attempted")]
fn no_connection(build_context: &BuildContext) -> Result<(), StepError> {
    let connections = build_context.connector.connections();
    if connections.is_empty() {
        Ok(())
    } else {
        Err(assertion(format!("unexpected connections: {connections:?}")))
    }
}

#[then("the instance was polled {count} times")]
fn polled_times(build_context: &BuildContext, count: usize) -> Result<(), StepError> {
    let polls = build_context.backend.instance_polls();
    if polls == count {
        Ok(())
    } else {
        Err(assertion(format!("expected {count} polls, got {polls}")))
    }
}

#[then("the instance is deleted once")]
fn deleted_once(build_context: &BuildContext) -> Result<(), StepError> {
    match build_context.backend.delete_calls() {
        1 => Ok(()),
        count => Err(assertion(format!("expected one delete, got {count}"))),
    }
}

#[then("the instance is reported as not deleted")]
fn reported_not_deleted(build_context: &BuildContext) -> Result<(), StepError> {
    match &build_context.outcome {
        Some(BuildResult::Success(report)) if !report.instance_deleted => Ok(()),
        other => Err(assertion(format!(
            "expected a successful report with instance_deleted false, got {other:?}"
        ))),
    }
}

const fn failure_kind(err: &BuildError<ScriptedBackendError>) -> &'static str {
    match err {
        BuildError::Validation(_) => "validation",
        BuildError::Plan(_) => "plan",
        BuildError::Provider { .. } => "provider",
        BuildError::ReadinessTimeout { .. } => "readiness",
        BuildError::Session { .. } => "session",
        BuildError::Provision { .. } => "provision",
    }
}
