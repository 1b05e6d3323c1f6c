//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::rc::Rc;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::authoring::{AuthoringError, Prompter};
use crate::backend::{
    BackendFuture, FLOATING_IP_ATTACHED, INSTANCE_ACTIVE, ImageHandle, InstanceHandle,
    InstanceRequest, ResourceBackend, SNAPSHOT_SUCCESS, SnapshotHandle,
};
use crate::build::Clock;
use crate::catalog::{Catalog, CatalogImage, Environment, Flavor, Keypair, Region};
use crate::session::{CommandOutput, CommandRunner, Connector, RemoteShell, SessionError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Bytes streamed to standard input, if any.
    pub stdin: Option<Vec<u8>>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the final argument, which carries the remote command for ssh.
    #[must_use]
    pub fn remote_command(&self) -> Option<String> {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes `count` successful exit statuses.
    pub fn push_successes(&self, count: usize) {
        for _ in 0..count {
            self.push_success();
        }
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    fn respond(
        &self,
        program: &str,
        args: &[OsString],
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, SessionError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            stdin,
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| SessionError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError> {
        self.respond(program, args, None)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &mut dyn Read,
    ) -> Result<CommandOutput, SessionError> {
        let mut bytes = Vec::new();
        input
            .read_to_end(&mut bytes)
            .map_err(|err| SessionError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;
        self.respond(program, args, Some(bytes))
    }
}

/// Operation observed by [`RecordingShell`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShellOperation {
    /// `run(command)`
    Run(String),
    /// `upload(local, remote)`
    Upload {
        /// Local source file.
        local: Utf8PathBuf,
        /// Remote destination.
        remote: String,
    },
    /// `run_script(path)`
    RunScript(String),
    /// `close()`
    Close,
}

impl fmt::Display for ShellOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(command) => write!(f, "run {command}"),
            Self::Upload { local, remote } => write!(f, "upload {local} -> {remote}"),
            Self::RunScript(path) => write!(f, "script {path}"),
            Self::Close => f.write_str("close"),
        }
    }
}

#[derive(Debug, Default)]
struct ShellState {
    operations: Vec<ShellOperation>,
    failing: Vec<String>,
}

/// In-memory [`RemoteShell`] that records operations and fails any operation
/// whose rendering contains a configured pattern.
#[derive(Clone, Debug, Default)]
pub struct RecordingShell {
    state: Arc<StdMutex<ShellState>>,
}

impl RecordingShell {
    /// Creates a shell where every operation succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later operation mentioning `pattern` fail.
    pub fn fail_when(&self, pattern: impl Into<String>) {
        self.lock().failing.push(pattern.into());
    }

    /// Operations recorded so far, in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<ShellOperation> {
        self.lock().operations.clone()
    }

    /// Operations rendered as strings, excluding `close`.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.operations()
            .iter()
            .filter(|operation| **operation != ShellOperation::Close)
            .map(ToString::to_string)
            .collect()
    }

    /// Number of times `close` was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|operation| **operation == ShellOperation::Close)
            .count()
    }

    fn lock(&self) -> StdMutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: ShellOperation) -> Result<(), String> {
        let rendered = operation.to_string();
        let mut state = self.lock();
        state.operations.push(operation);
        if state
            .failing
            .iter()
            .any(|pattern| rendered.contains(pattern.as_str()))
        {
            return Err(rendered);
        }
        Ok(())
    }
}

fn scripted_command_failure(command: &str) -> SessionError {
    SessionError::Command {
        command: command.to_owned(),
        reason: String::from("failed"),
        status: Some(1),
        status_text: String::from("1"),
        stderr: String::from("simulated failure"),
    }
}

impl RemoteShell for RecordingShell {
    fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        self.record(ShellOperation::Run(command.to_owned()))
            .map_err(|_| scripted_command_failure(command))?;
        Ok(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn upload(&mut self, local: &Utf8Path, remote: &str) -> Result<(), SessionError> {
        self.record(ShellOperation::Upload {
            local: local.to_path_buf(),
            remote: remote.to_owned(),
        })
        .map_err(|_| SessionError::Transfer {
            local: local.to_path_buf(),
            remote: remote.to_owned(),
            message: String::from("simulated transfer failure"),
        })
    }

    fn run_script(&mut self, remote_path: &str) -> Result<(), SessionError> {
        self.record(ShellOperation::RunScript(remote_path.to_owned()))
            .map_err(|_| scripted_command_failure(remote_path))
    }

    fn close(&mut self) {
        self.lock().operations.push(ShellOperation::Close);
    }
}

/// [`Connector`] handing out clones of one [`RecordingShell`].
#[derive(Clone, Debug, Default)]
pub struct RecordingConnector {
    shell: RecordingShell,
    connections: Arc<StdMutex<Vec<(String, String)>>>,
    refuse: Arc<StdMutex<bool>>,
    reject_identity: Arc<StdMutex<bool>>,
}

impl RecordingConnector {
    /// Creates a connector whose sessions record into `shell`.
    #[must_use]
    pub fn new(shell: RecordingShell) -> Self {
        Self {
            shell,
            ..Self::default()
        }
    }

    /// Makes every later connection attempt time out.
    pub fn refuse_connections(&self) {
        *self.refuse.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Makes every later identity check fail as if the key were missing.
    pub fn reject_identity(&self) {
        *self
            .reject_identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// `(host, identity)` pairs passed to `connect`.
    #[must_use]
    pub fn connections(&self) -> Vec<(String, String)> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The shared shell.
    #[must_use]
    pub const fn shell(&self) -> &RecordingShell {
        &self.shell
    }
}

impl Connector for RecordingConnector {
    type Session = RecordingShell;

    fn connect(&self, host: &str, identity_path: &str) -> Result<Self::Session, SessionError> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((host.to_owned(), identity_path.to_owned()));
        if *self.refuse.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(SessionError::ConnectionTimeout {
                host: host.to_owned(),
                attempts: 30,
                last_error: String::from("connection refused"),
            });
        }
        Ok(self.shell.clone())
    }

    fn check_identity(&self, identity_path: &str) -> Result<(), SessionError> {
        if *self
            .reject_identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(SessionError::Identity {
                path: Utf8PathBuf::from(identity_path),
                message: String::from("No such file or directory"),
            });
        }
        Ok(())
    }
}

/// Backend operation that [`ScriptedBackend`] can be told to fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendOperation {
    /// `create_instance`
    CreateInstance,
    /// `get_instance`
    GetInstance,
    /// `delete_instance`
    DeleteInstance,
    /// `create_snapshot`
    CreateSnapshot,
    /// `get_snapshot`
    GetSnapshot,
    /// `create_image`
    CreateImage,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateInstance => "create_instance",
            Self::GetInstance => "get_instance",
            Self::DeleteInstance => "delete_instance",
            Self::CreateSnapshot => "create_snapshot",
            Self::GetSnapshot => "get_snapshot",
            Self::CreateImage => "create_image",
        };
        f.write_str(name)
    }
}

/// Call recorded by [`ScriptedBackend`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BackendCall {
    /// Instance creation with the full request.
    CreateInstance(InstanceRequest),
    /// Instance read by id.
    GetInstance(u64),
    /// Instance deletion by id.
    DeleteInstance(u64),
    /// Snapshot request.
    CreateSnapshot {
        /// Instance captured.
        instance_id: u64,
        /// Snapshot name.
        name: String,
    },
    /// Snapshot read by id.
    GetSnapshot(u64),
    /// Image publication.
    CreateImage {
        /// Source snapshot.
        snapshot_id: u64,
        /// Image name.
        name: String,
        /// Image labels.
        labels: Vec<String>,
    },
}

/// Error returned by [`ScriptedBackend`] for operations told to fail.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted {0} failure")]
pub struct ScriptedBackendError(pub BackendOperation);

/// Identifier given to the scripted instance.
pub const SCRIPTED_INSTANCE_ID: u64 = 4242;
/// Identifier given to the scripted snapshot.
pub const SCRIPTED_SNAPSHOT_ID: u64 = 777;
/// Identifier given to the scripted image.
pub const SCRIPTED_IMAGE_ID: u64 = 9001;
/// Floating IP reported once the scripted instance is ready.
pub const SCRIPTED_FLOATING_IP: &str = "203.0.113.10";

#[derive(Debug, Default)]
struct BackendState {
    calls: Vec<BackendCall>,
    failing: Vec<BackendOperation>,
    instance_ready_at: Option<u32>,
    snapshot_ready_at: Option<u32>,
    instance_polls: u32,
    snapshot_polls: u32,
    instance_name: String,
}

/// Deterministic [`ResourceBackend`] that becomes ready after a configured
/// number of polls.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    state: Arc<StdMutex<BackendState>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Creates a backend whose instance and snapshot are ready on the first
    /// poll.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(StdMutex::new(BackendState {
                instance_ready_at: Some(1),
                snapshot_ready_at: Some(1),
                ..BackendState::default()
            })),
        }
    }

    /// Reports the instance ready on poll `poll`; `None` never.
    pub fn instance_ready_at(&self, poll: Option<u32>) {
        self.lock().instance_ready_at = poll;
    }

    /// Reports the snapshot ready on poll `poll`; `None` never.
    pub fn snapshot_ready_at(&self, poll: Option<u32>) {
        self.lock().snapshot_ready_at = poll;
    }

    /// Makes `operation` fail on every call.
    pub fn fail_on(&self, operation: BackendOperation) {
        self.lock().failing.push(operation);
    }

    /// Calls recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Number of `delete_instance` calls.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::DeleteInstance(_)))
    }

    /// Number of `get_instance` calls.
    #[must_use]
    pub fn instance_polls(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::GetInstance(_)))
    }

    /// Number of `get_snapshot` calls.
    #[must_use]
    pub fn snapshot_polls(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::GetSnapshot(_)))
    }

    /// Number of `create_snapshot` calls.
    #[must_use]
    pub fn snapshot_requests(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::CreateSnapshot { .. }))
    }

    fn lock(&self) -> StdMutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        call: BackendCall,
        operation: BackendOperation,
    ) -> Result<StdMutexGuard<'_, BackendState>, ScriptedBackendError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(&operation) {
            return Err(ScriptedBackendError(operation));
        }
        Ok(state)
    }

    fn instance(name: &str, ready: bool) -> InstanceHandle {
        InstanceHandle {
            id: SCRIPTED_INSTANCE_ID,
            name: name.to_owned(),
            status: String::from(if ready { INSTANCE_ACTIVE } else { "BUILD" }),
            fixed_ip: String::from("10.0.0.5"),
            floating_ip: if ready {
                String::from(SCRIPTED_FLOATING_IP)
            } else {
                String::new()
            },
            floating_ip_status: String::from(if ready {
                FLOATING_IP_ATTACHED
            } else {
                "ATTACHING"
            }),
        }
    }
}

fn ready_by(poll: u32, ready_at: Option<u32>) -> bool {
    ready_at.is_some_and(|target| poll >= target)
}

impl ResourceBackend for ScriptedBackend {
    type Error = ScriptedBackendError;

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        let result = self
            .record(
                BackendCall::CreateInstance(request.clone()),
                BackendOperation::CreateInstance,
            )
            .map(|mut state| {
                state.instance_name.clone_from(&request.name);
                Self::instance(&request.name, false)
            });
        Box::pin(async move { result })
    }

    fn get_instance(&self, id: u64) -> BackendFuture<'_, InstanceHandle, Self::Error> {
        let result = self
            .record(BackendCall::GetInstance(id), BackendOperation::GetInstance)
            .map(|mut state| {
                state.instance_polls = state.instance_polls.saturating_add(1);
                let ready = ready_by(state.instance_polls, state.instance_ready_at);
                Self::instance(&state.instance_name, ready)
            });
        Box::pin(async move { result })
    }

    fn delete_instance(&self, id: u64) -> BackendFuture<'_, (), Self::Error> {
        let result = self
            .record(
                BackendCall::DeleteInstance(id),
                BackendOperation::DeleteInstance,
            )
            .map(|_| ());
        Box::pin(async move { result })
    }

    fn create_snapshot<'a>(
        &'a self,
        instance_id: u64,
        name: &'a str,
    ) -> BackendFuture<'a, SnapshotHandle, Self::Error> {
        let result = self
            .record(
                BackendCall::CreateSnapshot {
                    instance_id,
                    name: name.to_owned(),
                },
                BackendOperation::CreateSnapshot,
            )
            .map(|_| SnapshotHandle {
                id: SCRIPTED_SNAPSHOT_ID,
                name: name.to_owned(),
                status: String::from("CREATING"),
            });
        Box::pin(async move { result })
    }

    fn get_snapshot(&self, id: u64) -> BackendFuture<'_, SnapshotHandle, Self::Error> {
        let result = self
            .record(BackendCall::GetSnapshot(id), BackendOperation::GetSnapshot)
            .map(|mut state| {
                state.snapshot_polls = state.snapshot_polls.saturating_add(1);
                let ready = ready_by(state.snapshot_polls, state.snapshot_ready_at);
                SnapshotHandle {
                    id,
                    name: String::from("scripted-snapshot"),
                    status: String::from(if ready { SNAPSHOT_SUCCESS } else { "CREATING" }),
                }
            });
        Box::pin(async move { result })
    }

    fn create_image<'a>(
        &'a self,
        snapshot_id: u64,
        name: &'a str,
        labels: &'a [String],
    ) -> BackendFuture<'a, ImageHandle, Self::Error> {
        let result = self
            .record(
                BackendCall::CreateImage {
                    snapshot_id,
                    name: name.to_owned(),
                    labels: labels.to_vec(),
                },
                BackendOperation::CreateImage,
            )
            .map(|_| ImageHandle {
                id: SCRIPTED_IMAGE_ID,
                name: name.to_owned(),
                labels: labels.to_vec(),
            });
        Box::pin(async move { result })
    }
}

/// [`Clock`] that always reports the same instant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn epoch_seconds(&self) -> u64 {
        self.0
    }
}

/// In-memory [`Catalog`] serving fixed listings.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    /// Images returned by `list_images`.
    pub images: Vec<CatalogImage>,
    /// Regions returned by `list_regions`.
    pub regions: Vec<Region>,
    /// Flavors returned by `list_flavors`.
    pub flavors: Vec<Flavor>,
    /// Keypairs returned by `list_keypairs`.
    pub keypairs: Vec<Keypair>,
    /// Environments returned by `list_environments`.
    pub environments: Vec<Environment>,
    /// When set, every listing fails.
    pub unavailable: bool,
}

/// Error returned by an unavailable [`StaticCatalog`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("catalog unavailable")]
pub struct CatalogUnavailable;

impl StaticCatalog {
    fn serve<T: Clone + Send + 'static>(
        &self,
        items: &[T],
    ) -> BackendFuture<'_, Vec<T>, CatalogUnavailable> {
        let result = if self.unavailable {
            Err(CatalogUnavailable)
        } else {
            Ok(items.to_vec())
        };
        Box::pin(async move { result })
    }
}

impl Catalog for StaticCatalog {
    type Error = CatalogUnavailable;

    fn list_images(&self) -> BackendFuture<'_, Vec<CatalogImage>, Self::Error> {
        self.serve(&self.images)
    }

    fn list_regions(&self) -> BackendFuture<'_, Vec<Region>, Self::Error> {
        self.serve(&self.regions)
    }

    fn list_flavors(&self) -> BackendFuture<'_, Vec<Flavor>, Self::Error> {
        self.serve(&self.flavors)
    }

    fn list_keypairs(&self) -> BackendFuture<'_, Vec<Keypair>, Self::Error> {
        self.serve(&self.keypairs)
    }

    fn list_environments(&self) -> BackendFuture<'_, Vec<Environment>, Self::Error> {
        self.serve(&self.environments)
    }
}

/// [`Prompter`] answering from a fixed queue and recording every exchange.
///
/// Once the queue is exhausted every question is answered with an empty line,
/// so the prompt default applies.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    transcript: Vec<String>,
    questions: Vec<(String, Option<String>)>,
}

impl ScriptedPrompter {
    /// Creates a prompter that replies with `answers` in order.
    #[must_use]
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|answer| (*answer).to_owned()).collect(),
            ..Self::default()
        }
    }

    /// Returns every line shown through [`Prompter::say`].
    #[must_use]
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Returns the questions asked along with their defaults.
    #[must_use]
    pub fn questions(&self) -> &[(String, Option<String>)] {
        &self.questions
    }

    /// Returns the default offered for the first question starting with `prefix`.
    #[must_use]
    pub fn default_for(&self, prefix: &str) -> Option<&str> {
        self.questions
            .iter()
            .find(|(prompt, _)| prompt.starts_with(prefix))
            .and_then(|(_, default)| default.as_deref())
    }

    /// Returns `true` when a shown line contains `needle`.
    #[must_use]
    pub fn said(&self, needle: &str) -> bool {
        self.transcript.iter().any(|line| line.contains(needle))
    }
}

impl Prompter for ScriptedPrompter {
    fn say(&mut self, line: &str) -> Result<(), AuthoringError> {
        self.transcript.push(line.to_owned());
        Ok(())
    }

    fn ask(&mut self, prompt: &str, default: Option<&str>) -> Result<String, AuthoringError> {
        self.questions
            .push((prompt.to_owned(), default.map(str::to_owned)));
        let answer = self.answers.pop_front().unwrap_or_default();
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            return Ok(default.unwrap_or_default().to_owned());
        }
        Ok(trimmed.to_owned())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Removes variables while holding the global mutex.
    pub async fn remove_vars(keys: &[&str]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(keys.len());
        for key in keys {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
