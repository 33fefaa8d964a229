use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use protocol::CommandSpec;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::{CommandError, CommandFailure};
use crate::output::{join_stderr, Captured, CommandResult};
use crate::process::{exit_code_of, terminate_children};
use crate::registry::{ProcessRegistry, RegistrationScope};
use crate::stream::{read_stream_capture, write_input};

/// In-memory input for the first stage. Text is sent as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Where an output stream goes. Anything but `Capture` yields empty
/// content in the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Redirect {
    #[default]
    Capture,
    Null,
    Inherit,
}

impl Redirect {
    fn stdio(self) -> Stdio {
        match self {
            Self::Capture => Stdio::piped(),
            Self::Null => Stdio::null(),
            Self::Inherit => Stdio::inherit(),
        }
    }
}

#[derive(Debug)]
pub struct RunOptions {
    pub input: Option<Payload>,
    /// Pre-opened source for the first stage's stdin. Mutually exclusive
    /// with `input`.
    pub stdin: Option<Stdio>,
    pub stdout: Redirect,
    pub stderr: Redirect,
    pub log_error: bool,
    pub encode_output: bool,
    pub track: bool,
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            input: None,
            stdin: None,
            stdout: Redirect::Capture,
            stderr: Redirect::Capture,
            log_error: false,
            encode_output: true,
            track: true,
            timeout: None,
        }
    }
}

impl RunOptions {
    pub fn input(mut self, payload: impl Into<Payload>) -> Self {
        self.input = Some(payload.into());
        self
    }

    pub fn stdin(mut self, source: impl Into<Stdio>) -> Self {
        self.stdin = Some(source.into());
        self
    }

    pub fn stdout(mut self, redirect: Redirect) -> Self {
        self.stdout = redirect;
        self
    }

    pub fn stderr(mut self, redirect: Redirect) -> Self {
        self.stderr = redirect;
        self
    }

    pub fn log_error(mut self, enabled: bool) -> Self {
        self.log_error = enabled;
        self
    }

    pub fn encode_output(mut self, enabled: bool) -> Self {
        self.encode_output = enabled;
        self
    }

    pub fn track(mut self, enabled: bool) -> Self {
        self.track = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Seam between callers and the process layer, so callers can be driven
/// by a scripted executor in tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(
        &self,
        spec: &CommandSpec,
        options: RunOptions,
    ) -> Result<CommandResult, CommandError>;
}

/// Runs commands and pipelines without a shell, recording tracked pids in
/// a shared [`ProcessRegistry`].
#[derive(Debug, Clone)]
pub struct CommandRunner {
    registry: Arc<ProcessRegistry>,
}

impl CommandRunner {
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Self { registry }
    }

    /// Runs `spec` to completion. A non-zero exit status is returned as
    /// [`CommandError::NonZeroExit`] carrying the captured streams.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        options: RunOptions,
    ) -> Result<CommandResult, CommandError> {
        validate(spec, &options)?;
        let command = spec.to_string();
        let log_error = options.log_error;

        match self.execute(spec, &command, options).await {
            Ok(result) if result.exit_code == 0 => Ok(result),
            Ok(result) => {
                let failure =
                    CommandFailure::new(command, result.exit_code, result.stdout, result.stderr);
                if log_error {
                    tracing::error!(
                        command = %failure.command,
                        exit_code = failure.exit_code,
                        stdout = %failure.stdout,
                        stderr = %failure.stderr,
                        "command failed"
                    );
                }
                Err(CommandError::NonZeroExit(failure))
            }
            Err(err) => {
                if log_error {
                    tracing::error!(
                        command = %command,
                        error = %err,
                        "command raised unexpected error"
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        spec: &CommandSpec,
        command: &str,
        mut options: RunOptions,
    ) -> Result<CommandResult, CommandError> {
        let io_error = |source: io::Error| CommandError::Io {
            command: command.to_string(),
            source,
        };
        let stages = spec.stages();
        let last = stages.len().saturating_sub(1);
        let mut input = options.input.take().map(Payload::into_bytes);
        let mut stdin_source = options.stdin.take();

        let mut scope = options.track.then(|| self.registry.scope());
        let mut children: Vec<Child> = Vec::with_capacity(stages.len());

        for (index, stage) in stages.iter().enumerate() {
            let Some((program, args)) = stage.argv.split_first() else {
                return Err(CommandError::InvalidArgument("empty command".to_string()));
            };
            let mut cmd = Command::new(program);
            cmd.args(args);
            if index > 0 || input.is_some() {
                cmd.stdin(Stdio::piped());
            } else if let Some(source) = stdin_source.take() {
                cmd.stdin(source);
            } else {
                cmd.stdin(Stdio::inherit());
            }
            if index == last {
                cmd.stdout(options.stdout.stdio());
            } else {
                cmd.stdout(Stdio::piped());
            }
            cmd.stderr(options.stderr.stdio());
            cmd.kill_on_drop(true);

            let child = cmd.spawn().map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;
            if let (Some(scope), Some(pid)) = (scope.as_mut(), child.id()) {
                scope.register(pid);
            }
            children.push(child);
        }

        let input_task = match input.take() {
            Some(payload) => {
                let stdin = children
                    .first_mut()
                    .and_then(|child| child.stdin.take())
                    .ok_or_else(|| io_error(missing_pipe("stdin")))?;
                Some(tokio::spawn(write_input(stdin, payload)))
            }
            None => None,
        };

        let mut pipe_tasks = Vec::new();
        for index in 0..children.len().saturating_sub(1) {
            let mut stdout = children[index]
                .stdout
                .take()
                .ok_or_else(|| io_error(missing_pipe("stdout")))?;
            let mut stdin = children[index + 1]
                .stdin
                .take()
                .ok_or_else(|| io_error(missing_pipe("stdin")))?;
            pipe_tasks.push(tokio::spawn(async move {
                let _ = tokio::io::copy(&mut stdout, &mut stdin).await;
            }));
        }

        let mut stderr_tasks = Vec::new();
        for child in &mut children {
            if let Some(stderr) = child.stderr.take() {
                stderr_tasks.push(tokio::spawn(read_stream_capture(stderr)));
            }
        }

        let stdout_task = children
            .last_mut()
            .and_then(|child| child.stdout.take())
            .map(|stdout| tokio::spawn(read_stream_capture(stdout)));

        let streams = StreamTasks {
            input: input_task,
            pipes: pipe_tasks,
            stdout: stdout_task,
            stderr: stderr_tasks,
        };
        let finished = finish(&mut children, &mut scope, streams);
        let waited = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, finished).await,
            None => Ok(finished.await),
        };
        let (exit_code, stdout, stderr) = match waited {
            Ok(result) => result.map_err(io_error)?,
            Err(_) => {
                terminate_children(&mut children).await;
                return Err(CommandError::TimedOut {
                    command: command.to_string(),
                    timeout: options.timeout.unwrap_or_default(),
                });
            }
        };

        Ok(CommandResult {
            exit_code,
            stdout: Captured::from_bytes(stdout, options.encode_output),
            stderr: Captured::from_bytes(stderr, options.encode_output),
        })
    }
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        options: RunOptions,
    ) -> Result<CommandResult, CommandError> {
        CommandRunner::run(self, spec, options).await
    }
}

fn validate(spec: &CommandSpec, options: &RunOptions) -> Result<(), CommandError> {
    if options.input.is_some() && options.stdin.is_some() {
        return Err(CommandError::InvalidArgument(
            "the input and stdin options are mutually exclusive".to_string(),
        ));
    }
    if spec.stages().is_empty() {
        return Err(CommandError::InvalidArgument("empty pipeline".to_string()));
    }
    if spec.stages().iter().any(|stage| stage.argv.is_empty()) {
        return Err(CommandError::InvalidArgument("empty command".to_string()));
    }
    Ok(())
}

struct StreamTasks {
    input: Option<JoinHandle<io::Result<()>>>,
    pipes: Vec<JoinHandle<()>>,
    stdout: Option<JoinHandle<io::Result<Vec<u8>>>>,
    stderr: Vec<JoinHandle<io::Result<Vec<u8>>>>,
}

/// Drains every stream to EOF, then reaps the stages. Until its wait
/// returns an exited stage is still a zombie, so a registered pid always
/// names a process that exists.
async fn finish(
    children: &mut [Child],
    scope: &mut Option<RegistrationScope<'_>>,
    streams: StreamTasks,
) -> io::Result<(i32, Vec<u8>, Vec<u8>)> {
    if let Some(task) = streams.input {
        join_io(task).await?;
    }
    for task in streams.pipes {
        let _ = task.await;
    }
    let stdout = match streams.stdout {
        Some(task) => join_io(task).await?,
        None => Vec::new(),
    };
    let mut stderr_chunks = Vec::with_capacity(streams.stderr.len());
    for task in streams.stderr {
        stderr_chunks.push(join_io(task).await?);
    }

    let exit_code = wait_children(children, scope).await?;
    Ok((exit_code, stdout, join_stderr(stderr_chunks)))
}

/// Waits for every stage, releasing each pid as soon as it is reaped. The
/// pipeline's status is the last stage's.
async fn wait_children(
    children: &mut [Child],
    scope: &mut Option<RegistrationScope<'_>>,
) -> io::Result<i32> {
    let mut exit_code = 0;
    for child in children.iter_mut() {
        let pid = child.id();
        let status = child.wait().await?;
        if let (Some(scope), Some(pid)) = (scope.as_mut(), pid) {
            scope.release(pid);
        }
        exit_code = exit_code_of(status);
    }
    Ok(exit_code)
}

async fn join_io<T>(task: JoinHandle<io::Result<T>>) -> io::Result<T> {
    task.await.map_err(io::Error::other)?
}

fn missing_pipe(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, format!("missing {name} pipe"))
}
