//! Subprocess execution.
//!
//! States never build compound shell pipelines. They run one single-purpose command,
//! inspect the output in-process, and decide per item whether a failure matters.

use crate::error::{EncryptionError, EncryptionResult};
use crate::host::Logger;
use std::fmt;
use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const BASH: &str = "/bin/bash";

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stderr when present, stdout otherwise.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs host commands.
///
/// Implementors provide [`run`](Self::run) and [`run_script`](Self::run_script);
/// the `must_succeed` handling lives in the provided methods so every executor
/// treats a non-zero exit the same way.
pub trait CommandExecutor: Send + Sync {
    /// Run a single command and report how it exited.
    fn run(&self, command: &HostCommand) -> EncryptionResult<CommandOutput>;

    /// Run a multi-line script body under bash.
    fn run_script(&self, script: &str) -> EncryptionResult<CommandOutput>;

    fn execute(
        &self,
        command: &HostCommand,
        must_succeed: bool,
    ) -> EncryptionResult<CommandOutput> {
        let output = self.run(command)?;
        require_success(&command.to_string(), output, must_succeed)
    }

    fn execute_in_bash(
        &self,
        script: &str,
        must_succeed: bool,
    ) -> EncryptionResult<CommandOutput> {
        let output = self.run_script(script)?;
        require_success(script, output, must_succeed)
    }
}

fn require_success(
    command: &str,
    output: CommandOutput,
    must_succeed: bool,
) -> EncryptionResult<CommandOutput> {
    if must_succeed && !output.success() {
        let diagnostic = output.diagnostic();
        return Err(EncryptionError::CommandFailed {
            command: command.to_string(),
            status: output.status,
            output: if diagnostic.is_empty() {
                "no additional output".to_string()
            } else {
                diagnostic.to_string()
            },
        });
    }
    Ok(output)
}

/// Executor backed by `std::process`, with a wall-clock limit per command.
#[derive(Clone)]
pub struct SystemCommandExecutor {
    logger: Arc<dyn Logger>,
    timeout: Duration,
}

impl SystemCommandExecutor {
    pub fn new(logger: Arc<dyn Logger>, timeout: Duration) -> Self {
        Self { logger, timeout }
    }

    fn spawn(&self, mut command: Command, display: &str) -> EncryptionResult<CommandOutput> {
        self.logger.log(&format!("Executing: {display}"));
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn()?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let output = self.wait_with_timeout(child, stdout_pipe, stderr_pipe, display)?;

        self.logger.log(&format!(
            "Command `{display}` exited with status {}",
            output.status
        ));
        Ok(output)
    }

    fn wait_with_timeout(
        &self,
        mut child: Child,
        stdout_pipe: Option<ChildStdout>,
        stderr_pipe: Option<ChildStderr>,
        display: &str,
    ) -> EncryptionResult<CommandOutput> {
        let start = Instant::now();
        let stdout_handle = spawn_output_reader(stdout_pipe);
        let stderr_handle = spawn_output_reader(stderr_pipe);
        let mut exit_status = None;

        while start.elapsed() <= self.timeout {
            if let Some(status) = child.try_wait()? {
                exit_status = Some(status);
                break;
            }
            thread::sleep(Duration::from_millis(25));
        }

        let Some(status) = exit_status else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EncryptionError::CommandTimedOut {
                command: display.to_string(),
                timeout: self.timeout,
            });
        };

        let stdout = stdout_handle
            .join()
            .map_err(|_| reader_panicked("stdout"))??;
        let stderr = stderr_handle
            .join()
            .map_err(|_| reader_panicked("stderr"))??;

        Ok(CommandOutput {
            status: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, command: &HostCommand) -> EncryptionResult<CommandOutput> {
        let mut process = Command::new(command.program());
        process.args(command.arguments());
        self.spawn(process, &command.to_string())
    }

    fn run_script(&self, script: &str) -> EncryptionResult<CommandOutput> {
        let mut process = Command::new(BASH);
        process.arg("-c").arg(script);
        self.spawn(process, script)
    }
}

fn reader_panicked(stream: &str) -> EncryptionError {
    EncryptionError::Io(std::io::Error::other(format!(
        "{stream} reader thread panicked"
    )))
}

fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<EncryptionResult<String>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || -> EncryptionResult<String> {
        if let Some(mut reader) = pipe {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        } else {
            Ok(String::new())
        }
    })
}
