//! External command execution
//!
//! Every effect outside the Kubernetes API (`aws`, `ssh`, `eksctl`,
//! `terraform`) goes through a [`CommandRunner`], so the logic deciding what
//! to run can be tested with [`MockCommandRunner`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use crate::error::{KubeError, Result};

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name, resolved through PATH
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Stream output to the terminal instead of capturing it
    pub inherit_stdio: bool,
}

impl CommandSpec {
    /// Start building an invocation of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            inherit_stdio: false,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Let the child write straight to the terminal
    pub fn interactive(mut self) -> Self {
        self.inherit_stdio = true;
        self
    }

    /// Value following `flag` in the argument list, if any
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal)
    pub code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion
    ///
    /// A non-zero exit is returned as output, not as an error. A missing
    /// program is reported as [`KubeError::ProviderUnavailable`].
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run a command and turn a non-zero exit into [`KubeError::CommandFailed`]
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(KubeError::CommandFailed {
                command: spec.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> KubeError {
    if err.kind() == std::io::ErrorKind::NotFound {
        KubeError::ProviderUnavailable {
            tool: program.to_string(),
        }
    } else {
        KubeError::Io(err)
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!(command = %spec, "running command");

        // A cancelled run takes its child with it
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args).kill_on_drop(true);

        if spec.inherit_stdio {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|e| spawn_error(&spec.program, e))?;

            return Ok(CommandOutput {
                code: status.code().unwrap_or(-1),
                ..Default::default()
            });
        }

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(&spec.program, e))?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

type Handler = Arc<dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync>;

/// Scripted command runner for tests
///
/// Programs without a handler succeed with empty output. Programs marked
/// missing fail the way an absent binary would.
#[derive(Clone, Default)]
pub struct MockCommandRunner {
    handlers: Arc<Mutex<HashMap<String, Handler>>>,
    missing: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `program` with `handler`
    pub fn on<F>(&self, program: &str, handler: F) -> &Self
    where
        F: Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(program.to_string(), Arc::new(handler));
        self
    }

    /// Answer every call to `program` with the same output
    pub fn respond(&self, program: &str, output: CommandOutput) -> &Self {
        self.on(program, move |_| output.clone())
    }

    /// Pretend `program` is not installed
    pub fn missing(&self, program: &str) -> &Self {
        self.missing.lock().unwrap().push(program.to_string());
        self
    }

    /// Every invocation so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations of `program`
    pub fn call_count(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program)
            .count()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        if self.missing.lock().unwrap().contains(&spec.program) {
            return Err(KubeError::ProviderUnavailable {
                tool: spec.program.clone(),
            });
        }

        let handler = self.handlers.lock().unwrap().get(&spec.program).cloned();
        Ok(match handler {
            Some(handler) => handler(spec),
            None => CommandOutput::default(),
        })
    }
}
