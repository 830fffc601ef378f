//! External process execution with an optional watchdog

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use strongbox_core::BackupError;
use tokio::process::Command;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Arguments as lossy strings (for assertions and logs)
    pub fn arg_strings(&self) -> Vec<String> {
        self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Why an invocation failed
#[derive(Debug)]
pub enum RunFailure {
    /// The program could not be started or waited on
    Spawn(std::io::Error),
    /// The program exited unsuccessfully
    Exit { code: Option<i32>, stderr: String },
    /// The watchdog killed the program
    Timeout(Duration),
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::Spawn(e) => write!(f, "failed to run: {}", e),
            RunFailure::Exit { code: Some(code), stderr } if stderr.is_empty() => {
                write!(f, "exit status {}", code)
            }
            RunFailure::Exit { code: Some(code), stderr } => {
                write!(f, "exit status {}: {}", code, stderr)
            }
            RunFailure::Exit { code: None, .. } => write!(f, "terminated by signal"),
            RunFailure::Timeout(after) => write!(f, "timed out after {:?}", after),
        }
    }
}

impl RunFailure {
    /// Map into the pipeline taxonomy. Watchdog expiry keeps its own variant;
    /// every other failure goes through `classify`.
    pub fn into_backup_error(
        self,
        what: impl Into<String>,
        classify: impl FnOnce(String) -> BackupError,
    ) -> BackupError {
        match self {
            RunFailure::Timeout(after) => BackupError::Timeout {
                what: what.into(),
                after,
            },
            other => classify(other.to_string()),
        }
    }
}

/// Runs invocations, killing them when the watchdog expires
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run to completion and return stdout
    pub async fn run(&self, invocation: &Invocation) -> Result<String, RunFailure> {
        tracing::debug!(command = %invocation, "Running external command");

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RunFailure::Spawn)?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            // Dropping the future drops the child, which kills it
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result.map_err(RunFailure::Spawn)?,
                Err(_) => {
                    tracing::warn!(command = %invocation, "Watchdog expired after {:?}", limit);
                    return Err(RunFailure::Timeout(limit));
                }
            },
            None => wait.await.map_err(RunFailure::Spawn)?,
        };

        if !output.status.success() {
            return Err(RunFailure::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Render a path as a `file://` URL
pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}
