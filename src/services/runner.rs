use crate::domain::errors::LimriError;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// One external tool call and the files it is expected to leave behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

pub trait ToolRunner {
    fn run(&self, invocation: &Invocation) -> anyhow::Result<()>;
}

/// Runs invocations as blocking child processes. Tool stdout is sent to
/// stderr so that stdout carries command output only.
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> anyhow::Result<()> {
        tracing::debug!(command = %invocation.command_line(), "running external tool");
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdout(Stdio::from(std::io::stderr()))
            .status()
            .map_err(|e| {
                anyhow::anyhow!("cannot start {}: {}", invocation.program.display(), e)
            })?;
        if !status.success() {
            return Err(LimriError::ToolFailed {
                program: invocation.program.display().to_string(),
                status: status.to_string(),
            }
            .into());
        }
        for output in &invocation.outputs {
            if !output.exists() {
                return Err(LimriError::MissingOutput {
                    program: invocation.program.display().to_string(),
                    output: output.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}
