//! Execution of native control-plane tools.

use std::process::Command;

use crate::error::{ServiceError, io_err};

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner {
    /// Run to completion with captured output.
    fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError>;

    /// Run with inherited stdio until the process exits.
    fn stream(&self, program: &str, args: &[&str]) -> Result<bool, ServiceError>;
}

/// Runner over `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError> {
        log::debug!("exec: {}", command_line(program, args));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| io_err(program, e))?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn stream(&self, program: &str, args: &[&str]) -> Result<bool, ServiceError> {
        log::debug!("exec (streaming): {}", command_line(program, args));
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| io_err(program, e))?;
        Ok(status.success())
    }
}

/// Run and turn a non-zero exit into `ServiceError::BackendCommand`.
pub fn run_checked<R: CommandRunner + ?Sized>(
    runner: &R,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, ServiceError> {
    let output = runner.output(program, args)?;
    if output.success {
        return Ok(output);
    }

    let stderr = output.stderr.trim();
    Err(ServiceError::BackendCommand {
        command: command_line(program, args),
        status: output.status.clone(),
        stderr: if stderr.is_empty() {
            output.stdout.trim().to_string()
        } else {
            stderr.to_string()
        },
    })
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
