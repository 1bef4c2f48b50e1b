/// Running external processes and classifying their exit status
use crate::config::types::{LifecycleError, Result};
use std::process::{Command, ExitStatus, Stdio};

/// Builds the error for a failed external step from its exit code (if it
/// exited normally) and a message
pub type FailureFn = fn(Option<i32>, String) -> LifecycleError;

pub fn build_failure(status: Option<i32>, message: String) -> LifecycleError {
    LifecycleError::BuildFailed { status, message }
}

pub fn activation_failure(status: Option<i32>, message: String) -> LifecycleError {
    LifecycleError::ActivationFailed { status, message }
}

/// Render a command line for logs
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

fn check_status(cmd: &Command, status: ExitStatus, on_failure: FailureFn) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    let message = match status.code() {
        Some(code) => format!("`{}` exited with status {}", describe(cmd), code),
        None => {
            use std::os::unix::process::ExitStatusExt;
            format!(
                "`{}` terminated by signal {}",
                describe(cmd),
                status.signal().unwrap_or_default()
            )
        }
    };
    Err(on_failure(status.code(), message))
}

/// Run to completion with inherited stdio
pub fn run_checked(cmd: &mut Command, on_failure: FailureFn) -> Result<()> {
    log::debug!("Running {}", describe(cmd));
    let status = cmd
        .status()
        .map_err(|e| on_failure(None, format!("failed to run `{}`: {}", describe(cmd), e)))?;
    check_status(cmd, status, on_failure)
}

/// Run to completion, returning captured stdout; stderr stays attached
pub fn capture_stdout(cmd: &mut Command, on_failure: FailureFn) -> Result<String> {
    log::debug!("Running {}", describe(cmd));
    let output = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| on_failure(None, format!("failed to run `{}`: {}", describe(cmd), e)))?;
    check_status(cmd, output.status, on_failure)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run and only report failure; used for best-effort steps
pub fn run_best_effort(cmd: &mut Command) -> bool {
    log::debug!("Running {}", describe(cmd));
    match cmd.status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            log::debug!("`{}` exited with {}", describe(cmd), status);
            false
        }
        Err(e) => {
            log::debug!("failed to run `{}`: {}", describe(cmd), e);
            false
        }
    }
}
