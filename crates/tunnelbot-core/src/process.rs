// Bounded invocation of external tools (config generators, service restart).

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::CoreError;

/// Captured output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args...` with no stdin and wait at most `timeout`.
///
/// The child is killed if the deadline passes. A non-zero exit, or a
/// program that cannot be started, is `ExternalToolFailed`.
pub async fn run_tool<P, I, S>(program: P, args: I, timeout: Duration) -> Result<ToolOutput, CoreError>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.as_ref().to_string_lossy().into_owned();

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(tool = %tool, ?timeout, "running external tool");
    let child = cmd.spawn().map_err(|e| CoreError::ExternalToolFailed {
        tool: tool.clone(),
        code: None,
        stderr: format!("failed to start: {e}"),
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => {
            return Err(CoreError::ExternalToolTimeout {
                tool,
                timeout_secs: timeout.as_secs(),
            });
        }
        Ok(Err(e)) => {
            return Err(CoreError::ExternalToolFailed {
                tool,
                code: None,
                stderr: e.to_string(),
            });
        }
        Ok(Ok(output)) => output,
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();

    if output.status.success() {
        Ok(ToolOutput { stdout, stderr })
    } else {
        Err(CoreError::ExternalToolFailed {
            tool,
            code: output.status.code(),
            stderr,
        })
    }
}
