//! Subprocess plumbing shared by the substrate backends.
//!
//! All interaction with the `docker`, `kubectl` and `helm` binaries goes
//! through this module so that command output ends up in the tracing stream
//! and failures carry enough context to be actionable.

use std::{collections::VecDeque, process::Stdio};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use crate::{error::EposctlError, EposctlResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Number of trailing stderr lines carried into a command failure.
const STDERR_TAIL_LINES: usize = 20;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs a command to completion and returns its captured stdout.
///
/// Output is streamed line-wise as it arrives, stdout at info level and
/// stderr at error level, so long invocations like `docker compose up` stay
/// observable. With `suppress` set both streams log at debug level instead,
/// for commands whose output is data rather than progress (`helm list -o
/// json`, `kubectl get -o jsonpath=...`).
///
/// A non-zero exit becomes [`EposctlError::CommandFailed`] carrying the full
/// command line and the last stderr lines.
pub async fn run_command(mut command: Command, suppress: bool) -> EposctlResult<String> {
    let rendered = render_command(&command);
    debug!("running `{}`", rendered);

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_handle = capture_stdout(&mut child, suppress);
    let stderr_handle = capture_stderr_tail(&mut child, suppress);

    let status = child.wait().await?;
    let stdout = stdout_handle.await?;
    let stderr_tail = stderr_handle.await?;

    if !status.success() {
        return Err(EposctlError::CommandFailed {
            command: rendered,
            status: status.to_string(),
            stderr: join_tail(stderr_tail),
        });
    }

    Ok(stdout)
}

/// Spawns a command with piped stdio and hands the running child to the
/// caller.
///
/// Used for processes that outlive a single invocation, like `kubectl
/// port-forward`; the caller owns readiness detection and termination.
pub fn start_command(mut command: Command) -> EposctlResult<Child> {
    let rendered = render_command(&command);
    debug!("starting `{}`", rendered);

    let child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    Ok(child)
}

/// Renders a command as the single line a user could paste into a shell.
pub fn render_command(command: &Command) -> String {
    let command = command.as_std();
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn capture_stdout(child: &mut Child, suppress: bool) -> JoinHandle<String> {
    let stdout = child.stdout.take();
    tokio::spawn(async move {
        let mut captured = String::new();
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if suppress {
                    debug!("{}", line);
                } else {
                    info!("{}", line);
                }
                captured.push_str(&line);
                captured.push('\n');
            }
        }
        captured
    })
}

fn capture_stderr_tail(child: &mut Child, suppress: bool) -> JoinHandle<VecDeque<String>> {
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        let mut tail = VecDeque::new();
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if suppress {
                    debug!("{}", line);
                } else {
                    error!("{}", line);
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        tail
    })
}

fn join_tail(tail: VecDeque<String>) -> String {
    if tail.is_empty() {
        return "(no stderr output)".to_string();
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_returns_captured_stdout() -> EposctlResult<()> {
        let mut command = Command::new("sh");
        command.args(["-c", "printf 'one\\ntwo\\n'"]);

        let stdout = run_command(command, true).await?;
        assert_eq!(stdout, "one\ntwo\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_run_command_surfaces_failure_with_stderr_tail() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo boom >&2; exit 3"]);

        let error = run_command(command, true).await.unwrap_err();
        match error {
            EposctlError::CommandFailed {
                command,
                status,
                stderr,
            } => {
                assert!(command.starts_with("sh -c"));
                assert!(status.contains('3'));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_command_failure_without_stderr_gets_placeholder() {
        let mut command = Command::new("sh");
        command.args(["-c", "exit 1"]);

        let error = run_command(command, true).await.unwrap_err();
        match error {
            EposctlError::CommandFailed { stderr, .. } => {
                assert_eq!(stderr, "(no stderr output)");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_render_command_includes_arguments() {
        let mut command = Command::new("docker");
        command.args(["compose", "-p", "e1", "up", "-d"]);

        assert_eq!(render_command(&command), "docker compose -p e1 up -d");
    }
}
