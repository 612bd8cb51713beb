//! External process adapter: run a command, capture everything it says.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::CommandError;

/// Full captured output of one process run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `cmd` to completion and returns the full stdout/stderr text
/// alongside the process's error status (launch failure or nonzero exit).
///
/// Read errors on either stream are folded into the corresponding text as
/// a descriptive placeholder: callers always get a string, never a missing
/// value. No timeout is enforced here; a hanging process holds its worker.
pub async fn run_command(cmd: &mut Command) -> (CommandOutput, Result<(), CommandError>) {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            return (
                CommandOutput::default(),
                Err(CommandError::Launch { program, source }),
            );
        }
    };

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let (stdout, stderr, waited) = tokio::join!(
        slurp(stdout_pipe, "stdout"),
        slurp(stderr_pipe, "stderr"),
        child.wait(),
    );

    let output = CommandOutput { stdout, stderr };
    let result = match waited {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CommandError::Exit { program, status }),
        Err(source) => Err(CommandError::Wait { program, source }),
    };
    (output, result)
}

async fn slurp<R: AsyncRead + Unpin>(pipe: Option<R>, stream: &str) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    match pipe.read_to_end(&mut buf).await {
        Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => format!("error reading command's {stream}: {e}"),
    }
}
