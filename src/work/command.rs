// src/work/command.rs

//! Work units backed by a shell command.
//!
//! Input data is exported to the child as:
//! - `CHAINWORK_INPUT`: the whole input as a JSON object
//! - `CHAINWORK_<KEY>`: one variable per top-level key (upper-cased; string
//!   values are passed verbatim, others as JSON). A key that would map onto
//!   `CHAINWORK_INPUT` is not exported on its own.
//!
//! Exit status mapping:
//! - `0` → `Success`, with the JSON object printed on the last non-empty
//!   stdout line as output; if stdout is empty the input passes through.
//! - `75` (`EX_TEMPFAIL`) → `Retry`
//! - anything else → `Failure`
//!
//! A stop request kills the child and the unit reports `Retry` (it did not
//! finish).

use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tracing::{debug, info, warn};

use crate::work::{Data, Outcome, WorkContext, WorkUnit};

/// Exit code a command uses to ask for a retry.
pub const EXIT_RETRY: i32 = 75;

/// Variable holding the whole input as JSON.
pub const INPUT_VAR: &str = "CHAINWORK_INPUT";

/// Build a [`WorkUnit`] that runs `cmd` through the platform shell.
///
/// The unit blocks its thread until the child exits, so it must run on a
/// blocking thread (the pool executor uses `spawn_blocking`) or outside any
/// Tokio runtime.
pub fn command_unit(name: impl Into<String>, cmd: impl Into<String>) -> WorkUnit {
    let name = name.into();
    let cmd = cmd.into();
    let unit_name = name.clone();

    WorkUnit::new(name, move |ctx| run_command(&unit_name, &cmd, ctx))
}

fn run_command(name: &str, cmd: &str, ctx: &WorkContext) -> Outcome {
    match Handle::try_current() {
        Ok(handle) => handle.block_on(run_child(name, cmd, ctx)),
        Err(_) => match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(run_child(name, cmd, ctx)),
            Err(err) => Outcome::failure(format!("starting runtime for command '{name}': {err}")),
        },
    }
}

async fn run_child(name: &str, cmd: &str, ctx: &WorkContext) -> Outcome {
    info!(unit = %name, attempt = ctx.attempt(), cmd = %cmd, "starting command");

    let mut command = shell_command(cmd);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in ctx.input().iter() {
        let var = env_key(key);
        if var == INPUT_VAR {
            debug!(unit = %name, key = %key, "key shadows {INPUT_VAR}; not exported");
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        command.env(var, rendered);
    }
    command.env(INPUT_VAR, ctx.input().to_json().to_string());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return Outcome::failure(format!("spawning command for '{name}': {err}")),
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::select! {
        (status_res, last_out, last_err) = async {
            tokio::join!(
                child.wait(),
                last_line(name, stdout, false),
                last_line(name, stderr, true),
            )
        } => {
            let status = match status_res {
                Ok(status) => status,
                Err(err) => return Outcome::failure(format!("waiting for command '{name}': {err}")),
            };

            let code = status.code().unwrap_or(-1);
            info!(unit = %name, exit_code = code, success = status.success(), "command exited");

            if status.success() {
                return parse_output(name, last_out.as_deref(), ctx.input());
            }
            if code == EXIT_RETRY {
                return Outcome::Retry;
            }
            match last_err.as_deref().map(str::trim) {
                Some(tail) if !tail.is_empty() => Outcome::failure(format!("exit code {code}: {tail}")),
                _ => Outcome::failure(format!("exit code {code}")),
            }
        }

        _ = ctx.stop_token().cancelled() => {
            info!(unit = %name, "stop requested; killing command");
            if let Err(err) = child.kill().await {
                warn!(unit = %name, error = %err, "failed to kill command on stop");
            }
            Outcome::Retry
        }
    }
}

fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn env_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("CHAINWORK_{cleaned}")
}

/// Consume a child pipe to the end and keep its last non-empty line.
async fn last_line<R>(name: &str, pipe: Option<R>, log: bool) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(pipe?).split(b'\n');
    let mut last = None;

    loop {
        match segments.next_segment().await {
            Ok(Some(raw)) => {
                let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
                if log {
                    debug!(unit = %name, "stderr: {}", line);
                }
                if !line.trim().is_empty() {
                    last = Some(line);
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(unit = %name, error = %err, "reading command pipe failed");
                break;
            }
        }
    }

    last
}

fn parse_output(name: &str, last: Option<&str>, input: &Data) -> Outcome {
    let Some(line) = last.map(str::trim) else {
        return Outcome::success(input.clone());
    };

    match serde_json::from_str::<Value>(line).ok().and_then(Data::from_json_object) {
        Some(output) => Outcome::success(output),
        None => Outcome::failure(format!(
            "command '{name}' printed a non-JSON-object result: {line}"
        )),
    }
}
