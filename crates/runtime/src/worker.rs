//! Locating and spawning the terminal-host worker process.
//!
//! The worker is an external executable provided alongside the host
//! application. The supervisor talks to it exclusively over its stdio pipes;
//! stderr is inherited so crashes stay visible.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::error::{Error, Result};

const WORKER_EXE_ENV: &str = "TERMHOST_WORKER_EXE";
const WORKER_EXE_NAME: &str = "termhost-worker";

/// How to launch the worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Path to the worker executable.
    pub program: PathBuf,
    /// Entry-point identifier passed as the first argument, selecting which
    /// service the worker binary hosts.
    pub entry_point: String,
    /// Additional fixed arguments.
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Locates the worker executable and builds the default command.
    ///
    /// Search order:
    /// 1. `TERMHOST_WORKER_EXE` environment variable (runtime override)
    /// 2. `termhost-worker` next to the current executable
    /// 3. `termhost-worker` on `$PATH`
    pub fn locate(entry_point: impl Into<String>) -> Result<Self> {
        let program = find_worker_executable()?;
        Ok(Self {
            program,
            entry_point: entry_point.into(),
            args: Vec::new(),
        })
    }
}

fn find_worker_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(WORKER_EXE_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        warn!(
            target = "termhost",
            path = %path.display(),
            "TERMHOST_WORKER_EXE is set but does not exist; falling back"
        );
    }

    if let Ok(current) = std::env::current_exe() {
        if let Some(dir) = current.parent() {
            let sibling = dir.join(exe_name());
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    if let Some(path) = find_in_path(exe_name().as_ref()) {
        return Ok(path);
    }

    Err(Error::WorkerNotFound)
}

fn exe_name() -> String {
    if cfg!(windows) {
        format!("{WORKER_EXE_NAME}.exe")
    } else {
        WORKER_EXE_NAME.to_string()
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Exit details of a worker process, carried by the supervisor's exit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Process exit code, when the platform reports one (a worker killed by
    /// a signal on unix has none).
    pub code: Option<i32>,
    pub success: bool,
}

impl From<std::process::ExitStatus> for WorkerExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// A spawned worker process with piped stdio.
#[derive(Debug)]
pub struct WorkerProcess {
    pub(crate) child: Child,
}

impl WorkerProcess {
    /// Spawns the worker with the boot configuration in its environment and
    /// the debugger launch args appended to its argv.
    ///
    /// Spawn failures surface as [`Error::Spawn`] and are never retried
    /// here.
    pub fn spawn(
        command: &WorkerCommand,
        configuration: &Configuration,
        launch_args: &[String],
    ) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.arg(&command.entry_point)
            .args(&command.args)
            .args(launch_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in configuration.to_env() {
            cmd.env(key, value);
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {e}", command.program.display())))?;

        debug!(
            target = "termhost",
            program = %command.program.display(),
            entry_point = %command.entry_point,
            pid = child.id(),
            "spawned terminal-host worker"
        );

        Ok(Self { child })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoggingFlags, ReconnectConstants};
    use std::time::Duration;

    fn config() -> Configuration {
        Configuration::build(
            1,
            ReconnectConstants {
                grace_time: Duration::from_secs(60),
                short_grace_time: Duration::from_secs(6),
                scrollback: 100,
            },
            LoggingFlags::default(),
        )
    }

    #[tokio::test]
    async fn spawn_of_missing_program_fails_with_spawn_error() {
        let command = WorkerCommand {
            program: PathBuf::from("/nonexistent/termhost-worker"),
            entry_point: "ptyHost".to_string(),
            args: Vec::new(),
        };
        let err = WorkerProcess::spawn(&command, &config(), &[]).unwrap_err();
        assert!(matches!(err, Error::Spawn(_)), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_worker_sees_the_boot_configuration() {
        use tokio::io::AsyncReadExt;

        let command = WorkerCommand {
            program: PathBuf::from("/bin/sh"),
            entry_point: "-c".to_string(),
            args: vec!["printf %s \"$TERMHOST_LAST_SESSION_ID\"".to_string()],
        };
        let configuration = Configuration::build(
            42,
            ReconnectConstants {
                grace_time: Duration::from_secs(60),
                short_grace_time: Duration::from_secs(6),
                scrollback: 100,
            },
            LoggingFlags::default(),
        );

        let mut worker = WorkerProcess::spawn(&command, &configuration, &[]).unwrap();
        let mut stdout = worker.child.stdout.take().unwrap();
        let mut output = String::new();
        stdout.read_to_string(&mut output).await.unwrap();
        assert_eq!(output, "42");
        let _ = worker.child.wait().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_worker_reports_exit_status() {
        let command = WorkerCommand {
            program: PathBuf::from("/bin/true"),
            entry_point: "ptyHost".to_string(),
            args: Vec::new(),
        };
        let mut worker = WorkerProcess::spawn(&command, &config(), &[]).unwrap();
        let status = worker.child.wait().await.unwrap();
        let exit = WorkerExit::from(status);
        assert!(exit.success);
        assert_eq!(exit.code, Some(0));
    }
}
