use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::constants::PORT_ENV_VAR;
use crate::error::{DeployError, Result};

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub working_dir: PathBuf,
    pub command: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
}

pub trait Launcher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle>;
}

/// Runs the command through `sh -c` in a session of its own.
///
/// The child becomes a session and process group leader, so a signal aimed at the manager's
/// group (Ctrl-C, a dying terminal) does not reach it. Output is inherited, not captured. The
/// `Child` is dropped without waiting: nothing here supervises the process after it starts.
#[derive(Debug, Clone, Default)]
pub struct DetachedShellLauncher;

impl Launcher for DetachedShellLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle> {
        let child = detached_shell(&spec.working_dir, &spec.command)
            .env(PORT_ENV_VAR, spec.port.to_string())
            .spawn()
            .map_err(|source| DeployError::Spawn {
                command: spec.command.clone(),
                source,
            })?;
        let pid = child.id();
        tracing::info!(
            pid,
            port = spec.port,
            dir = %spec.working_dir.display(),
            command = %spec.command,
            "launched detached process"
        );
        Ok(ProcessHandle { pid })
    }
}

fn detached_shell(working_dir: &Path, command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null());
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    cmd
}
