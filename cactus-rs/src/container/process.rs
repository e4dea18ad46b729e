use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Container;
use crate::error::{CactusError, Result};

/// How a [`ProcessContainer`] is stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopCommand {
    /// Kill the process started by `start_up`.
    Kill,
    /// Run a command, e.g. the container's own shutdown script, and wait for
    /// it to finish.
    Run { program: String, args: Vec<String> },
}

/// A container started as an external process, such as an application
/// server's startup script.
#[derive(Debug)]
pub struct ProcessContainer {
    name: String,
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    stop: StopCommand,
    child: Mutex<Option<Child>>,
}

impl ProcessContainer {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            name: program.clone(),
            program,
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            stop: StopCommand::Kill,
            child: Mutex::new(None),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_stop(mut self, stop: StopCommand) -> Self {
        self.stop = stop;
        self
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut command = Command::new(program);
        command
            .args(args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl Container for ProcessContainer {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Spawns the process. The runner probes for readiness; a process that
    /// exits early with a failure is reported on the next shut-down.
    async fn start_up(&self) -> Result<()> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Err(CactusError::Container(format!("{} is already started", self.name)));
        }
        let child = self
            .command(&self.program, &self.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| CactusError::Container(format!("cannot start {}: {err}", self.program)))?;
        info!(container = %self.name, pid = ?child.id(), "process started");
        *slot = Some(child);
        Ok(())
    }

    async fn shut_down(&self) -> Result<()> {
        let child = self.child.lock().await.take();
        match &self.stop {
            StopCommand::Kill => {
                let Some(mut child) = child else {
                    return Ok(());
                };
                if let Some(status) = child.try_wait()? {
                    debug!(container = %self.name, %status, "process already exited");
                    return Ok(());
                }
                child.kill().await?;
                Ok(())
            }
            StopCommand::Run { program, args } => {
                let status = self.command(program, args).status().await?;
                if !status.success() {
                    return Err(CactusError::Container(format!(
                        "stop command {program} exited with {status}"
                    )));
                }
                if let Some(mut child) = child {
                    let status = child.wait().await?;
                    debug!(container = %self.name, %status, "process exited");
                }
                Ok(())
            }
        }
    }
}
