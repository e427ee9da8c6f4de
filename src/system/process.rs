//! Subprocess Utilities

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};

use crate::system::Error;

/// Convenience wrapper around `Command` for building a child process.
///
/// Children inherit the orchestrator's stdio; compiler and linker
/// output goes straight to the terminal.
pub struct ChildBuilder {
    command_str: String,
    command: Command,
}

impl ChildBuilder {
    pub fn new<S>(program: S) -> Self
    where
        S: AsRef<OsStr>,
    {
        Self {
            command_str: program.as_ref().to_string_lossy().to_string(),
            command: Command::new(program),
        }
    }

    /// Build a `sh -c` invocation; op commands contain shell constructs.
    pub fn shell(script: &str) -> Self {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        Self {
            command_str: script.to_string(),
            command,
        }
    }

    #[inline]
    pub fn current_dir<P>(mut self, dir: P) -> Self
    where
        P: AsRef<Path>,
    {
        self.command.current_dir(dir);
        self
    }

    /// Set args as in `Command`
    #[inline]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.command_str.push(' ');
            self.command_str
                .push_str(&arg.as_ref().to_string_lossy());
            self.command.arg(arg.as_ref());
        }
        self
    }

    pub fn spawn(mut self) -> Result<ChildProcess, Error> {
        let child = self
            .command
            .spawn()
            .map_err(|e| Error::SpawnChild(self.command_str.clone(), e))?;
        Ok(ChildProcess {
            command_str: self.command_str,
            child,
        })
    }
}

/// Convenience wrapper around `Child` for a spawned process
pub struct ChildProcess {
    command_str: String,
    child: Child,
}

impl ChildProcess {
    pub fn command(&self) -> &str {
        &self.command_str
    }

    /// Wait for the child process to exit
    pub fn wait(mut self) -> Result<ExitStatus, Error> {
        self.child
            .wait()
            .map_err(|e| Error::WaitForChild(self.command_str.clone(), e))
    }

    /// Wait and turn a non-zero status into a `ChildFailure`.
    pub fn check(self) -> Result<(), Error> {
        let command_str = self.command_str.clone();
        let status = self.wait()?;
        if status.success() {
            return Ok(());
        }
        Err(Error::ChildFailure(command_str, status.code().unwrap_or(1)))
    }
}
