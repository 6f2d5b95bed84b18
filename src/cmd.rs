//! Running external programs.
//!
//! Both the wrapper and the publisher are nothing more than a fixed sequence of `buildah` and
//! `skopeo` invocations.  They go through [`CommandRunner`] rather than spawning processes
//! directly, so that tests can substitute a runner that records command lines instead.

use std::{
    ffi::{OsStr, OsString},
    process::{Command, Stdio},
};

use log::debug;

use crate::{Error, Result};

/// Executes command lines, blocking until each one finishes.
///
/// `argv[0]` is the program, the rest are its arguments.  A non-zero exit is always an error.
pub trait CommandRunner {
    /// Runs a command, letting its output go to our own stdout and stderr.
    fn run(&self, argv: &[OsString]) -> Result<()>;

    /// Runs a command and returns its stdout with surrounding whitespace removed.
    fn output(&self, argv: &[OsString]) -> Result<String>;
}

/// Renders a command line for logs and error messages.
pub fn display_argv(argv: &[OsString]) -> String {
    argv.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Joins a transport prefix such as `oci-archive:` with a path or reference without going
/// through `String`, so non-UTF-8 paths survive intact.
pub fn prefixed(prefix: &str, rest: impl AsRef<OsStr>) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(rest);
    arg
}

/// A [`CommandRunner`] that spawns real processes on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl HostRunner {
    fn command(argv: &[OsString]) -> Result<Command> {
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::EmptyCommand);
        };
        debug!("running {}", display_argv(argv));
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }

    fn spawn_error(argv: &[OsString], source: std::io::Error) -> Error {
        Error::Spawn {
            program: argv[0].to_string_lossy().into_owned(),
            source,
        }
    }
}

impl CommandRunner for HostRunner {
    fn run(&self, argv: &[OsString]) -> Result<()> {
        let status = Self::command(argv)?
            .status()
            .map_err(|e| Self::spawn_error(argv, e))?;
        if !status.success() {
            return Err(Error::CommandFailed {
                command: display_argv(argv),
                status,
            });
        }
        Ok(())
    }

    fn output(&self, argv: &[OsString]) -> Result<String> {
        let output = Self::command(argv)?
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| Self::spawn_error(argv, e))?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: display_argv(argv),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
