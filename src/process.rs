//! External commands.
//!
//! Commands are described with the [`Cmd`] builder and run through an
//! [`Executor`], so code that shells out can be tested with a recording
//! executor instead of real binaries.
//!
//! ```rust,no_run
//! use isoeditor::process::{Cmd, CommandExecutor, Executor};
//! use std::path::Path;
//!
//! let cmd = Cmd::new("cpio")
//!     .args(["-idm", "root.squashfs"])
//!     .stdin_file("/tmp/rootfs.img")
//!     .error_msg("cpio extraction failed");
//! CommandExecutor.execute(&cmd, Path::new("/tmp")).unwrap();
//! ```

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{IoResultExt, IsoEditorError, Result};

/// A command line to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    stdin: Option<PathBuf>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy())
    }

    /// Feed the contents of `path` on stdin.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Message reported when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_stdin(&self) -> Option<&Path> {
        self.stdin.as_deref()
    }

    /// The command line, for messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status and output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs commands.
pub trait Executor {
    /// Run `cmd` with `workdir` as its working directory.
    ///
    /// A non-zero exit is a [`Process`](IsoEditorError::Process) error.
    fn execute(&self, cmd: &Cmd, workdir: &Path) -> Result<CommandResult>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

impl Executor for CommandExecutor {
    fn execute(&self, cmd: &Cmd, workdir: &Path) -> Result<CommandResult> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .current_dir(workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match &cmd.stdin {
            Some(path) => {
                let file = File::open(path).io_context(|| format!("opening {}", path.display()))?;
                command.stdin(file);
            }
            None => {
                command.stdin(Stdio::null());
            }
        }

        tracing::debug!(command = %cmd.display(), workdir = %workdir.display(), "Running command");

        let output = command.output().map_err(|e| IsoEditorError::Process {
            command: cmd.display(),
            message: e.to_string(),
        })?;

        let result = CommandResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        check_result(cmd, result)
    }
}

/// Turn a failed exit into an error.
pub(crate) fn check_result(cmd: &Cmd, result: CommandResult) -> Result<CommandResult> {
    if result.success() {
        return Ok(result);
    }

    let status = result
        .exit_code
        .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {}", c));
    let detail = match result.stderr.trim() {
        "" => status,
        stderr => format!("{}: {}", status, stderr),
    };
    let message = match &cmd.error_msg {
        Some(msg) => format!("{} ({})", msg, detail),
        None => detail,
    };

    Err(IsoEditorError::Process {
        command: cmd.display(),
        message,
    })
}

/// Locate `program` on `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

/// Whether `program` is on `PATH`.
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder() {
        let cmd = Cmd::new("unsquashfs")
            .args(["-no-xattrs", "-d"])
            .arg_path(Path::new("squashfs-root"))
            .arg("root.squashfs");
        assert_eq!(cmd.program(), "unsquashfs");
        assert_eq!(cmd.display(), "unsquashfs -no-xattrs -d squashfs-root root.squashfs");
        assert!(cmd.get_stdin().is_none());
    }

    #[test]
    fn test_failed_exit_is_error() {
        let cmd = Cmd::new("cpio").error_msg("cpio extraction failed");
        let result = CommandResult {
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "premature end of archive\n".to_string(),
        };

        let err = check_result(&cmd, result).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cpio extraction failed"));
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("premature end of archive"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_executor_runs_in_workdir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("input"), "from stdin").unwrap();

        let out = CommandExecutor
            .execute(&Cmd::new("cat").stdin_file(temp.path().join("input")), temp.path())
            .unwrap();
        assert_eq!(out.stdout, "from stdin");

        let out = CommandExecutor.execute(&Cmd::new("pwd"), temp.path()).unwrap();
        let reported = PathBuf::from(out.stdout.trim()).canonicalize().unwrap();
        assert_eq!(reported, temp.path().canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_program() {
        let temp = TempDir::new().unwrap();
        let err = CommandExecutor
            .execute(&Cmd::new("definitely_not_a_real_command_12345"), temp.path())
            .unwrap_err();
        assert!(matches!(err, IsoEditorError::Process { .. }));
    }

    #[test]
    fn test_which() {
        assert!(!exists("definitely_not_a_real_command_12345"));
        #[cfg(unix)]
        assert!(exists("sh"));
    }
}
