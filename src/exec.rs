//! External process execution.
//!
//! [`Executor`] is the seam between orchestration and the operating system:
//! [`SystemExecutor`] spawns real processes, tests substitute recorded
//! fixtures.

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{Result, SimError};

/// A fully specified command: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.working_dir {
            write!(f, "cd {} && ", dir.display())?;
        }
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Iterate over `\n` or `\r\n` terminated lines, replacing invalid UTF-8
/// with U+FFFD instead of failing.
pub fn lossy_lines<R: BufRead>(reader: R) -> LossyLines<R> {
    LossyLines {
        reader,
        buf: Vec::new(),
    }
}

/// Iterator returned by [`lossy_lines`].
#[derive(Debug)]
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Runs a command to completion and reports its exit code.
pub trait Executor {
    /// Execute `invocation`, passing each stdout line to `on_line`.
    ///
    /// Returns the exit code; termination by signal is reported as `-1`.
    fn run(&self, invocation: &Invocation, on_line: &mut dyn FnMut(&str)) -> Result<i32>;
}

/// Spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, invocation: &Invocation, on_line: &mut dyn FnMut(&str)) -> Result<i32> {
        let _span = tracing::debug_span!("exec", command = %invocation).entered();
        let mut child = invocation
            .to_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SimError::RunFailed("child stdout was not captured".to_string()))?;
        for line in lossy_lines(BufReader::new(stdout)) {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            };
            on_line(&line);
        }

        let status = child.wait()?;
        let code = status.code().unwrap_or(-1);
        tracing::debug!(code, "process exited");
        Ok(code)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_system_executor_streams_lines_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation::new("/bin/sh")
            .args(["-c", "echo one; echo two; pwd; exit 3"])
            .current_dir(dir.path());
        let mut lines = Vec::new();
        let code = SystemExecutor
            .run(&invocation, &mut |l| lines.push(l.to_string()))
            .unwrap();
        assert_eq!(code, 3);
        assert_eq!(&lines[..2], &["one", "two"]);
        let pwd = std::fs::canonicalize(&lines[2]).unwrap();
        assert_eq!(pwd, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_lossy_lines_replace_invalid_utf8() {
        let input: &[u8] = b"title\r\nCopyright \xa9 Synopsys\n\nlast";
        let lines: Vec<String> = lossy_lines(input).map(|l| l.unwrap()).collect();
        assert_eq!(
            lines,
            vec!["title", "Copyright \u{FFFD} Synopsys", "", "last"]
        );
    }

    #[test]
    fn test_system_executor_survives_non_utf8_output() {
        let invocation = Invocation::new("/bin/sh")
            .args(["-c", "printf 'Copyright \\251 Synopsys\\ndone\\n'"]);
        let mut lines = Vec::new();
        let code = SystemExecutor
            .run(&invocation, &mut |l| lines.push(l.to_string()))
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(lines, vec!["Copyright \u{FFFD} Synopsys", "done"]);
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let err = SystemExecutor
            .run(&Invocation::new("/no/such/simulator"), &mut |_| {})
            .unwrap_err();
        assert!(!err.is_domain());
    }

    #[test]
    fn test_display_includes_working_dir() {
        let invocation = Invocation::new("hspice")
            .args(["-i", "run.spi"])
            .current_dir("/tmp/run");
        assert_eq!(invocation.to_string(), "cd /tmp/run && hspice -i run.spi");
    }
}
