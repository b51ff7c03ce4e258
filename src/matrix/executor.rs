use std::{
    fs::File,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use super::{job::Invocation, OutputStream};
use crate::{errors::HarnessError, results::ResultLog};

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Exited { code: Option<i32>, success: bool },
    /// Killed after running past the deadline.
    TimedOut,
}

impl From<ExitStatus> for Completion {
    fn from(status: ExitStatus) -> Self {
        Completion::Exited {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// Runs a single invocation to completion, appending its captured stream to `log`.
/// `Err` means the invocation could not be started at all.
pub trait JobExecutor: Sync {
    fn execute(
        &self,
        invocation: &Invocation,
        log: &ResultLog,
        timeout: Option<Duration>,
    ) -> Result<Completion, HarnessError>;
}

/// Executes invocations as child processes, blocking until they exit.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    poll_interval: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl ProcessExecutor {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    fn wait_until(&self, child: &mut Child, timeout: Duration) -> std::io::Result<Completion> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status.into());
            }
            let now = Instant::now();
            if now >= deadline {
                // the process may have exited in between, kill then fails with InvalidInput
                let _ = child.kill();
                child.wait()?;
                return Ok(Completion::TimedOut);
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

impl JobExecutor for ProcessExecutor {
    fn execute(
        &self,
        invocation: &Invocation,
        log: &ResultLog,
        timeout: Option<Duration>,
    ) -> Result<Completion, HarnessError> {
        let stdin = match &invocation.stdin {
            Some(path) => Stdio::from(File::open(path).map_err(|e| HarnessError::io(path, e))?),
            None => Stdio::null(),
        };
        let sink = Stdio::from(log.open_append()?);
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).stdin(stdin);
        match invocation.capture {
            OutputStream::Stdout => command.stdout(sink).stderr(Stdio::inherit()),
            OutputStream::Stderr => command.stderr(sink).stdout(Stdio::inherit()),
        };
        let mut child = command
            .spawn()
            .map_err(|e| HarnessError::io(&invocation.program, e))?;
        let completion = match timeout {
            Some(limit) => self.wait_until(&mut child, limit),
            None => child.wait().map(Completion::from),
        };
        completion.map_err(|e| HarnessError::io(&invocation.program, e))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, time::Duration};

    use pretty_assertions::assert_eq;

    use super::{Completion, JobExecutor, ProcessExecutor};
    use crate::{
        errors::HarnessError,
        matrix::{job::Invocation, OutputStream},
        results::ResultLog,
    };

    fn shell(script: &str, capture: OutputStream) -> Invocation {
        Invocation::new("sh", capture).arg("-c").arg(script)
    }

    #[test]
    fn appends_captured_stdout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = ResultLog::new(dir.path().join("x.results"));
        let executor = ProcessExecutor::default();
        let first = executor.execute(&shell("echo one", OutputStream::Stdout), &log, None)?;
        executor.execute(&shell("echo two; echo noise >&2", OutputStream::Stdout), &log, None)?;
        assert_eq!(
            first,
            Completion::Exited {
                code: Some(0),
                success: true
            }
        );
        assert_eq!(fs::read_to_string(log.path())?, "one\ntwo\n");
        Ok(())
    }

    #[test]
    fn captures_stderr_when_configured() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = ResultLog::new(dir.path().join("x.results"));
        let script = "echo ignored; echo timing >&2";
        ProcessExecutor::default().execute(&shell(script, OutputStream::Stderr), &log, None)?;
        assert_eq!(fs::read_to_string(log.path())?, "timing\n");
        Ok(())
    }

    #[test]
    fn feeds_stdin_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let queries = dir.path().join("queries.2");
        fs::write(&queries, "1 2\n3 4\n")?;
        let log = ResultLog::new(dir.path().join("x.results"));
        let inv = shell("wc -l | tr -d ' '", OutputStream::Stdout).stdin(&queries);
        ProcessExecutor::default().execute(&inv, &log, None)?;
        assert_eq!(fs::read_to_string(log.path())?.trim(), "2");
        Ok(())
    }

    #[test]
    fn reports_exit_status() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = ResultLog::new(dir.path().join("x.results"));
        let result =
            ProcessExecutor::default().execute(&shell("exit 3", OutputStream::Stdout), &log, None)?;
        assert_eq!(
            result,
            Completion::Exited {
                code: Some(3),
                success: false
            }
        );
        Ok(())
    }

    #[test]
    fn missing_program_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = ResultLog::new(dir.path().join("x.results"));
        let inv = Invocation::new(dir.path().join("no_such_binary"), OutputStream::Stdout);
        let result = ProcessExecutor::default().execute(&inv, &log, None);
        assert!(matches!(result, Err(HarnessError::Io { .. })));
        Ok(())
    }

    #[test]
    fn missing_stdin_file_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = ResultLog::new(dir.path().join("x.results"));
        let inv = shell("cat", OutputStream::Stdout).stdin(dir.path().join("queries.9"));
        let result = ProcessExecutor::default().execute(&inv, &log, None);
        assert!(matches!(result, Err(HarnessError::Io { .. })));
        Ok(())
    }

    #[test]
    fn kills_after_timeout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = ResultLog::new(dir.path().join("x.results"));
        let executor = ProcessExecutor::with_poll_interval(Duration::from_millis(5));
        let result = executor.execute(
            &shell("sleep 5", OutputStream::Stdout),
            &log,
            Some(Duration::from_millis(100)),
        )?;
        assert_eq!(result, Completion::TimedOut);

        let quick = executor.execute(
            &shell("echo fast", OutputStream::Stdout),
            &log,
            Some(Duration::from_secs(10)),
        )?;
        assert!(matches!(quick, Completion::Exited { success: true, .. }));
        Ok(())
    }
}
