//! Sequential execution of update batches.
//!
//! A batch is a list of argv commands run in order in one directory under a
//! single title. The first nonzero exit code stops the batch.

use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{JnsError, JnsResult};

const SEPARATOR: &str = "----------";

/// Runs a single command and reports its exit code.
#[async_trait]
pub trait CommandExecutor: Send {
    async fn execute(&mut self, cmd: &[String], cwd: &Path) -> JnsResult<i32>;
}

/// Spawns real processes, inheriting stdio and environment.
#[derive(Debug, Default)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(&mut self, cmd: &[String], cwd: &Path) -> JnsResult<i32> {
        let Some((program, args)) = cmd.split_first() else {
            return Ok(0);
        };
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .status()
            .await
            .map_err(|source| JnsError::Spawn {
                command: shell_words::join(cmd),
                source,
            })?;
        // Killed by a signal: no code, still a failure.
        Ok(status.code().unwrap_or(1))
    }
}

/// Executes update batches and keeps the bookkeeping for their output.
pub struct Runner {
    dry_run: bool,
    verbose: bool,
    run_count: usize,
    failure_count: usize,
    executor: Box<dyn CommandExecutor>,
    output: Box<dyn Write + Send>,
}

impl Runner {
    pub fn new(dry_run: bool, verbose: bool) -> Self {
        Self::with_executor(dry_run, verbose, Box::new(SystemExecutor))
    }

    pub fn with_executor(dry_run: bool, verbose: bool, executor: Box<dyn CommandExecutor>) -> Self {
        Self {
            dry_run,
            verbose,
            run_count: 0,
            failure_count: 0,
            executor,
            output: Box::new(io::stdout()),
        }
    }

    /// Sends titles, separators and timings to `output` instead of stdout.
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    /// Number of `run` invocations so far.
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    /// Number of batches that ended with a nonzero exit code.
    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    /// Runs one batch and returns the exit code of the last command run.
    ///
    /// An empty batch runs nothing and returns 0, but is still timed.
    pub async fn run(&mut self, cmds: &[Vec<String>], cwd: &Path, title: Option<&str>) -> JnsResult<i32> {
        if self.run_count > 0 {
            writeln!(self.output, "{}", SEPARATOR)?;
        }
        if let Some(title) = title {
            writeln!(self.output, "{}", title)?;
        }
        self.run_count += 1;

        let started = Instant::now();
        let code = self.run_cmds(cmds, cwd).await?;
        writeln!(self.output, "({})", format_between(started, Instant::now()))?;
        if code != 0 {
            self.failure_count += 1;
            writeln!(self.output, "stopped: exit code {}", code)?;
        }
        self.output.flush()?;
        Ok(code)
    }

    async fn run_cmds(&mut self, cmds: &[Vec<String>], cwd: &Path) -> JnsResult<i32> {
        let mut code = 0;
        for cmd in cmds {
            code = self.run_cmd(cmd, cwd).await?;
            if code != 0 {
                break;
            }
        }
        Ok(code)
    }

    async fn run_cmd(&mut self, cmd: &[String], cwd: &Path) -> JnsResult<i32> {
        if cmd.is_empty() {
            return Ok(0);
        }
        if self.verbose || self.dry_run {
            writeln!(self.output, "{}", shell_words::join(cmd))?;
            self.output.flush()?;
        }
        if self.dry_run {
            return Ok(0);
        }
        debug!(cwd = %cwd.display(), cmd = ?cmd, "running");
        self.executor.execute(cmd, cwd).await
    }
}

/// Formats an elapsed time as `Nm Ss`, or `<1s` below one second.
///
/// `negative` prefixes a `-`, for intervals measured backwards.
pub fn format_elapsed(elapsed: Duration, negative: bool) -> String {
    let sign = if negative { "-" } else { "" };
    if elapsed < Duration::from_secs(1) {
        return format!("{}<1s", sign);
    }
    let secs = elapsed.as_secs();
    format!("{}{}m {}s", sign, secs / 60, secs % 60)
}

/// Formats the signed difference between two instants.
pub fn format_between(start: Instant, end: Instant) -> String {
    match end.checked_duration_since(start) {
        Some(elapsed) => format_elapsed(elapsed, false),
        None => format_elapsed(start.duration_since(end), true),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Records every command and answers with scripted exit codes (0 once exhausted).
    #[derive(Clone, Default)]
    pub(crate) struct RecordingExecutor {
        pub calls: Arc<Mutex<Vec<(Vec<String>, PathBuf)>>>,
        pub codes: Arc<Mutex<VecDeque<i32>>>,
    }

    impl RecordingExecutor {
        pub fn with_codes(codes: &[i32]) -> Self {
            let executor = Self::default();
            executor.codes.lock().unwrap().extend(codes.iter().copied());
            executor
        }

        pub fn commands(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().iter().map(|(cmd, _)| cmd.clone()).collect()
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn execute(&mut self, cmd: &[String], cwd: &Path) -> JnsResult<i32> {
            self.calls
                .lock()
                .unwrap()
                .push((cmd.to_vec(), cwd.to_path_buf()));
            Ok(self.codes.lock().unwrap().pop_front().unwrap_or(0))
        }
    }

    pub(crate) fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    /// An in-memory sink for the runner's announcements.
    #[derive(Clone, Default)]
    pub(crate) struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl SharedOutput {
        pub fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let executor = RecordingExecutor::with_codes(&[0, 2, 0]);
        let mut runner = Runner::with_executor(false, false, Box::new(executor.clone()));
        let cmds = vec![argv(&["a"]), argv(&["b"]), argv(&["c"])];
        let code = runner.run(&cmds, Path::new("."), Some("abc")).await.unwrap();
        assert_eq!(code, 2);
        assert_eq!(executor.commands(), vec![argv(&["a"]), argv(&["b"])]);
        assert_eq!(runner.failure_count(), 1);
    }

    #[tokio::test]
    async fn runs_whole_batch_on_success() {
        let executor = RecordingExecutor::with_codes(&[0, 0, 0]);
        let mut runner = Runner::with_executor(false, true, Box::new(executor.clone()));
        let cmds = vec![argv(&["a"]), argv(&["b"]), argv(&["c"])];
        let code = runner.run(&cmds, Path::new("/srv"), None).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(executor.commands().len(), 3);
        assert!(executor
            .calls
            .lock()
            .unwrap()
            .iter()
            .all(|(_, cwd)| cwd == Path::new("/srv")));
        assert_eq!(runner.failure_count(), 0);
        assert_eq!(runner.run_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_never_executes() {
        let executor = RecordingExecutor::with_codes(&[5]);
        let mut runner = Runner::with_executor(true, false, Box::new(executor.clone()));
        let code = runner
            .run(&[argv(&["git", "pull"])], Path::new("."), Some("dry"))
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert!(executor.commands().is_empty());
    }

    #[tokio::test]
    async fn every_invocation_is_separated_and_timed() {
        let output = SharedOutput::default();
        let executor = RecordingExecutor::with_codes(&[0, 7]);
        let mut runner = Runner::with_executor(false, false, Box::new(executor.clone()))
            .with_output(Box::new(output.clone()));
        runner
            .run(&[], Path::new("."), Some("skipping git repository with no .git directory: /srv/a"))
            .await
            .unwrap();
        runner
            .run(&[argv(&["a"]), argv(&["b"])], Path::new("."), Some("second"))
            .await
            .unwrap();
        assert_eq!(
            output.lines(),
            vec![
                "skipping git repository with no .git directory: /srv/a",
                "(<1s)",
                "----------",
                "second",
                "(<1s)",
                "stopped: exit code 7",
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_announces_commands() {
        let output = SharedOutput::default();
        let mut runner = Runner::with_executor(true, false, Box::new(RecordingExecutor::default()))
            .with_output(Box::new(output.clone()));
        runner
            .run(&[argv(&["git", "pull"])], Path::new("."), None)
            .await
            .unwrap();
        assert_eq!(output.lines(), vec!["git pull", "(<1s)"]);
    }

    #[tokio::test]
    async fn empty_batches_and_commands_succeed() {
        let executor = RecordingExecutor::with_codes(&[3]);
        let mut runner = Runner::with_executor(false, false, Box::new(executor.clone()));
        assert_eq!(runner.run(&[], Path::new("."), Some("skip")).await.unwrap(), 0);
        assert_eq!(
            runner
                .run(&[Vec::new(), argv(&["x"])], Path::new("."), None)
                .await
                .unwrap(),
            3
        );
        assert_eq!(executor.commands(), vec![argv(&["x"])]);
        assert_eq!(runner.run_count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_executor_reports_exit_codes() {
        let mut runner = Runner::new(false, false);
        let cmds = vec![
            argv(&["sh", "-c", "exit 0"]),
            argv(&["sh", "-c", "exit 2"]),
            argv(&["sh", "-c", "touch should-not-exist"]),
        ];
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(runner.run(&cmds, tmp.path(), None).await.unwrap(), 2);
        assert!(!tmp.path().join("should-not-exist").exists());
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let mut runner = Runner::new(false, false);
        let err = runner
            .run(&[argv(&["definitely-not-a-real-binary-5e1c"])], Path::new("."), None)
            .await
            .unwrap_err();
        assert!(matches!(err, JnsError::Spawn { .. }));
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(Duration::from_millis(999), false), "<1s");
        assert_eq!(format_elapsed(Duration::from_secs(5), false), "0m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(125), false), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(61), true), "-1m 1s");

        let now = Instant::now();
        let later = now + Duration::from_secs(90);
        assert_eq!(format_between(now, later), "1m 30s");
        assert_eq!(format_between(later, now), "-1m 30s");
    }
}
