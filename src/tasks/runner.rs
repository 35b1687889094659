//! Runs allow-listed build-tool tasks as subprocesses.

use serde::Serialize;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::report::{assemble_report, ReportLocation};
use super::TaskId;
use crate::error::{OnboardError, Result};
use crate::settings::TaskSettings;

/// How long output is still collected once the process has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Result of one finished task run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task: TaskId,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, followed by an `Exit code:` line.
    pub output: String,
    /// Exit code 0 and the success marker present in the output.
    pub succeeded: bool,
    /// Test report with stylesheets inlined, when the task produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_html: Option<String>,
}

/// Launches build-tool tasks inside the configured project directory.
pub struct TaskRunner {
    settings: TaskSettings,
}

impl TaskRunner {
    pub fn new(settings: TaskSettings) -> Self {
        Self { settings }
    }

    /// Validate `task_name` against the allow-list and run it.
    ///
    /// Unknown names fail with a validation error before any process is spawned.
    pub async fn run_task(&self, task_name: &str) -> Result<TaskOutcome> {
        let task: TaskId = task_name.parse()?;
        self.run(task).await
    }

    /// Program followed by every argument, as it will be executed.
    pub fn command_line(&self, task: TaskId) -> Vec<String> {
        let mut line = vec![self.program().display().to_string()];
        line.extend(self.settings.args.iter().cloned());
        line.extend(task.args().iter().map(|a| a.to_string()));
        line
    }

    /// Run `task` to completion, or kill it once the timeout elapses.
    pub async fn run(&self, task: TaskId) -> Result<TaskOutcome> {
        let program = self.program();
        info!(
            %task,
            command = ?self.command_line(task),
            dir = %self.settings.project_dir.display(),
            "starting task"
        );

        let mut child = Command::new(&program)
            .args(&self.settings.args)
            .args(task.args())
            .current_dir(&self.settings.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(%task, program = %program.display(), error = %e, "failed to spawn task");
                OnboardError::process(format!("failed to start task '{task}'"))
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        // Completion is the process exiting, not its pipes closing: a
        // background grandchild may keep stdout open long after the exit.
        let collect = async {
            let mut output = String::new();
            let status = loop {
                tokio::select! {
                    Some(line) = rx.recv() => push_line(&mut output, &line),
                    status = child.wait() => break status?,
                }
            };
            let drain = async {
                while let Some(line) = rx.recv().await {
                    push_line(&mut output, &line);
                }
            };
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
                debug!(%task, "output pipes still open after exit; keeping what was read");
            }
            Ok::<(String, ExitStatus), std::io::Error>((output, status))
        };

        let timeout = self.settings.timeout();
        let (mut output, status) = match tokio::time::timeout(timeout, collect).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                warn!(%task, error = %e, "task I/O failed");
                return Err(OnboardError::process(format!("task '{task}' failed: {e}")));
            },
            Err(_) => {
                warn!(%task, secs = timeout.as_secs(), "task timed out; killing");
                if let Err(e) = child.kill().await {
                    warn!(%task, error = %e, "failed to kill timed-out task");
                }
                return Err(OnboardError::timeout(task.as_str(), timeout));
            },
        };

        let exit_code = status.code();
        output.push_str("\nExit code: ");
        match exit_code {
            Some(code) => output.push_str(&code.to_string()),
            None => output.push_str("terminated by signal"),
        }

        let succeeded = status.success() && output.contains(&self.settings.success_marker);
        info!(%task, ?exit_code, succeeded, "task finished");

        let report_html = if succeeded && task.produces_report() {
            assemble_report(&self.report_location()).await?
        } else {
            None
        };

        Ok(TaskOutcome {
            task,
            exit_code,
            output,
            succeeded,
            report_html,
        })
    }

    fn report_location(&self) -> ReportLocation {
        ReportLocation {
            dir: self.settings.resolved_report_dir(),
            wait: self.settings.report_wait(),
            poll: self.settings.report_poll(),
        }
    }

    /// Relative paths such as `./gradlew` resolve against the project directory;
    /// bare names are left for `PATH` lookup.
    fn program(&self) -> PathBuf {
        let program = PathBuf::from(&self.settings.program);
        if program.is_relative() && program.components().count() > 1 {
            self.settings.project_dir.join(program)
        } else {
            program
        }
    }
}

fn push_line(output: &mut String, line: &str) {
    output.push_str(line);
    output.push('\n');
}

/// Send each line of `reader` to `tx` until EOF or the receiver goes away.
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if tx.send(line.trim_end_matches(['\n', '\r']).to_string()).is_err() {
                    break;
                }
            },
            Err(e) => {
                debug!(error = %e, "stopped reading task output");
                break;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn runner(program: &str, args: &[&str]) -> TaskRunner {
        TaskRunner::new(TaskSettings {
            project_dir: PathBuf::from("/srv/app"),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..TaskSettings::default()
        })
    }

    #[test]
    fn test_command_line_is_fixed_per_task() {
        let r = runner("./gradlew", &["--console=plain"]);
        assert_eq!(
            r.command_line(TaskId::Test),
            vec!["/srv/app/./gradlew", "--console=plain", "test"]
        );
        assert_eq!(
            r.command_line(TaskId::Build),
            vec!["/srv/app/./gradlew", "--console=plain", "build", "-x", "test"]
        );
    }

    #[test]
    fn test_bare_program_uses_path_lookup() {
        let r = runner("gradle", &[]);
        assert_eq!(r.program(), Path::new("gradle"));
        let r = runner("/opt/gradle/bin/gradle", &[]);
        assert_eq!(r.program(), Path::new("/opt/gradle/bin/gradle"));
    }

    #[tokio::test]
    async fn test_unknown_task_never_spawns() {
        // A program that cannot exist: reaching spawn would yield a Process error.
        let r = runner("/nonexistent/build-tool", &[]);
        let err = r.run_task("deploy").await.unwrap_err();
        assert!(matches!(err, OnboardError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_process_error() {
        let r = runner("/nonexistent/build-tool", &[]);
        let err = r.run_task("clean").await.unwrap_err();
        assert!(matches!(err, OnboardError::Process { .. }));
        assert!(!err.to_string().contains("/nonexistent"));
    }
}
