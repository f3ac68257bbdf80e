//! Supervisor backed by real OS processes.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::registry::Recipe;

use super::error::SupervisorError;
use super::traits::Supervisor;
use super::types::{ProcessOutcome, TailBuffer};

/// Placeholder substituted for the workspace path in diagnostics.
pub const WORKDIR_MARKER: &str = "<workdir>";

/// How long pipe readers may linger once the process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Budget for a `--version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Launches tools as child processes with a deadline and cancellation.
///
/// On Unix each tool is started as the leader of its own process group, so
/// helpers it spawns (pandoc starting xelatex, for instance) are torn down
/// with it: `SIGTERM` to the group, then `SIGKILL` after the grace period.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Stops the process tree rooted at `child` and reaps the child.
    #[cfg(unix)]
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) {
        let Some(pid) = pid else {
            let _ = child.kill().await;
            return;
        };
        let pgid = pid as libc::pid_t;

        // SAFETY: killpg only sends a signal to the group we created at spawn.
        unsafe {
            libc::killpg(pgid, libc::SIGTERM);
        }

        if tokio::time::timeout(self.config.kill_grace(), child.wait())
            .await
            .is_err()
        {
            debug!(pid, "Tool ignored SIGTERM, escalating to SIGKILL");
        }

        // Leftover group members are killed even when the leader exited.
        kill_group(Some(pid));
        let _ = child.kill().await;
    }

    #[cfg(not(unix))]
    async fn terminate(&self, child: &mut Child, _pid: Option<u32>) {
        let _ = child.kill().await;
    }
}

/// Sends `SIGKILL` to whatever is left of the tool's process group.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal to the group we created at spawn.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Reads a pipe to the end, keeping only its tail.
fn spawn_drain<R>(reader: Option<R>, limit: usize) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    reader.map(|mut reader| {
        tokio::spawn(async move {
            let mut tail = TailBuffer::new(limit);
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => tail.push(&chunk[..n]),
                }
            }
            tail.into_bytes()
        })
    })
}

async fn collect_drain(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            // A detached descendant still holds the pipe open.
            task.abort();
            Vec::new()
        }
    }
}

/// Renders a stderr tail for display: lossy UTF-8, workspace path hidden.
pub(crate) fn sanitize_tail(bytes: &[u8], workdir: &Path) -> String {
    let text = String::from_utf8_lossy(bytes);
    let workdir = workdir.to_string_lossy();
    let text = if workdir.is_empty() {
        text.into_owned()
    } else {
        text.replace(workdir.as_ref(), WORKDIR_MARKER)
    };
    text.trim_end().to_string()
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn run(
        &self,
        recipe: &Recipe,
        input: &Path,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, SupervisorError> {
        if cancel.is_cancelled() {
            return Ok(ProcessOutcome::Cancelled);
        }

        let args = recipe.render_args(input, output_dir);

        let mut cmd = Command::new(&recipe.program);
        cmd.args(&args)
            .current_dir(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            program = %recipe.program.display(),
            tool = recipe.tool.as_str(),
            timeout_s = recipe.max_duration.as_secs(),
            "Spawning tool process"
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SupervisorError::ToolNotFound {
                    program: recipe.program.clone(),
                }
            } else {
                SupervisorError::Io(e)
            }
        })?;
        let pid = child.id();

        let limit = self.config.stderr_tail_bytes;
        let stdout_task = spawn_drain(child.stdout.take(), limit);
        let stderr_task = spawn_drain(child.stderr.take(), limit);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(pid, "Conversion cancelled, terminating tool");
                self.terminate(&mut child, pid).await;
                ProcessOutcome::Cancelled
            }
            status = child.wait() => {
                // Helpers must not outlive the job, and they would hold the
                // pipes open.
                kill_group(pid);
                let status = status?;
                let stderr = collect_drain(stderr_task).await;
                let stderr_tail = sanitize_tail(&stderr, output_dir);
                let elapsed_ms = start.elapsed().as_millis() as u64;

                if status.success() {
                    debug!(elapsed_ms, "Tool exited cleanly");
                    ProcessOutcome::Completed { stderr_tail }
                } else {
                    warn!(
                        exit_code = ?status.code(),
                        elapsed_ms,
                        stderr = %stderr_tail,
                        "Tool failed"
                    );
                    ProcessOutcome::ToolError {
                        exit_code: status.code(),
                        stderr_tail,
                    }
                }
            }
            _ = tokio::time::sleep(recipe.max_duration) => {
                warn!(
                    pid,
                    timeout_s = recipe.max_duration.as_secs_f64(),
                    "Tool timed out, terminating"
                );
                self.terminate(&mut child, pid).await;
                ProcessOutcome::Timeout { after: recipe.max_duration }
            }
        };

        // Release the reader on every path; stderr was already consumed above
        // for a normal exit.
        let _ = collect_drain(stdout_task).await;

        Ok(outcome)
    }
}

/// Checks that a tool can be launched.
///
/// Runs `program version_arg` and returns the first line it prints.
pub async fn probe_tool(program: &Path, version_arg: &str) -> Result<String, SupervisorError> {
    let mut cmd = Command::new(program);
    cmd.arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::time::timeout(PROBE_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            SupervisorError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "version probe timed out",
            ))
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SupervisorError::ToolNotFound {
                    program: program.to_path_buf(),
                }
            } else {
                SupervisorError::Io(e)
            }
        })?;

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_tail_hides_workdir() {
        let tail = sanitize_tail(
            b"Error reading /tmp/scratch/job-1/input.md: bad\n\n",
            Path::new("/tmp/scratch/job-1"),
        );
        assert_eq!(tail, "Error reading <workdir>/input.md: bad");
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use crate::format::Format;
        use crate::registry::ToolKind;
        use tempfile::TempDir;

        fn supervisor() -> ProcessSupervisor {
            ProcessSupervisor::new(SupervisorConfig {
                kill_grace_ms: 200,
                stderr_tail_bytes: 256,
            })
        }

        /// `sh -c <script>` with `$0` = workspace dir, `$1` = input, `$2` = output.
        fn script(body: &str, max_duration: Duration) -> Recipe {
            Recipe::new(
                Format::Markdown,
                Format::Pdf,
                ToolKind::Markup,
                "/bin/sh",
                ["-c", body, "{output_dir}", "{input}", "{output}"],
            )
            .with_max_duration(max_duration)
        }

        fn setup() -> (TempDir, std::path::PathBuf) {
            let dir = TempDir::new().unwrap();
            let input = dir.path().join("input.md");
            std::fs::write(&input, b"# Title").unwrap();
            (dir, input)
        }

        #[cfg(target_os = "linux")]
        fn process_alive(pid: u32) -> bool {
            match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Ok(stat) => {
                    let state = stat
                        .rsplit_once(')')
                        .and_then(|(_, rest)| rest.trim_start().chars().next());
                    !matches!(state, Some('Z') | Some('X'))
                }
                Err(_) => false,
            }
        }

        #[tokio::test]
        async fn test_completed_tool_writes_output() {
            let (dir, input) = setup();
            let recipe = script("cp \"$1\" \"$2\"", Duration::from_secs(10));

            let outcome = supervisor()
                .run(&recipe, &input, dir.path(), CancellationToken::new())
                .await
                .unwrap();

            assert!(outcome.is_completed());
            assert_eq!(std::fs::read(dir.path().join("output.pdf")).unwrap(), b"# Title");
        }

        #[tokio::test]
        async fn test_non_zero_exit_is_tool_error_without_paths() {
            let (dir, input) = setup();
            let recipe = script("echo \"cannot parse $1\" >&2; exit 3", Duration::from_secs(10));

            let outcome = supervisor()
                .run(&recipe, &input, dir.path(), CancellationToken::new())
                .await
                .unwrap();

            match outcome {
                ProcessOutcome::ToolError {
                    exit_code,
                    stderr_tail,
                } => {
                    assert_eq!(exit_code, Some(3));
                    assert_eq!(stderr_tail, "cannot parse <workdir>/input.md");
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_stderr_tail_is_bounded_and_stdout_drained() {
            let (dir, input) = setup();
            let recipe = script(
                "head -c 1000000 /dev/zero; i=0; while [ $i -lt 2000 ]; do echo \"line $i\" >&2; i=$((i+1)); done; exit 1",
                Duration::from_secs(30),
            );

            let outcome = supervisor()
                .run(&recipe, &input, dir.path(), CancellationToken::new())
                .await
                .unwrap();

            match outcome {
                ProcessOutcome::ToolError { stderr_tail, .. } => {
                    assert!(stderr_tail.len() <= 256);
                    assert!(stderr_tail.ends_with("line 1999"));
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_deadline_kills_process_tree() {
            let (dir, input) = setup();
            let recipe = script(
                "sleep 5 & echo $! > \"$0/child.pid\"; wait",
                Duration::from_secs(1),
            );

            let start = Instant::now();
            let outcome = supervisor()
                .run(&recipe, &input, dir.path(), CancellationToken::new())
                .await
                .unwrap();
            let elapsed = start.elapsed();

            assert_eq!(
                outcome,
                ProcessOutcome::Timeout {
                    after: Duration::from_secs(1)
                }
            );
            assert!(elapsed >= Duration::from_secs(1));
            assert!(elapsed < Duration::from_secs(4), "took {:?}", elapsed);

            #[cfg(target_os = "linux")]
            {
                let pid: u32 = std::fs::read_to_string(dir.path().join("child.pid"))
                    .unwrap()
                    .trim()
                    .parse()
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(!process_alive(pid), "grandchild {} survived", pid);
            }
        }

        #[tokio::test]
        async fn test_clean_exit_kills_leftover_helpers() {
            let (dir, input) = setup();
            let recipe = script(
                "sleep 30 & echo $! > \"$0/helper.pid\"; cp \"$1\" \"$2\"",
                Duration::from_secs(30),
            );

            let start = Instant::now();
            let outcome = supervisor()
                .run(&recipe, &input, dir.path(), CancellationToken::new())
                .await
                .unwrap();

            assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
            assert!(
                start.elapsed() < DRAIN_TIMEOUT,
                "took {:?}",
                start.elapsed()
            );
            assert!(dir.path().join("output.pdf").is_file());

            #[cfg(target_os = "linux")]
            {
                let pid: u32 = std::fs::read_to_string(dir.path().join("helper.pid"))
                    .unwrap()
                    .trim()
                    .parse()
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(!process_alive(pid), "helper {} survived", pid);
            }
        }

        #[tokio::test]
        async fn test_stubborn_tool_is_killed_after_grace() {
            let (dir, input) = setup();
            let recipe = script("trap '' TERM; sleep 5", Duration::from_millis(300));

            let start = Instant::now();
            let outcome = supervisor()
                .run(&recipe, &input, dir.path(), CancellationToken::new())
                .await
                .unwrap();

            assert!(matches!(outcome, ProcessOutcome::Timeout { .. }));
            assert!(start.elapsed() < Duration::from_secs(4));
        }

        #[tokio::test]
        async fn test_cancellation_stops_tool() {
            let (dir, input) = setup();
            let recipe = script("sleep 5", Duration::from_secs(30));
            let cancel = CancellationToken::new();

            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });

            let start = Instant::now();
            let outcome = supervisor()
                .run(&recipe, &input, dir.path(), cancel)
                .await
                .unwrap();

            assert_eq!(outcome, ProcessOutcome::Cancelled);
            assert!(start.elapsed() < Duration::from_secs(3));
        }

        #[tokio::test]
        async fn test_missing_program_is_tool_not_found() {
            let (dir, input) = setup();
            let recipe = Recipe::new(
                Format::Markdown,
                Format::Pdf,
                ToolKind::Markup,
                "/nonexistent/bin/pandoc",
                ["{input}"],
            );

            let err = supervisor()
                .run(&recipe, &input, dir.path(), CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, SupervisorError::ToolNotFound { .. }));
        }

        #[tokio::test]
        async fn test_probe_tool() {
            let version = probe_tool(Path::new("echo"), "fake-tool 1.2.3").await.unwrap();
            assert_eq!(version, "fake-tool 1.2.3");

            let err = probe_tool(Path::new("/nonexistent/bin/ffmpeg"), "-version")
                .await
                .unwrap_err();
            assert!(matches!(err, SupervisorError::ToolNotFound { .. }));
        }
    }
}
