use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use axum::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

/// Everything the script reports back: exit code and both captured streams.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScriptOutput {
    /// `None` when the child was terminated by a signal
    pub(crate) code: Option<i32>,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

impl ScriptOutput {
    pub(crate) fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub(crate) trait ScriptRunner: Send + Sync {
    /// Runs the external entry script once for `prompt` and waits for it to exit.
    async fn run(&self, prompt: &str) -> Result<ScriptOutput>;
}

/// Runs `<interpreter> <entry_script> --prompt <prompt>` inside the project root.
#[derive(Debug, Clone)]
pub(crate) struct ProcessRunner {
    pub(crate) interpreter: String,
    pub(crate) project_root: PathBuf,
    pub(crate) entry_script: PathBuf,
    pub(crate) timeout: Option<Duration>,
}

impl ProcessRunner {
    fn command(&self, prompt: &str) -> Result<Command> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.entry_script)
            .arg("--prompt")
            .arg(prompt)
            .current_dir(&self.project_root)
            .env("PYTHONPATH", self.python_path()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }

    /// The project root goes in front of whatever search path the service inherited.
    fn python_path(&self) -> Result<OsString> {
        let inherited = std::env::var_os("PYTHONPATH").unwrap_or_default();
        let paths = std::iter::once(self.project_root.clone()).chain(
            std::env::split_paths(&inherited).filter(|path| !path.as_os_str().is_empty()),
        );
        std::env::join_paths(paths).context("Project root cannot be placed on PYTHONPATH")
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    #[tracing::instrument(level = "info", skip_all)]
    async fn run(&self, prompt: &str) -> Result<ScriptOutput> {
        let start = Instant::now();
        let child = self
            .command(prompt)?
            .spawn()
            .with_context(|| format!("Failed to start {}", self.interpreter))?;
        info!(
            pid = ?child.id(),
            script = %self.entry_script.display(),
            "Started OpenManus script"
        );

        let output = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    // Dropping the future drops the child, which kills it
                    warn!(timeout_secs = limit.as_secs(), "OpenManus script timed out, killed");
                    return Err(anyhow!(
                        "OpenManus script timed out after {}s",
                        limit.as_secs()
                    ));
                }
            },
            None => child.wait_with_output().await?,
        };

        info!(
            exit_code = ?output.status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenManus script finished"
        );
        Ok(ScriptOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn runner_with_script(body: &str, timeout: Option<Duration>) -> (TempDir, ProcessRunner) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.sh"), body).unwrap();
        let runner = ProcessRunner {
            interpreter: "sh".into(),
            project_root: dir.path().to_path_buf(),
            entry_script: "main.sh".into(),
            timeout,
        };
        (dir, runner)
    }

    #[tokio::test]
    async fn passes_prompt_as_single_argument() {
        let (_dir, runner) = runner_with_script("printf '%s|%s' \"$1\" \"$2\"", None);

        let output = runner.run("hello; rm -rf /").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, b"--prompt|hello; rm -rf /");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let (_dir, runner) =
            runner_with_script("echo partial\necho broken >&2\nexit 3", None);

        let output = runner.run("x").await.unwrap();
        assert!(!output.success());
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, b"partial\n");
        assert_eq!(output.stderr, b"broken\n");
    }

    #[tokio::test]
    async fn runs_inside_project_root_with_python_path() {
        let (dir, runner) = runner_with_script("pwd\necho \"$PYTHONPATH\"", None);

        let output = runner.run("x").await.unwrap();
        let stdout = String::from_utf8(output.stdout).unwrap();
        let mut lines = stdout.lines();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(
            PathBuf::from(lines.next().unwrap()).canonicalize().unwrap(),
            root
        );
        assert!(lines
            .next()
            .unwrap()
            .starts_with(dir.path().to_str().unwrap()));
    }

    #[tokio::test]
    async fn kills_script_after_timeout() {
        let (_dir, runner) = runner_with_script("sleep 10", Some(Duration::from_millis(200)));

        let start = Instant::now();
        let err = runner.run("x").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_interpreter_is_an_error() {
        let (_dir, mut runner) = runner_with_script("exit 0", None);
        runner.interpreter = "definitely-not-an-interpreter".into();

        let err = runner.run("x").await.unwrap_err();
        assert!(err.to_string().contains("Failed to start"));
    }
}
