use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::async_trait;
use axum::Router;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

use crate::bootstrap::AppFactory;
use crate::config::Config;
use crate::runner::process::ProcessRunner;
use crate::runner::router;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the runner application for an OpenManus checkout found on disk.
#[derive(Debug)]
pub(crate) struct RunnerFactory {
    runner: ProcessRunner,
    probe_interpreter: bool,
    body_limit: usize,
}

impl RunnerFactory {
    /// Resolves the project root and entry script. Fails when either is missing.
    #[tracing::instrument(level = "info", skip_all, fields(root = %config.project_root))]
    pub(crate) fn locate(config: &Config) -> Result<Self> {
        let project_root = PathBuf::from(&config.project_root)
            .canonicalize()
            .with_context(|| format!("Project root {} not found", config.project_root))?;
        let entry_script = PathBuf::from(&config.entry_script);
        if !project_root.join(&entry_script).is_file() {
            bail!(
                "Entry script {} not found in {}",
                entry_script.display(),
                project_root.display()
            );
        }
        info!(root = %project_root.display(), script = %entry_script.display(), "Located OpenManus");

        Ok(RunnerFactory {
            runner: ProcessRunner {
                interpreter: config.interpreter.clone(),
                project_root,
                entry_script,
                timeout: config.timeout(),
            },
            probe_interpreter: config.probe_interpreter,
            body_limit: config.body_limit,
        })
    }

    async fn probe(&self) -> Result<()> {
        let interpreter = &self.runner.interpreter;
        let child = Command::new(interpreter)
            .arg("-c")
            .arg("")
            .current_dir(&self.runner.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Interpreter {} cannot be started", interpreter))?;

        let output = timeout(PROBE_TIMEOUT, child.wait_with_output())
            .await
            .with_context(|| format!("Interpreter {} did not respond", interpreter))??;
        if !output.status.success() {
            bail!(
                "Interpreter {} exited with {}: {}",
                interpreter,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl AppFactory for RunnerFactory {
    async fn build(self) -> Result<Router> {
        if self.probe_interpreter {
            self.probe().await?;
        }
        Ok(router(Arc::new(self.runner), self.body_limit))
    }
}
