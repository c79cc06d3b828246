//! The subprocess runner: one POST runs the OpenManus entry script once and returns what it printed.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{HttpErrorResponse, RunnerError, RunnerResult};
use crate::runner::process::ScriptRunner;
use crate::runner::prompt::{PromptRequest, RunResponse, SCRIPT_FAILED};

pub(crate) mod factory;
pub(crate) mod process;
pub(crate) mod prompt;

pub(crate) const GREETING: &str = "This is the OpenManus runner function.";

#[derive(Clone)]
pub(crate) struct RunnerState {
    pub(crate) runner: Arc<dyn ScriptRunner>,
}

pub(crate) fn router(runner: Arc<dyn ScriptRunner>, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(handle_greeting).post(handle_run_request))
        .route(
            "/api/run-openmanus",
            get(handle_greeting).post(handle_run_request),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(RunnerState { runner })
}

async fn handle_greeting() -> &'static str {
    GREETING
}

#[axum_macros::debug_handler]
async fn handle_run_request(
    State(state): State<RunnerState>,
    body: Bytes,
) -> RunnerResult<(StatusCode, Json<RunResponse>)> {
    let request = PromptRequest::from_bytes(&body)?;
    let output = state.runner.run(&request.prompt).await?;

    let success = output.success();
    let stdout = String::from_utf8(output.stdout)?;
    if !success {
        warn!(exit_code = ?output.code, "OpenManus script failed");
        let stderr = String::from_utf8(output.stderr)?;
        return Err(RunnerError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::with_streams(SCRIPT_FAILED, stderr, stdout),
        });
    }

    Ok((StatusCode::OK, Json(RunResponse { response: stdout })))
}
