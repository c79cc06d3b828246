//! Builds the application once at startup on a dedicated single-threaded runtime.
//!
//! Failing to locate or build the application never panics out of here, it yields
//! [`Bootstrap::Disabled`] and the caller decides whether to serve a disabled service or exit.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::async_trait;
use axum::http::StatusCode;
use axum::Router;
use tracing::{error, info};

use crate::error::{HttpErrorResponse, RunnerError};

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Asynchronous constructor of the process's request handler.
#[async_trait]
pub(crate) trait AppFactory: Sized + Send + 'static {
    async fn build(self) -> Result<Router>;
}

#[derive(Debug)]
pub(crate) enum BootstrapError {
    /// The factory could not be found
    Locate(anyhow::Error),
    /// The factory was found but failed or panicked while building
    Build(anyhow::Error),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapError::Locate(err) => write!(f, "Failed to locate application: {:#}", err),
            BootstrapError::Build(err) => write!(f, "Failed to build application: {:#}", err),
        }
    }
}

impl std::error::Error for BootstrapError {}

pub(crate) enum Bootstrap {
    Ready(Router),
    Disabled(BootstrapError),
}

impl Bootstrap {
    /// With `fail_open` a disabled application is replaced by one answering 503 on every route.
    pub(crate) fn into_router(self, fail_open: bool) -> Result<Router> {
        match self {
            Bootstrap::Ready(router) => Ok(router),
            Bootstrap::Disabled(err) if fail_open => Ok(disabled_router(&err)),
            Bootstrap::Disabled(err) => Err(err.into()),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(self, Bootstrap::Ready(_))
    }
}

#[tracing::instrument(level = "info", skip_all)]
pub(crate) fn bootstrap<F, L>(locate: L) -> Bootstrap
where
    F: AppFactory,
    L: FnOnce() -> Result<F>,
{
    let factory = match locate() {
        Ok(factory) => factory,
        Err(err) => return disabled(BootstrapError::Locate(err)),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => return disabled(BootstrapError::Build(err.into())),
    };

    // Spawned so a panicking factory surfaces as a JoinError instead of unwinding through us
    let built = runtime.block_on(async { tokio::spawn(factory.build()).await });
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match built {
        Ok(Ok(router)) => {
            info!("Application built");
            Bootstrap::Ready(router)
        }
        Ok(Err(err)) => disabled(BootstrapError::Build(err)),
        Err(join_err) if join_err.is_panic() => {
            disabled(BootstrapError::Build(anyhow!("Application factory panicked")))
        }
        Err(join_err) => disabled(BootstrapError::Build(join_err.into())),
    }
}

fn disabled(err: BootstrapError) -> Bootstrap {
    error!("{}", err);
    Bootstrap::Disabled(err)
}

fn disabled_router(err: &BootstrapError) -> Router {
    let reason = format!("Application is not available: {}", err);
    Router::new().fallback(move || {
        let reason = reason.clone();
        async move {
            RunnerError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: HttpErrorResponse::from(reason),
            }
        }
    })
}
