use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use clap_serde_derive::ClapSerde;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::bootstrap::bootstrap;
use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::runner::factory::RunnerFactory;

mod bootstrap;
mod config;
mod error;
mod runner;
mod telemetry;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_found) = match Config::from_toml(&args.config_file) {
        Ok(conf) => (conf.merge(args.opt_config), true),
        Err(_) if args.config_file == DEFAULT_CONFIG_FILE => {
            (Config::default().merge(args.opt_config), false)
        }
        Err(err) => {
            eprintln!(
                "Failed to read configuration file {} with error: {:#}",
                args.config_file, err
            );
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        telemetry::init_telemetry(&config.otlp_endpoint, config.log_console)
    })?;
    if !config_found {
        info!("No configuration file found at {}, using defaults", DEFAULT_CONFIG_FILE);
    }

    // Built before serving, on its own runtime
    let bootstrapped = bootstrap(|| RunnerFactory::locate(&config));
    if !bootstrapped.is_ready() {
        warn!(fail_open = config.fail_open, "OpenManus is not available");
    }
    let router = match bootstrapped.into_router(config.fail_open) {
        Ok(router) => router,
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(1);
        }
    };

    runtime.block_on(serve(&config, router))
}

async fn serve(config: &Config, router: Router) -> Result<()> {
    let addr = format!("{}:{}", config.address, config.port);

    if let Some((cert, key)) = config.tls_files() {
        let tls = RustlsConfig::from_pem_file(&cert, &key)
            .await
            .with_context(|| format!("Failed to load TLS files {}, {}", cert.display(), key.display()))?;
        let addr: SocketAddr = addr.parse().with_context(|| format!("Invalid address {}", addr))?;
        let handle = Handle::new();
        tokio::spawn(shutdown_on_signal(handle.clone()));

        info!("Listening on https://{}", addr);
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;
        return Ok(());
    }

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_on_signal(handle: Handle) {
    shutdown_signal().await;
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down...");
}
