//! Beehive server binary.
//!
//! Opens the store, bootstraps the administrator account, then runs three
//! long-lived tasks: the HTTP admin surface, the binary TCP protocol and
//! the federated key refresher. SIGINT/SIGTERM shut everything down
//! cooperatively; bind and store-open failures exit non-zero.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use beehive_core::http::{run_http_server, AppState};
use beehive_core::services::beehive_hash;
use beehive_core::tcp::{run_tcp_server, TcpState};
use beehive_core::workers::{KeyRefresher, SleepyWorker};
use beehive_core::{
    Config, DatasetService, FederatedKeys, SchemaService, Store, SyncService, UserService,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    info!("Starting beehive, data dir {}", config.data_dir.display());

    let store = match Store::open(&config.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Unable to open storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = UserService::check_admin(&store) {
        error!("Developer bootstrap failed: {}", e);
        return ExitCode::FAILURE;
    }

    let federated = Arc::new(FederatedKeys::new(
        config.issuer.clone(),
        config.audience.clone(),
    ));
    let schemas = Arc::new(SchemaService::new(store.clone()));
    let users = Arc::new(UserService::new(store.clone(), federated.clone()));
    let datasets = Arc::new(DatasetService::new(store.clone()));
    let sync = Arc::new(SyncService::new(
        store.clone(),
        schemas.clone(),
        datasets.clone(),
        beehive_hash(&config.server_name),
    ));

    let http_state = Arc::new(AppState {
        schemas: schemas.clone(),
        users: users.clone(),
    });
    let tcp_state = Arc::new(TcpState {
        users,
        datasets,
        schemas,
        sync,
    });

    let worker = Arc::new(SleepyWorker::new());
    let refresher = KeyRefresher::new(worker.clone(), federated, config.issuer_certs_url.clone());

    let mut http_task = tokio::spawn(run_http_server(http_state, config.http_addr));
    let mut tcp_task = tokio::spawn(run_tcp_server(tcp_state, config.tcp_addr));
    let refresher_task = tokio::spawn(async move { refresher.run().await });

    let code = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown requested");
            ExitCode::SUCCESS
        }
        result = &mut http_task => {
            report("HTTP adapter", result);
            ExitCode::FAILURE
        }
        result = &mut tcp_task => {
            report("TCP adapter", result);
            ExitCode::FAILURE
        }
    };

    if worker.finish(Duration::from_secs(10)).await {
        error!("Key refresher did not quiesce in time");
    }
    refresher_task.abort();
    http_task.abort();
    tcp_task.abort();

    code
}

fn report(what: &str, result: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => error!("{} stopped unexpectedly", what),
        Ok(Err(e)) => error!("{} failed: {}", what, e),
        Err(e) => error!("{} panicked: {}", what, e),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("signal handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
