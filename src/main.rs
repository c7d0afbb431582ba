// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fortis_wallet_server::{
    api::router,
    config::Config,
    logging::init_logging,
    onboarding::subscribe_transfer_events,
    providers::DfnsClient,
    state::AppState,
    storage::LedgerStore,
    transfer::ExpirySweeper,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_logging();

    if let Err(e) = run().await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.data_dir)?;
    let ledger_path = config.ledger_path();
    let ledger = Arc::new(LedgerStore::open(&ledger_path)?);
    info!(path = %ledger_path.display(), "Ledger opened");

    let gateway = Arc::new(DfnsClient::new(&config.custody)?);

    if let Some(url) = config.custody.webhook_url.as_deref() {
        subscribe_transfer_events(gateway.as_ref(), url).await;
    }

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(
        ledger.clone(),
        config.sweep.clone(),
        config.transfer.claim_lease,
    );
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));

    let state = AppState::new(
        ledger,
        gateway,
        config.transfer.clone(),
        config.wallet_networks.clone(),
        config.custody.webhook_secret.clone(),
    );
    let app = router(state);

    let addr: SocketAddr = config.bind_address().parse()?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone(), shutdown.clone()));

    match &config.server.tls {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key).await?;
            info!("Fortis wallet server listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("Fortis wallet server listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    shutdown.cancel();
    if let Err(e) = sweeper_task.await {
        error!(error = %e, "Sweeper task panicked");
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_on_signal(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
