// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use burnlink::{
    api::router,
    config::{AppConfig, LogFormat, DEFAULT_LOG_FILTER},
    lifecycle::SecretService,
    state::AppState,
    store,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
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

    info!("shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(LogFormat::from_env());
    info!("Starting Burnlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match store::connect(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open secret store");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = store.health().await {
        error!(error = %e, "secret store failed its startup check");
        return ExitCode::FAILURE;
    }

    let secrets = SecretService::new(store, config.lifecycle());
    let app = router(AppState::new(secrets));

    let bind_address = config.bind_address();
    let listener = match TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, address = %bind_address, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(
        address = %bind_address,
        public_url = %config.public_url,
        "Burnlink listening (docs at /docs)"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = server.await {
        error!(error = %e, "server failed");
        return ExitCode::FAILURE;
    }

    info!("server stopped");
    ExitCode::SUCCESS
}
