// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vaultmail_server::{
    api::router,
    auth::JwksManager,
    config::{LogFormat, ServerConfig, DEFAULT_LOG_FILTER},
    mailbox::{AblyNotifier, DisabledNotifier, Notifier, RetentionPolicy},
    state::{AppState, AuthConfig},
    storage::{EphemeralStore, MemoryStore, RedbRegistry, RedisStore, DEFAULT_SWEEP_INTERVAL},
};

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let signal = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
        tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        }
    };

    #[cfg(not(unix))]
    let signal = match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(e) => {
            tracing::error!(error = %e, "Unable to listen for shutdown signal");
            "error"
        }
    };

    tracing::info!(signal, "Shutting down");
    shutdown.cancel();
}

async fn ephemeral_store(config: &ServerConfig, shutdown: &CancellationToken) -> Arc<dyn EphemeralStore> {
    if let Some(url) = &config.redis_url {
        let store = RedisStore::connect(url)
            .await
            .expect("Failed to connect to Redis");
        tracing::info!("Ephemeral store: redis");
        return Arc::new(store);
    }

    tracing::warn!("REDIS_URL not set, keeping inboxes in process memory (lost on restart)");
    let store = Arc::new(MemoryStore::new());
    tokio::spawn(
        store
            .clone()
            .run_sweeper(DEFAULT_SWEEP_INTERVAL, shutdown.clone()),
    );
    store
}

fn notifier(config: &ServerConfig) -> Arc<dyn Notifier> {
    match config.ably_api_key.as_deref() {
        Some(key) => match AblyNotifier::new(key) {
            Ok(notifier) => {
                tracing::info!("Realtime notifications enabled");
                Arc::new(notifier)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid notifier configuration, notifications disabled");
                Arc::new(DisabledNotifier)
            }
        },
        None => Arc::new(DisabledNotifier),
    }
}

fn auth_config(config: &ServerConfig) -> AuthConfig {
    let jwks = config.jwks_url.as_deref().map(|url| {
        tracing::info!(jwks_url = %url, "Bearer tokens verified against JWKS");
        JwksManager::new(url).expect("Failed to create JWKS manager")
    });
    if jwks.is_none() {
        tracing::warn!("AUTH_JWKS_URL not set, bearer token signatures are NOT verified (development mode)");
    }
    AuthConfig {
        jwks,
        issuer: config.issuer.clone(),
        audience: config.audience.clone(),
    }
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env().expect("Invalid configuration");
    init_tracing(config.log_format);

    let shutdown = CancellationToken::new();

    let ephemeral = ephemeral_store(&config, &shutdown).await;
    let registry = RedbRegistry::open(&config.registry_path).expect("Failed to open address registry");
    tracing::info!(path = %config.registry_path.display(), "Address registry opened");

    let state = AppState::new(
        ephemeral,
        Arc::new(registry),
        notifier(&config),
        RetentionPolicy::new(config.guest_retention_secs),
    )
    .with_auth_config(auth_config(&config))
    .with_default_domain(config.default_domain.clone());

    let addr = config.bind_addr().expect("Failed to parse bind address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!(%addr, guest_retention_secs = config.guest_retention_secs, "VaultMail listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
}
