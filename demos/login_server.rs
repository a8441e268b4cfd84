//! Serves the login route over an in-memory store seeded with one WordPress
//! user (`a@b.com` / `test12345`).
//!
//! ```text
//! cargo run --example login_server -- [settings.toml]
//! curl -X POST localhost:3000/api/users/login \
//!     -H 'content-type: application/json' \
//!     -d '{"email":"a@b.com","password":"test12345"}'
//! ```

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wp_password_migrate::{
    build_router,
    record::NewRecord,
    schema::{transform, CollectionConfig, HostConfig, PluginSide},
    InMemoryRecordStore, LoginState, MigrationGate, PluginSettings, WordPressVerifier,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wp_password_migrate=debug,tower_http=info")),
        )
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => PluginSettings::from_path(path)?,
        None => PluginSettings::default(),
    };

    let base = HostConfig {
        collections: vec![CollectionConfig::auth("users")],
        ..HostConfig::default()
    };
    let config = transform(base, &settings, PluginSide::Server);
    tracing::info!(endpoints = config.endpoints.len(), "host configuration extended");

    let store = Arc::new(InMemoryRecordStore::new(&config, &settings));
    store
        .insert(
            "users",
            NewRecord::legacy("a@b.com", "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0"),
        )
        .await?;

    let gate = MigrationGate::new(store.clone(), Arc::new(WordPressVerifier)).with_settings(&settings);
    let app = build_router(LoginState::new(gate, store, settings));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
