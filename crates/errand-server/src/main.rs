mod config;

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use errand_api::auth::hash_password;
use errand_api::{AppStateInner, router};
use errand_db::Database;
use errand_token::TokenVerifier;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "errand_server=debug,errand_api=debug,errand_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(?config, "Configuration loaded");

    // Init database
    let db = Database::open(&config.db_path)?;

    if let Some(admin) = &config.admin {
        let hash = hash_password(&admin.password)?;
        if !db.ensure_admin(&admin.username, &hash, Utc::now())? {
            info!("Bootstrap admin '{}' already exists", admin.username);
        }
    }

    let verifier = TokenVerifier::new(config.token_secret.as_bytes())
        .with_ttl(Duration::days(config.token_ttl_days));

    let app = router(Arc::new(AppStateInner {
        db,
        verifier,
        pricing: config.pricing,
    }));

    let addr = config.socket_addr();
    info!("Errand server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
