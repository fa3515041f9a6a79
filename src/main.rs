use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use roomrelay::{
    AppState, Config,
    rooms::{Broadcaster, Relay, RoomRegistry, reconcile},
    store::{MemoryStore, MessageStore, SqliteStore},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn MessageStore> = match &config.database_url {
        Some(url) => {
            let options = SqliteConnectOptions::from_str(url)
                .with_context(|| format!("bad DATABASE_URL {url:?}"))?
                .create_if_missing(true);
            let db_pool = SqlitePoolOptions::new()
                .max_connections(config.database_pool_size())
                .connect_with(options)
                .await
                .context("opening message database")?;
            let store = SqliteStore::new(db_pool);
            store.migrate().await.context("creating message schema")?;
            info!("storing messages in {url}");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, messages are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let relay = Arc::new(Relay::new(
        store,
        Broadcaster::new(Arc::new(RoomRegistry::new())),
    ));

    if let Some(every) = config.reconcile_interval {
        tokio::spawn(reconcile::run(relay.clone(), every, config.reconcile_grace));
    }

    let app = roomrelay::app(AppState { relay }, config.cors_layer()?);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
