use anyhow::Context;
use boardsync::prelude::*;
use boardsync::session::{RedisStore, SessionStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::load().context("loading configuration")?;

    match config.redis_url.clone() {
        Some(url) => {
            let store = RedisStore::connect(&url)
                .await
                .with_context(|| format!("connecting to {url}"))?;
            serve(config, store).await
        }
        None => {
            tracing::warn!("no redis_url configured, sessions are in-memory");
            serve(config, MemoryStore::new()).await
        }
    }
}

async fn serve<S: SessionStore>(
    config: ServerConfig,
    store: S,
) -> anyhow::Result<()> {
    let server = BoardsyncServer::builder()
        .config(config)
        .build(store, MemoryIdentities::new(), MemoryBoards::new())
        .await?;
    tracing::info!(addr = %server.local_addr()?, "boardsync listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
