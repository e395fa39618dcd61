use agent_ledger::notify::{ spawn_relay, LogRelay, NotificationRelay, TelegramRelay };
use agent_ledger::storage::{ HttpReceiptStorage, MemoryReceiptStorage, ReceiptStorage };
use agent_ledger::store::{ MemoryStore, SeaOrmStore, Store };
use agent_ledger::{ notify::ChangeFeed, Config, Engine };
use anyhow::{ anyhow, Context };
use std::sync::Arc;
use teloxide::Bot;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "agent_ledger=debug,tower_http=debug".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow!("invalid configuration: {}", e))?;

    let store: Arc<dyn Store> = if config.uses_memory_store() {
        tracing::warn!("DATABASE_URL=memory, records live only as long as this process");
        Arc::new(MemoryStore::new())
    } else {
        let db = agent_ledger::db
            ::connect(&config.database_url).await
            .context("database startup failed")?;
        Arc::new(SeaOrmStore::new(db))
    };

    let storage: Arc<dyn ReceiptStorage> = match &config.storage_upload_url {
        Some(upload_url) => {
            let public_url = config.storage_public_url.clone().unwrap_or_else(|| upload_url.clone());
            Arc::new(
                HttpReceiptStorage::new(upload_url.clone(), public_url, config.storage_api_key.clone())?
            )
        }
        None => {
            tracing::warn!("STORAGE_UPLOAD_URL not set, receipts are kept in memory");
            Arc::new(MemoryReceiptStorage::new())
        }
    };

    let feed = ChangeFeed::new();
    let engine = Engine::new(store.clone(), storage, feed.clone(), config.engine.clone());

    // Agent notifications
    let relay: Arc<dyn NotificationRelay> = match &config.telegram_bot_token {
        Some(token) => {
            tracing::info!("Telegram notifications enabled");
            Arc::new(TelegramRelay::new(Bot::new(token), store.clone()))
        }
        None => Arc::new(LogRelay),
    };
    spawn_relay(&feed, relay);

    // Deadline watchdog
    let watchdog = engine.watchdog();
    tokio::spawn(async move {
        watchdog.start().await;
    });

    let app = agent_ledger::api::router(engine.app_state());

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener
        ::bind(&addr).await
        .with_context(|| format!("cannot bind {}", addr))?;

    axum::serve(listener, app).await.context("server stopped")?;

    Ok(())
}
