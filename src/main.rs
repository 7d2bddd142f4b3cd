//! Content Arbiter — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the arbitration engine, its
//! collaborators, and the metrics exporter.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use content_arbiter::api::{self, AppState};
use content_arbiter::arbiter::Arbiter;
use content_arbiter::classify::HeuristicClassifier;
use content_arbiter::config::ArbiterConfig;
use content_arbiter::deliver::{DeliveryCollaborator, DiscordDelivery};
use content_arbiter::fingerprint::MemoryFingerprintStore;
use content_arbiter::metrics::Metrics;
use content_arbiter::source_priority::SourcePriority;
use content_arbiter::store::{ContentStore, JsonFileStore, MemoryContentStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("content_arbiter=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Delivery used when no webhook is configured: logs what would have been
/// announced and reports success, so local runs exercise the full pipeline.
struct LogDelivery;

#[async_trait::async_trait]
impl DeliveryCollaborator for LogDelivery {
    async fn announce(
        &self,
        payload: &content_arbiter::deliver::AnnouncePayload,
    ) -> Result<content_arbiter::deliver::DeliveryOutcome> {
        tracing::info!(
            content_id = %payload.content_id,
            source = %payload.source,
            url = payload.url.as_deref().unwrap_or("-"),
            "announce (log only; set DISCORD_WEBHOOK_URL for real delivery)"
        );
        Ok(content_arbiter::deliver::DeliveryOutcome::ok())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ArbiterConfig::load().context("load arbiter config")?;
    tracing::info!(
        lock_timeout_ms = cfg.lock_timeout_ms,
        max_age_secs = cfg.max_age_secs,
        state_path = %cfg.state_path,
        "starting content-arbiter"
    );

    let metrics = Metrics::init(cfg.lock_timeout_ms);

    let store: Arc<dyn ContentStore> = if cfg.state_path.is_empty() {
        Arc::new(MemoryContentStore::new())
    } else {
        Arc::new(
            JsonFileStore::open(&cfg.state_path)
                .await
                .context("open content state store")?,
        )
    };

    let delivery: Arc<dyn DeliveryCollaborator> = match &cfg.discord_webhook {
        Some(webhook) => Arc::new(DiscordDelivery::new(webhook.clone())),
        None => Arc::new(LogDelivery),
    };

    let priority = SourcePriority::new(cfg.source_priority.clone())
        .context("source_priority must be a non-empty list")?;

    let arbiter = Arbiter::new(store, Arc::new(MemoryFingerprintStore::new()), delivery)
        .with_classifier(Arc::new(HeuristicClassifier))
        .with_source_priority(priority)
        .with_freshness(cfg.freshness())
        .with_lock_timeout_ms(cfg.lock_timeout_ms);

    let state = AppState {
        arbiter: Arc::new(arbiter),
    };
    let app = api::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
