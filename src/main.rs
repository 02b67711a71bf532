//! K-Beauty Marketplace Order Engine

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kbeauty_orders::api::{router, AppState};
use kbeauty_orders::config::Config;
use kbeauty_orders::infrastructure::memory::InMemoryEventLog;
use kbeauty_orders::infrastructure::nats::NatsPublisher;
use kbeauty_orders::infrastructure::postgres::PgStore;
use kbeauty_orders::infrastructure::sandbox_payment::SandboxGateway;
use kbeauty_orders::infrastructure::{Backends, MemoryBackends};
use kbeauty_orders::ports::EventPublisher;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = Config::from_env()?;

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url, config.nats_subject.clone()).await {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable; keeping events in process");
                Arc::new(InMemoryEventLog::default())
            }
        },
        None => Arc::new(InMemoryEventLog::default()),
    };
    let payments = Arc::new(SandboxGateway::default());

    let backends = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Backends::postgres(PgStore::new(db), payments, events)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory storage");
            let memory = MemoryBackends { payments, ..Default::default() };
            Backends { events, ..memory.backends() }
        }
    };

    let app = router(AppState::new(backends, config.checkout.clone()));
    tracing::info!(port = config.port, currency = %config.currency, "kbeauty-orders listening");
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
