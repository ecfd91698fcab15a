use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use realestate_core::application::{
    self, AddPropertyImage, CreateProperty, GetPropertyTraces, ListPropertiesWithFilters,
    UpdateProperty, UpdatePropertyPrice,
};
use realestate_core::config::{self, Backend};
use realestate_core::dispatch::Dispatcher;
use realestate_core::metrics::{self, Metrics};
use realestate_core::persistence::{
    connect_with_retry, InMemoryStore, InMemoryUnitOfWorkFactory, PgUnitOfWorkFactory,
    UnitOfWorkFactory,
};
use realestate_core::seed::{seed_demo_data, SEED_OWNER_IDS};
use realestate_core::storage::InMemoryBlobStorage;
use realestate_core::Outcome;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::config_path();
    let config = config::load_or_default(&config_path);

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    tracing::info!("🚀 Starting real estate core");
    tracing::info!(path = %config_path, backend = ?config.database.backend, "Configuration resolved");

    // === 1. Persistence backend ===
    let units: Arc<dyn UnitOfWorkFactory> = match config.database.backend {
        Backend::Memory => {
            tracing::info!("Using in-memory store");
            Arc::new(InMemoryUnitOfWorkFactory::new(InMemoryStore::shared()))
        }
        Backend::Postgres => {
            tracing::info!("Connecting to PostgreSQL...");
            let pool = connect_with_retry(
                &config.database.url,
                config.database.max_connections,
                config.database.connect_attempts,
            )
            .await
            .context("database unavailable")?;
            Arc::new(PgUnitOfWorkFactory::new(pool))
        }
    };

    let shutdown = CancellationToken::new();

    if config.seed {
        seed_demo_data(units.as_ref(), &shutdown)
            .await
            .context("seeding demo data")?;
    }

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    if config.metrics.enabled {
        let served = metrics.clone();
        let settings = config.metrics.clone();
        std::thread::spawn(move || match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(async {
                if let Err(e) = metrics::start_metrics_server(served, settings).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            }),
            Err(e) => tracing::error!("Could not start metrics runtime: {}", e),
        });
    }

    // === 3. Dispatcher with every use case ===
    let storage = Arc::new(InMemoryBlobStorage::new(config.storage.base_url.clone()));
    let dispatcher = application::register_handlers(units, storage, Some(metrics.clone()))?;
    tracing::info!(handlers = dispatcher.handler_count(), "Dispatcher ready");

    // === 4. Property lifecycle ===
    if config.seed {
        run_demo(&dispatcher, &shutdown).await?;
    } else {
        tracing::info!("Seeding disabled, skipping demo lifecycle");
    }

    if config.metrics.enabled {
        tracing::info!("⏳ Serving metrics until Ctrl+C");
        tokio::signal::ctrl_c().await?;
        shutdown.cancel();
    }

    tracing::info!("🎉 Done");
    Ok(())
}

/// Unwrap a successful outcome or turn its errors into an anyhow error
fn settle<T>(outcome: Outcome<T>, step: &str) -> anyhow::Result<T> {
    outcome
        .into_result()
        .map_err(|errors| anyhow::anyhow!("{} failed: {}", step, errors.join("; ")))
}

async fn run_demo(dispatcher: &Dispatcher, cancel: &CancellationToken) -> anyhow::Result<()> {
    tracing::info!("📝 Demonstrating property lifecycle");

    let code = format!("DEMO-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let created = settle(
        dispatcher
            .send(
                CreateProperty {
                    name: "Ocean Breeze Penthouse".to_string(),
                    address: "1 Collins Ave, Miami Beach, FL 33139".to_string(),
                    price: Decimal::from(750_000),
                    code_internal: code.clone(),
                    year: 2021,
                    owner_id: SEED_OWNER_IDS[0],
                },
                cancel,
            )
            .await?,
        "create property",
    )?;
    tracing::info!("✅ Property created: {} ({})", created.property_id, created.code_internal);

    let image = settle(
        dispatcher
            .send(
                AddPropertyImage {
                    property_id: created.property_id,
                    file_name: "terrace.png".to_string(),
                    content_type: "image/png".to_string(),
                    data: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
                },
                cancel,
            )
            .await?,
        "add image",
    )?;
    tracing::info!("✅ Image added: {}", image.image_url);

    let repriced = settle(
        dispatcher
            .send(
                UpdatePropertyPrice {
                    property_id: created.property_id,
                    new_price: Decimal::from(1_000_000),
                },
                cancel,
            )
            .await?,
        "update price",
    )?;
    tracing::info!("✅ Price updated: {} -> {}", repriced.old_price, repriced.new_price);

    let updated = settle(
        dispatcher
            .send(
                UpdateProperty {
                    id: created.property_id,
                    name: "Ocean Breeze Penthouse (renovated)".to_string(),
                    address: "1 Collins Ave, Miami Beach, FL 33139".to_string(),
                    price: repriced.new_price,
                    code_internal: code,
                    year: 2021,
                    owner_id: SEED_OWNER_IDS[1],
                },
                cancel,
            )
            .await?,
        "update property",
    )?;
    tracing::info!(
        price_changed = updated.price_changed,
        owner = %updated.owner_name,
        "✅ Property updated"
    );

    let rejected = dispatcher
        .send(
            UpdatePropertyPrice {
                property_id: created.property_id,
                new_price: Decimal::ZERO,
            },
            cancel,
        )
        .await?;
    tracing::info!(errors = ?rejected.errors(), "Invalid price rejected: {}", rejected.message());

    let (listing, history) = futures_util::future::join(
        dispatcher.send(
            ListPropertiesWithFilters {
                min_price: Some(Decimal::from(1_000_000)),
                ..Default::default()
            },
            cancel,
        ),
        dispatcher.send(
            GetPropertyTraces {
                property_id: created.property_id,
            },
            cancel,
        ),
    )
    .await;

    for summary in settle(listing?, "list properties")? {
        tracing::info!(
            "🏠 {} [{}] {} - {} ({} images)",
            summary.name,
            summary.code_internal,
            summary.price,
            summary.owner_name,
            summary.image_urls.len()
        );
    }
    for trace in settle(history?, "property traces")? {
        tracing::info!("🧾 {} {}: value {} tax {}", trace.event_date, trace.name, trace.value, trace.tax);
    }

    Ok(())
}
