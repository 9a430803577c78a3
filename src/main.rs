use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_reconciler::config::AppConfig;
use order_reconciler::db::PgStore;
use order_reconciler::domain::order::{
    CreateOrderRequest, OrderItemRequest, OrderLifecycleManager, OrderQuery, OrderStatus,
    UpdateOrderRequest,
};
use order_reconciler::metrics::Metrics;
use order_reconciler::reporting::ReportGenerator;
use order_reconciler::storage::{MemoryStore, OrderItemRepository, OrderRepository, ProductCatalog};
use order_reconciler::utils::retry_with_backoff;

const DEMO_CLIENT: (i64, &str) = (1, "Ada Lovelace");
const DEMO_PRODUCTS: [(i64, &str, i64); 3] = [
    (1, "Fountain Pen", 1250),
    (2, "Notebook", 450),
    (3, "Ink Bottle", 800),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_reconciler=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order reconciliation demo");

    let config = AppConfig::from_env()?;
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metric families",
        metrics.registry().gather().len()
    );

    match config.database.url.clone() {
        Some(url) => {
            tracing::info!("Connecting to Postgres...");
            let store = retry_with_backoff(&config.connect_retry(), "connect", |_attempt| {
                PgStore::connect(&url, config.database.max_connections)
            })
            .await?;
            store.ensure_schema().await?;

            store.upsert_client(DEMO_CLIENT.0, DEMO_CLIENT.1).await?;
            for (id, name, cents) in DEMO_PRODUCTS {
                store.upsert_product(id, name, Decimal::new(cents, 2)).await?;
            }

            let store = Arc::new(store);
            run_demo(store.clone(), store, &config, metrics.clone()).await?;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using the in-memory store");
            let mut store = MemoryStore::new().with_client(DEMO_CLIENT.0, DEMO_CLIENT.1);
            for (id, name, cents) in DEMO_PRODUCTS {
                store = store.with_product(id, name, Decimal::new(cents, 2));
            }

            let store = Arc::new(store);
            run_demo(store.clone(), store, &config, metrics.clone()).await?;
        }
    }

    println!("{}", metrics.render()?);
    tracing::info!("🎉 Demo complete!");
    Ok(())
}

async fn run_demo<S, P>(
    store: Arc<S>,
    catalog: Arc<P>,
    config: &AppConfig,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()>
where
    S: OrderRepository + OrderItemRepository,
    P: ProductCatalog,
{
    let orders = OrderLifecycleManager::new(store.clone(), catalog, metrics.clone())
        .with_paging(config.paging);
    let reports = ReportGenerator::new(store, metrics, config.report.clone());

    tracing::info!("📝 Demonstrating order lifecycle");

    let created = orders
        .create(CreateOrderRequest {
            order_date: Some(Utc::now() - Duration::hours(1)),
            total_value: Decimal::new(3400, 2),
            status: None,
            client_id: Some(DEMO_CLIENT.0),
            items: vec![
                OrderItemRequest::new(1, 2, Decimal::new(1250, 2)),
                OrderItemRequest::new(2, 2, Decimal::new(450, 2)),
            ],
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&created)?);

    // Keep the pen line with a new quantity, drop the notebook, add ink.
    let pen = &created.items[0];
    orders
        .update(
            created.id,
            UpdateOrderRequest {
                status: Some(OrderStatus::Processing),
                total_value: Some(Decimal::new(4550, 2)),
                items: vec![
                    OrderItemRequest::existing(pen.id, pen.product_id, 3, pen.unitary_price),
                    OrderItemRequest::new(3, 1, Decimal::new(800, 2)),
                ],
                ..Default::default()
            },
        )
        .await?;

    let updated = orders.get(created.id).await?;
    println!("{}", serde_json::to_string_pretty(&updated)?);

    let second = orders
        .create(CreateOrderRequest {
            order_date: Some(Utc::now()),
            total_value: Decimal::new(800, 2),
            status: None,
            client_id: Some(DEMO_CLIENT.0),
            items: vec![OrderItemRequest::new(3, 1, Decimal::new(800, 2))],
        })
        .await?;
    orders.delete(second.id).await?;

    let page = orders.list(OrderQuery::default()).await?;
    tracing::info!(
        total_count = page.total_count,
        total_pages = page.total_pages,
        has_next = page.has_next(),
        "Listed active orders"
    );

    let processing = orders
        .list(OrderQuery::default().with_status(OrderStatus::Processing))
        .await?;
    tracing::info!(total_count = processing.total_count, "Listed processing orders");

    let csv = reports.generate_csv().await;
    println!("{}", String::from_utf8_lossy(&csv));

    Ok(())
}
