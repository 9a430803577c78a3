use std::fmt::Write as _;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::metrics::Metrics;
use crate::storage::{OrderReportSource, OrderRepository, StorageError};

// ============================================================================
// CSV Order Report
// ============================================================================
//
// Best effort by contract: `generate_csv` never returns an error. Anything
// that goes wrong is logged and turned into an empty byte vector, so a
// request that also renders dashboard data cannot be broken by the export.
//
// ============================================================================

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Include canceled (soft-deleted) orders and items.
    pub include_inactive: bool,
    /// chrono format string for the order date column.
    pub date_format: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_inactive: true,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer flush failed: {0}")]
    Flush(String),

    #[error("Invalid date format: {0}")]
    DateFormat(String),
}

/// One CSV data row. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderReportRow {
    #[serde(rename = "Order Number")]
    pub order_number: i64,
    #[serde(rename = "Client Name")]
    pub client_name: String,
    #[serde(rename = "Order Date")]
    pub order_date: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Total Items")]
    pub total_items: i64,
    #[serde(rename = "Total Value")]
    pub total_value: Decimal,
}

impl OrderReportRow {
    pub fn from_source(source: &OrderReportSource, date_format: &str) -> Result<Self, ReportError> {
        let mut order_date = String::new();
        write!(order_date, "{}", source.order.order_date.format(date_format))
            .map_err(|_| ReportError::DateFormat(date_format.to_string()))?;

        Ok(Self {
            order_number: source.order.id,
            client_name: source.client_name.clone().unwrap_or_default(),
            order_date,
            status: source.order.status.to_string(),
            total_items: source.items.iter().map(|item| i64::from(item.quantity)).sum(),
            total_value: source.order.total_value,
        })
    }
}

/// Serialize rows with a header line.
pub fn write_csv(rows: &[OrderReportRow]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.error().to_string()))
}

pub struct ReportGenerator<S> {
    store: Arc<S>,
    metrics: Arc<Metrics>,
    config: ReportConfig,
}

impl<S: OrderRepository> ReportGenerator<S> {
    pub fn new(store: Arc<S>, metrics: Arc<Metrics>, config: ReportConfig) -> Self {
        Self {
            store,
            metrics,
            config,
        }
    }

    /// All orders as CSV bytes, or an empty vector when there is nothing to
    /// report or the export failed.
    pub async fn generate_csv(&self) -> Vec<u8> {
        match self.try_generate().await {
            Ok((_, 0)) => {
                tracing::warn!("No orders found for CSV report");
                self.metrics.record_report("empty", 0);
                Vec::new()
            }
            Ok((bytes, rows)) => {
                tracing::info!(rows, bytes = bytes.len(), "📄 Generated order CSV report");
                self.metrics.record_report("ok", rows);
                bytes
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to generate order CSV report");
                self.metrics.record_report("failed", 0);
                Vec::new()
            }
        }
    }

    async fn try_generate(&self) -> Result<(Vec<u8>, usize), ReportError> {
        let sources = self.load().await?;
        if sources.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let rows = sources
            .iter()
            .map(|source| OrderReportRow::from_source(source, &self.config.date_format))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((write_csv(&rows)?, rows.len()))
    }

    async fn load(&self) -> Result<Vec<OrderReportSource>, StorageError> {
        let mut tx = self.store.begin().await?;
        match self
            .store
            .report_orders(&mut tx, self.config.include_inactive)
            .await
        {
            Ok(sources) => {
                self.store.commit(tx).await?;
                Ok(sources)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::error!(error = %rollback_err, "Rollback of report read failed");
                }
                Err(err)
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
