use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for the order core
// ============================================================================
//
// Provides metrics for:
// - Order operations (count and latency by operation and outcome)
// - Line item mutations made by create / update / delete / sync
// - Transaction rollbacks
// - Report generation outcomes
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order operation metrics
    pub order_operations: IntCounterVec,
    pub order_operation_duration: HistogramVec,

    // Line item metrics
    pub item_mutations: IntCounterVec,

    // Transaction metrics
    pub transaction_rollbacks: IntCounterVec,

    // Report metrics
    pub reports_generated: IntCounterVec,
    pub report_rows: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let order_operations = IntCounterVec::new(
            Opts::new("order_operations_total", "Order operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(order_operations.clone()))?;

        let order_operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(order_operation_duration.clone()))?;

        let item_mutations = IntCounterVec::new(
            Opts::new("order_item_mutations_total", "Line item rows created, updated or deleted"),
            &["kind"],
        )?;
        registry.register(Box::new(item_mutations.clone()))?;

        let transaction_rollbacks = IntCounterVec::new(
            Opts::new("order_transaction_rollbacks_total", "Transactions rolled back"),
            &["operation"],
        )?;
        registry.register(Box::new(transaction_rollbacks.clone()))?;

        let reports_generated = IntCounterVec::new(
            Opts::new("order_reports_generated_total", "CSV report runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reports_generated.clone()))?;

        let report_rows = IntCounter::new("order_report_rows_total", "Rows written to CSV reports")?;
        registry.register(Box::new(report_rows.clone()))?;

        Ok(Self {
            registry,
            order_operations,
            order_operation_duration,
            item_mutations,
            transaction_rollbacks,
            reports_generated,
            report_rows,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_operation(&self, operation: &str, duration_secs: f64, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.order_operations.with_label_values(&[operation, outcome]).inc();
        self.order_operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_item_mutation(&self, kind: &str) {
        self.item_mutations.with_label_values(&[kind]).inc();
    }

    pub fn record_rollback(&self, operation: &str) {
        self.transaction_rollbacks.with_label_values(&[operation]).inc();
    }

    /// `outcome` is one of `ok`, `empty` or `failed`.
    pub fn record_report(&self, outcome: &str, rows: usize) {
        self.reports_generated.with_label_values(&[outcome]).inc();
        self.report_rows.inc_by(rows as u64);
    }

    /// Prometheus text exposition of everything registered.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
