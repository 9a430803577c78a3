// ============================================================================
// Reporting - Tabular exports of order data
// ============================================================================

mod csv_report;

pub use csv_report::{
    write_csv, OrderReportRow, ReportConfig, ReportError, ReportGenerator, DEFAULT_DATE_FORMAT,
};
