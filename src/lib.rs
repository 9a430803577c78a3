pub mod config;
pub mod db;
pub mod domain;
pub mod metrics;
pub mod reporting;
pub mod storage;
pub mod utils;
