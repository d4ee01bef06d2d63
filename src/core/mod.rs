pub mod anomaly;
pub mod budget;
pub mod config;
pub mod cost;
pub mod error;
pub mod formatter;
pub mod models;
pub mod recommend;
pub mod report;
pub mod store;
