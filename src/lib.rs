//! Token-usage cost analytics: pricing, aggregation, budgets, anomaly
//! detection and savings recommendations over LLM usage events.

pub mod cli;
pub mod core;
