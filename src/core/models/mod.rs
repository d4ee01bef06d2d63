pub mod anomaly;
pub mod budget;
pub mod cost;
pub mod recommendation;
pub mod usage;
