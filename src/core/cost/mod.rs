pub mod aggregate;
pub mod calculator;
pub mod pricing;
