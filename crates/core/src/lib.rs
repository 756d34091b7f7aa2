pub mod cache;
pub mod config;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod tests;

pub use cache::*;
pub use config::*;
pub use telemetry::init_tracing;
pub use types::*;
