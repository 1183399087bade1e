pub mod engine;
pub mod history;
pub mod market_data;
pub mod settings;
pub mod telemetry;
