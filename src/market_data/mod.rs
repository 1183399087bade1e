// Market data module entrypoint
pub mod adapters;   // per-venue protocol + shared connection lifecycle
pub mod connection; // websocket wrapper used by every adapter
pub mod normaliser; // price/size strings -> f64
pub mod router;     // fans canonical events out to history + observers
