//! `netplane` server: cluster connection pool, backend adapters, managers,
//! operation dispatchers, and the axum RPC surface.

pub mod app;
pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod manager;
pub mod network;
pub mod pool;
pub mod telemetry;
pub mod worker;

pub use app::{Application, Backends};
pub use config::ServiceConfig;
