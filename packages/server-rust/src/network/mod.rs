//! The RPC surface: listener lifecycle, middleware, handlers, and shutdown.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::HttpConfig;
pub use handlers::{AppState, Services};
pub use module::{build_router, NetworkModule};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
