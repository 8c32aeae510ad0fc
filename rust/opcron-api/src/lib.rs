//! Opcron - request-triggered cron scheduling service.
//!
//! Opcron schedules named hooks against unix timestamps and runs them
//! without a resident scheduler process: every inbound HTTP request
//! opportunistically checks whether scheduled work is due and, if so,
//! triggers an out-of-band runner pass. Coordination between concurrent
//! web-server processes happens entirely through a shared key-value
//! store holding the schedule document and an advisory, timeout-bounded
//! run lock.
//!
//! # Architecture
//!
//! - [`config`]: Configuration management and environment loading
//! - [`store`]: Key-value persistence (Redis, with in-memory fallback)
//! - [`cron`]: Schedule structure, scheduler operations, lock, runner,
//!   and trigger spawner
//! - [`api`]: HTTP endpoints (trigger endpoint, management API, health)
//!
//! # Example
//!
//! ```rust,ignore
//! use opcron_api::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod cron;
pub mod logging;
pub mod server;
pub mod store;

use std::sync::Arc;

use config::AppConfig;
use cron::CronService;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The cron subsystem.
    pub cron: Arc<CronService>,
}
