//! InnovaForge
//!
//! Plan entitlements, quota-gated idea generation and builds, build lifecycle
//! tracking, and Stripe billing synchronization.
//!
//! ## Standalone
//!
//! Run the binary:
//! ```bash
//! innovaforge-server
//! ```
//!
//! ## Embedded (Axum)
//!
//! With the `server` feature enabled the router can be mounted in a larger Axum app:
//! ```rust,ignore
//! use axum::Router;
//! use innovaforge::infrastructure::AppConfig;
//! use innovaforge::server::{build_state_with_pool, router};
//! use sqlx::PgPool;
//!
//! let cfg = AppConfig::from_env()?;
//! let pool = PgPool::connect(&cfg.database_url).await?;
//! let state = build_state_with_pool(cfg, pool, true).await?;
//! let app = Router::new().nest("/forge", router(state));
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// Behind the `server` feature so the services can be used without Axum.
#[cfg(feature = "server")]
pub mod server;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;

#[cfg(feature = "server")]
pub use server::*;
