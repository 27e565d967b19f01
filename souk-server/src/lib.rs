//! souk-server — reservation & settlement engine for chat commerce
//!
//! # Module structure
//!
//! ```text
//! souk-server/src/
//! ├── config.rs      # Environment-driven configuration
//! ├── state.rs       # Shared AppState (engine + rate limiter)
//! ├── engine/        # Stock ledger, orders, expiry, reconciler
//! ├── provider.rs    # Webhook signature verification
//! ├── api/           # HTTP routes and handlers
//! ├── rate_limit.rs  # Per-IP rate limiting for the pay page
//! └── tasks.rs       # Supervised background tasks
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod provider;
pub mod rate_limit;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use state::AppState;
