//! Shared application state

use std::sync::Arc;

use shared::{AppError, AppResult};

use crate::config::Config;
use crate::engine::{EngineError, ReservationEngine};
use crate::rate_limit::RateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The reservation & settlement engine
    pub engine: Arc<ReservationEngine>,
    /// Rate limiter for the public pay page
    pub rate_limiter: RateLimiter,
    /// Payment provider webhook signing secret
    pub webhook_secret: String,
}

impl AppState {
    pub fn new(config: &Config) -> AppResult<Self> {
        let engine = ReservationEngine::new(config.db_path())?;
        Ok(Self {
            engine: Arc::new(engine),
            rate_limiter: RateLimiter::new(),
            webhook_secret: config.payment_webhook_secret.clone(),
        })
    }

    /// Run an engine operation on the blocking pool (redb transactions block)
    pub async fn with_engine<T, F>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(&ReservationEngine) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|e| AppError::internal(format!("Engine task failed: {e}")))?
            .map_err(AppError::from)
    }
}
