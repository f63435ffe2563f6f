use std::sync::Arc;

use anyhow::anyhow;

use murmur_db::Database;
use murmur_gateway::dispatcher::Dispatcher;

use crate::auth::AuthConfig;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub auth: AuthConfig,
}

impl AppStateInner {
    pub fn new(db: Database, dispatcher: Dispatcher, auth: AuthConfig) -> AppState {
        Arc::new(Self {
            db,
            dispatcher,
            auth,
        })
    }

    /// Run blocking DB work off the async runtime. Store failures become
    /// `ApiError::Internal`.
    pub async fn with_db<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
            .map_err(ApiError::from)
    }
}
