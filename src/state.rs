//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::db::SqliteLocalStore;
use crate::remote::RemoteStore;
use crate::sync::SyncEngine;

/// Engine type served over HTTP
pub type Engine = SyncEngine<SqliteLocalStore, Arc<dyn RemoteStore>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    engine: Engine,
}

impl AppState {
    pub fn new(config: Config, local: SqliteLocalStore, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine: SyncEngine::new(local, remote),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the sync engine
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Get the local store
    pub fn store(&self) -> &SqliteLocalStore {
        self.inner.engine.local()
    }
}
