//! Application state management

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::sync::{RecordStore, SyncCoordinator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn RecordStore>,
    verifier: TokenVerifier,
    coordinator: SyncCoordinator,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> Self {
        let verifier = TokenVerifier::new(&config.auth.jwt_secret);
        let coordinator = SyncCoordinator::new(store.clone(), config.sync.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                verifier,
                coordinator,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the record store
    pub fn store(&self) -> &dyn RecordStore {
        self.inner.store.as_ref()
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.inner.coordinator
    }
}
