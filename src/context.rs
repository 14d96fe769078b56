use std::sync::Arc;

use crate::api::{ApiClient, Backend};
use crate::config::Config;
use crate::controller::{AuthSessionController, AuthState, NavigationDecision};
use crate::error::{Error, Result};
use crate::notify::{ConsoleNotifier, Notifier};
use crate::permissions::PermissionCache;
use crate::session::SessionStore;
use crate::storage::{FileStorage, SessionStorage};
use crate::workspace::WorkspaceSwitcher;

/// Everything a command needs, wired once and handed around explicitly.
pub struct AppContext {
    pub store: SessionStore,
    pub backend: Arc<dyn Backend>,
    pub permissions: Arc<PermissionCache>,
    pub notifier: Arc<dyn Notifier>,
    controller: AuthSessionController,
}

impl AppContext {
    pub fn new(
        storage: Arc<dyn SessionStorage>,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = SessionStore::new(storage);
        Self::with_store(store, backend, notifier)
    }

    pub fn with_store(
        store: SessionStore,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            controller: AuthSessionController::new(store.clone()),
            permissions: Arc::new(PermissionCache::new(backend.clone())),
            store,
            backend,
            notifier,
        }
    }

    /// File-backed storage, the HTTP client and console notifications.
    pub fn from_config(config: &Config) -> Result<(Self, ApiClient)> {
        let storage: Arc<dyn SessionStorage> =
            Arc::new(FileStorage::open(&config.storage_path)?);
        let store = SessionStore::new(storage);
        let api = ApiClient::from_config(config, store.clone())?;
        let ctx = Self::with_store(store, Arc::new(api.clone()), Arc::new(ConsoleNotifier));
        Ok((ctx, api))
    }

    pub fn auth_state(&self) -> AuthState {
        self.controller.state()
    }

    pub fn check(&mut self, current_path: &str) -> NavigationDecision {
        self.controller.check(current_path)
    }

    pub fn switcher(&self) -> WorkspaceSwitcher {
        WorkspaceSwitcher::new(
            self.backend.clone(),
            self.store.clone(),
            self.permissions.clone(),
            self.notifier.clone(),
        )
    }

    pub(crate) fn controller_mut(&mut self) -> &mut AuthSessionController {
        &mut self.controller
    }

    /// Drops the local session after the server rejected its token.
    pub fn force_relogin(&mut self) -> Result<()> {
        tracing::warn!("API rejected the session token, signing out");
        self.permissions.invalidate();
        self.controller.mark_unauthenticated();
        self.notifier
            .error("Your session has expired. Please sign in again.");
        self.store.clear()
    }

    /// Applies the 401 rule to an API result: an `Unauthorized` error ends
    /// the session before it is passed on. Failing to clear storage is
    /// logged; the caller still sees the 401.
    pub fn intercept<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(Error::Unauthorized) = &result {
            if let Err(e) = self.force_relogin() {
                tracing::error!("Failed to clear the rejected session: {}", e);
            }
        }
        result
    }
}
