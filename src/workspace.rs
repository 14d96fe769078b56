use std::sync::Arc;

use crate::api::Backend;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::permissions::{PermissionCache, PermissionSet};
use crate::session::{SessionStore, WorkspaceRef};

pub struct WorkspaceSwitcher {
    backend: Arc<dyn Backend>,
    store: SessionStore,
    permissions: Arc<PermissionCache>,
    notifier: Arc<dyn Notifier>,
}

impl WorkspaceSwitcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: SessionStore,
        permissions: Arc<PermissionCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            store,
            permissions,
            notifier,
        }
    }

    /// Exchanges the session tokens for ones scoped to `workspace`.
    ///
    /// Storage is written only once the API has answered with new tokens. A
    /// failed call leaves tokens, pointer and cached permissions untouched.
    /// Once new tokens exist the cached permissions are dropped first; if
    /// persisting them then fails, tokens and pointer stay on the previous
    /// workspace and no permissions are cached.
    pub async fn switch(
        &self,
        workspace: &WorkspaceRef,
        project_id: Option<&str>,
    ) -> Result<PermissionSet> {
        if self.store.access_token().is_none() {
            self.notifier.error("Sign in before selecting a workspace.");
            return Err(Error::NotAuthenticated);
        }

        tracing::info!("Switching to {} workspace {}", workspace.kind, workspace.id);

        let tokens = match self.backend.switch_workspace(workspace).await {
            Ok(tokens) => tokens,
            Err(e) => {
                let mut message = format!("Failed to switch workspace: {}", e);
                if e.is_transient() {
                    message.push_str(". Please try again.");
                }
                self.notifier.error(&message);
                return Err(e);
            }
        };

        self.permissions.invalidate();
        if let Err(e) = self.store.save_switch(&tokens, workspace) {
            self.notifier
                .error(&format!("Failed to save the selected workspace: {}", e));
            return Err(e);
        }

        let permissions = match self.store.user() {
            Some(user) => self.permissions.fetch_permissions(&user.id, project_id).await,
            None => {
                tracing::warn!("No stored user, skipping permission fetch");
                PermissionSet::default()
            }
        };

        self.notifier.success(&format!(
            "Switched to {} workspace {}",
            workspace.kind, workspace.id
        ));

        Ok(permissions)
    }
}
