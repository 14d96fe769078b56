use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::Backend;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    Enterprise,
    Project,
}

impl PermissionScope {
    pub fn as_str(&self) -> &str {
        match self {
            PermissionScope::Enterprise => "enterprise",
            PermissionScope::Project => "project",
        }
    }
}

impl std::str::FromStr for PermissionScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "enterprise" => Ok(PermissionScope::Enterprise),
            "project" => Ok(PermissionScope::Project),
            _ => Err(Error::validation(format!("Invalid permission scope: {}", s))),
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    pub enterprise: HashSet<String>,
    pub project: HashSet<String>,
    pub is_owner: bool,
}

impl PermissionSet {
    /// Owners pass every check regardless of the codes they were granted.
    pub fn has_permission(&self, code: &str, scope: PermissionScope) -> bool {
        if self.is_owner {
            return true;
        }

        match scope {
            PermissionScope::Enterprise => self.enterprise.contains(code),
            PermissionScope::Project => self.project.contains(code),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.is_owner && self.enterprise.is_empty() && self.project.is_empty()
    }
}

#[derive(Default)]
struct CacheState {
    set: PermissionSet,
    in_flight: usize,
    generation: u64,
}

/// Permission codes for the active workspace, consulted synchronously.
///
/// Every invalidation bumps a generation counter. A fetch started under an
/// older generation is dropped when it completes, so a set fetched for one
/// workspace can never be installed after the switch to another. Loading
/// stays on while any fetch of the current generation is outstanding.
pub struct PermissionCache {
    backend: Arc<dyn Backend>,
    state: Mutex<CacheState>,
}

impl PermissionCache {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn has_permission(&self, code: &str, scope: PermissionScope) -> bool {
        self.state().set.has_permission(code, scope)
    }

    pub fn is_loading(&self) -> bool {
        self.state().in_flight > 0
    }

    pub fn snapshot(&self) -> PermissionSet {
        self.state().set.clone()
    }

    pub fn invalidate(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.set = PermissionSet::default();
        state.in_flight = 0;
    }

    /// Loads enterprise and project codes for `user_id`. A failing half is
    /// logged and left empty; the call itself never fails.
    pub async fn fetch_permissions(
        &self,
        user_id: &str,
        project_id: Option<&str>,
    ) -> PermissionSet {
        let generation = {
            let mut state = self.state();
            state.in_flight += 1;
            state.generation
        };

        let mut set = PermissionSet::default();

        match self.backend.enterprise_permissions(user_id).await {
            Ok(grant) => {
                set.enterprise = grant.permissions.into_iter().collect();
                set.is_owner = grant.is_owner;
            }
            Err(e) => tracing::warn!("Failed to fetch enterprise permissions: {}", e),
        }

        if let Some(project_id) = project_id {
            match self.backend.project_permissions(user_id, project_id).await {
                Ok(grant) => set.project = grant.permissions.into_iter().collect(),
                Err(e) => tracing::warn!(
                    "Failed to fetch project permissions for {}: {}",
                    project_id,
                    e
                ),
            }
        }

        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!("Discarding permissions fetched for a previous workspace");
            return state.set.clone();
        }

        state.set = set.clone();
        state.in_flight = state.in_flight.saturating_sub(1);
        tracing::debug!(
            "Loaded {} enterprise and {} project permissions (owner: {})",
            set.enterprise.len(),
            set.project.len(),
            set.is_owner
        );

        set
    }
}
