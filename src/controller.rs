use std::fmt;

use crate::session::{SessionStore, WorkspaceRef};

pub const SIGN_IN_PATH: &str = "/signin";
pub const SELECT_WORKSPACE_PATH: &str = "/select-workspace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unchecked,
    Checking,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    SignIn,
    SelectWorkspace,
    Dashboard(WorkspaceRef),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::SignIn => SIGN_IN_PATH.to_string(),
            Route::SelectWorkspace => SELECT_WORKSPACE_PATH.to_string(),
            Route::Dashboard(workspace) => workspace.dashboard_path(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationDecision {
    pub state: AuthState,
    /// `None` means stay on the current path.
    pub redirect: Option<Route>,
}

/// True for `/enterprise/...` and `/supplier/...` paths.
pub fn is_workspace_path(path: &str) -> bool {
    ["/enterprise", "/supplier"].iter().any(|prefix| {
        path.strip_prefix(prefix)
            .map(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(false)
    })
}

/// Derives the authentication state and the route to show from the stored
/// session.
///
/// A stored token is taken at face value: neither expiry nor signature is
/// checked here. The API rejects bad tokens with a 401, which ends the
/// session through [`AuthSessionController::mark_unauthenticated`].
pub struct AuthSessionController {
    store: SessionStore,
    state: AuthState,
}

impl AuthSessionController {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            state: AuthState::Unchecked,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Reads storage once. Later calls reuse the settled state until
    /// login or logout moves it.
    pub fn check(&mut self, current_path: &str) -> NavigationDecision {
        if matches!(self.state, AuthState::Unchecked | AuthState::Checking) {
            self.state = AuthState::Checking;
            let has_credentials =
                self.store.access_token().is_some() || self.store.refresh_token().is_some();

            self.state = if has_credentials {
                AuthState::Authenticated
            } else {
                AuthState::Unauthenticated
            };
            tracing::debug!("Session check settled as {:?}", self.state);
        }

        NavigationDecision {
            state: self.state,
            redirect: self.route_for(current_path),
        }
    }

    fn route_for(&self, current_path: &str) -> Option<Route> {
        if self.state != AuthState::Authenticated {
            return Some(Route::SignIn);
        }

        match self.store.workspace() {
            Some(_) if is_workspace_path(current_path) => None,
            Some(workspace) => Some(Route::Dashboard(workspace)),
            None => Some(Route::SelectWorkspace),
        }
    }

    pub fn mark_authenticated(&mut self) {
        tracing::info!("Session authenticated");
        self.state = AuthState::Authenticated;
    }

    pub fn mark_unauthenticated(&mut self) {
        tracing::info!("Session ended");
        self.state = AuthState::Unauthenticated;
    }
}
