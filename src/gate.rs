use crate::permissions::{PermissionCache, PermissionScope};

pub const ACCESS_DENIED_TITLE: &str = "Access Denied";
pub const ACCESS_DENIED_MESSAGE: &str =
    "You don't have permission to access this page. Please contact your administrator.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView {
    Children,
    Loading,
    AccessDenied,
}

/// Loading wins over a negative answer: the set may still be arriving.
pub fn evaluate(has_permission: bool, loading: bool) -> GateView {
    if loading {
        GateView::Loading
    } else if has_permission {
        GateView::Children
    } else {
        GateView::AccessDenied
    }
}

#[derive(Debug, Clone)]
pub struct PermissionGate {
    code: String,
    scope: PermissionScope,
}

impl PermissionGate {
    pub fn new(code: impl Into<String>, scope: PermissionScope) -> Self {
        Self {
            code: code.into(),
            scope,
        }
    }

    pub fn check(&self, cache: &PermissionCache) -> GateView {
        evaluate(
            cache.has_permission(&self.code, self.scope),
            cache.is_loading(),
        )
    }

    /// Runs `children` only when the gate opens.
    pub fn guard<T>(
        &self,
        cache: &PermissionCache,
        children: impl FnOnce() -> T,
    ) -> Result<T, GateView> {
        match self.check(cache) {
            GateView::Children => Ok(children()),
            view => Err(view),
        }
    }
}
