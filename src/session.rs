use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::SessionStorage;

pub mod keys {
    pub const TOKEN: &str = "token";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER: &str = "user";
    pub const LAST_WORKSPACE_ID: &str = "lastWorkspaceId";
    pub const LAST_WORKSPACE_TYPE: &str = "lastWorkspaceType";
    pub const CURRENT_WORKSPACE: &str = "currentWorkspace";
    pub const REMEMBERED_EMAIL: &str = "rememberedEmail";
    pub const DEVICE_ID: &str = "deviceId";
}

/// Keys owned by a signed-in session. `rememberedEmail` and `deviceId`
/// outlive logout.
pub const SESSION_KEYS: [&str; 6] = [
    keys::TOKEN,
    keys::REFRESH_TOKEN,
    keys::USER,
    keys::LAST_WORKSPACE_ID,
    keys::LAST_WORKSPACE_TYPE,
    keys::CURRENT_WORKSPACE,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceType {
    Enterprise,
    Supplier,
}

impl WorkspaceType {
    pub fn as_str(&self) -> &str {
        match self {
            WorkspaceType::Enterprise => "enterprise",
            WorkspaceType::Supplier => "supplier",
        }
    }
}

impl std::str::FromStr for WorkspaceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "enterprise" => Ok(WorkspaceType::Enterprise),
            "supplier" => Ok(WorkspaceType::Supplier),
            _ => Err(Error::validation(format!("Invalid workspace type: {}", s))),
        }
    }
}

impl fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer to the workspace the user last acted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: WorkspaceType,
}

impl WorkspaceRef {
    pub fn new(id: impl Into<String>, kind: WorkspaceType) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn dashboard_path(&self) -> String {
        format!("/{}/{}/dashboard", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Point-in-time view of everything the store holds for the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    pub workspace: Option<WorkspaceRef>,
}

impl Session {
    pub fn has_credentials(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }
}

/// Typed access to the session keys of a [`SessionStorage`].
///
/// Every read goes through a serde schema. Values that fail to parse are
/// reported and treated as absent.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.storage.get(key).filter(|v| !v.trim().is_empty())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_non_empty(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring corrupted '{}' entry: {}", key, e);
                None
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.get_non_empty(keys::TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get_non_empty(keys::REFRESH_TOKEN)
    }

    pub fn user(&self) -> Option<User> {
        self.get_json(keys::USER)
    }

    /// The `lastWorkspaceId`/`lastWorkspaceType` pair, falling back to the
    /// `currentWorkspace` blob when the pair is incomplete.
    pub fn workspace(&self) -> Option<WorkspaceRef> {
        let id = self.get_non_empty(keys::LAST_WORKSPACE_ID);
        let kind = self.get_non_empty(keys::LAST_WORKSPACE_TYPE);

        if let (Some(id), Some(kind)) = (id, kind) {
            match kind.parse::<WorkspaceType>() {
                Ok(kind) => return Some(WorkspaceRef { id, kind }),
                Err(e) => tracing::warn!("Ignoring stored workspace pointer: {}", e),
            }
        }

        self.get_json(keys::CURRENT_WORKSPACE)
    }

    pub fn snapshot(&self) -> Session {
        Session {
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
            user: self.user(),
            workspace: self.workspace(),
        }
    }

    pub fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.storage.set_all(&[
            (keys::TOKEN, tokens.access_token.as_str()),
            (keys::REFRESH_TOKEN, tokens.refresh_token.as_str()),
        ])
    }

    pub fn save_user(&self, user: &User) -> Result<()> {
        self.storage.set(keys::USER, &serde_json::to_string(user)?)
    }

    /// Tokens and profile of a fresh sign-in, written in one batch.
    pub fn save_login(&self, tokens: &TokenPair, user: &User) -> Result<()> {
        let user = serde_json::to_string(user)?;
        self.storage.set_all(&[
            (keys::TOKEN, tokens.access_token.as_str()),
            (keys::REFRESH_TOKEN, tokens.refresh_token.as_str()),
            (keys::USER, user.as_str()),
        ])
    }

    pub fn save_workspace(&self, workspace: &WorkspaceRef) -> Result<()> {
        let current = serde_json::to_string(workspace)?;
        self.storage.set_all(&[
            (keys::LAST_WORKSPACE_ID, workspace.id.as_str()),
            (keys::LAST_WORKSPACE_TYPE, workspace.kind.as_str()),
            (keys::CURRENT_WORKSPACE, current.as_str()),
        ])
    }

    /// Scoped tokens together with the workspace they belong to, written as
    /// one batch so a batching backend changes all five keys or none.
    pub fn save_switch(&self, tokens: &TokenPair, workspace: &WorkspaceRef) -> Result<()> {
        let current = serde_json::to_string(workspace)?;
        self.storage.set_all(&[
            (keys::TOKEN, tokens.access_token.as_str()),
            (keys::REFRESH_TOKEN, tokens.refresh_token.as_str()),
            (keys::LAST_WORKSPACE_ID, workspace.id.as_str()),
            (keys::LAST_WORKSPACE_TYPE, workspace.kind.as_str()),
            (keys::CURRENT_WORKSPACE, current.as_str()),
        ])
    }

    pub fn clear_workspace(&self) -> Result<()> {
        self.storage.remove_all(&[
            keys::LAST_WORKSPACE_ID,
            keys::LAST_WORKSPACE_TYPE,
            keys::CURRENT_WORKSPACE,
        ])
    }

    /// Removes every session key, whatever state they are in. All keys are
    /// attempted even if the backend reports an error.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove_all(&SESSION_KEYS)
    }

    pub fn remembered_email(&self) -> Option<String> {
        self.get_non_empty(keys::REMEMBERED_EMAIL)
    }

    pub fn set_remembered_email(&self, email: Option<&str>) -> Result<()> {
        match email {
            Some(email) => self.storage.set(keys::REMEMBERED_EMAIL, email),
            None => self.storage.remove(keys::REMEMBERED_EMAIL),
        }
    }

    /// Stable identifier for this installation, created on first use.
    pub fn device_id(&self) -> Result<String> {
        if let Some(id) = self.get_non_empty(keys::DEVICE_ID) {
            return Ok(id);
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.storage.set(keys::DEVICE_ID, &id)?;
        Ok(id)
    }
}
