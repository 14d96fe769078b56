use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    ChangePasswordRequest, Location, LocationInput, LoginRequest, LoginResponse, Notification,
    PermissionGrant, PermissionInfo, RefreshTokenRequest, RegisterRequest, ResendOtpRequest,
    Role, TaskType, VerifyRequest,
};
use crate::session::{SessionStore, TokenPair, WorkspaceRef};

/// Remote calls the session model depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse>;
    async fn register(&self, request: &RegisterRequest) -> Result<()>;
    async fn verify(&self, request: &VerifyRequest) -> Result<()>;
    async fn resend_otp(&self, request: &ResendOtpRequest) -> Result<()>;
    async fn change_password(&self, request: &ChangePasswordRequest) -> Result<()>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair>;
    async fn logout(&self) -> Result<()>;
    async fn switch_workspace(&self, workspace: &WorkspaceRef) -> Result<TokenPair>;
    async fn enterprise_permissions(&self, user_id: &str) -> Result<PermissionGrant>;
    async fn project_permissions(&self, user_id: &str, project_id: &str)
        -> Result<PermissionGrant>;
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// reqwest client for the EventMA REST API. The bearer token is read from
/// the session store on every request, so token swaps take effect
/// immediately.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    store: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout_seconds: u64, store: SessionStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            store,
        })
    }

    pub fn from_config(config: &crate::config::Config, store: SessionStore) -> Result<Self> {
        Self::new(&config.api_url, config.request_timeout_seconds, store)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.store.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        tracing::debug!("GET {}", path);
        self.authorized(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        tracing::debug!("POST {}", path);
        self.authorized(self.client.post(self.url(path)))
    }

    fn put(&self, path: &str) -> RequestBuilder {
        tracing::debug!("PUT {}", path);
        self.authorized(self.client.put(self.url(path)))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        tracing::debug!("DELETE {}", path);
        self.authorized(self.client.delete(self.url(path)))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        json_body(self.get("/role").send().await?).await
    }

    pub async fn update_role(&self, role: &Role) -> Result<Role> {
        json_body(self.put("/role").json(role).send().await?).await
    }

    pub async fn list_permissions(&self) -> Result<Vec<PermissionInfo>> {
        json_body(self.get("/permissions").send().await?).await
    }

    pub async fn list_locations(&self) -> Result<Vec<Location>> {
        json_body(self.get("/locations").send().await?).await
    }

    pub async fn create_location(&self, input: &LocationInput) -> Result<Location> {
        json_body(self.post("/locations").json(input).send().await?).await
    }

    pub async fn update_location(&self, id: &str, input: &LocationInput) -> Result<Location> {
        let path = format!("/locations/{}", id);
        json_body(self.put(&path).json(input).send().await?).await
    }

    pub async fn delete_location(&self, id: &str) -> Result<()> {
        let path = format!("/locations/{}", id);
        no_body(self.delete(&path).send().await?).await
    }

    pub async fn list_task_types(&self) -> Result<Vec<TaskType>> {
        json_body(self.get("/task-types").send().await?).await
    }

    pub async fn list_notifications(&self) -> Result<Vec<Notification>> {
        json_body(self.get("/notifications").send().await?).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<()> {
        let path = format!("/notifications/{}/read", id);
        no_body(self.put(&path).send().await?).await
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(request)
            .send()
            .await?;
        json_body(response).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        no_body(response).await
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url("/auth/verify"))
            .json(request)
            .send()
            .await?;
        no_body(response).await
    }

    async fn resend_otp(&self, request: &ResendOtpRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url("/auth/resend-otp"))
            .json(request)
            .send()
            .await?;
        no_body(response).await
    }

    async fn change_password(&self, request: &ChangePasswordRequest) -> Result<()> {
        no_body(self.post("/auth/change-password").json(request).send().await?).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .client
            .post(self.url("/auth/refresh-token"))
            .json(&body)
            .send()
            .await?;
        json_body(response).await
    }

    async fn logout(&self) -> Result<()> {
        no_body(self.post("/auth/logout").send().await?).await
    }

    async fn switch_workspace(&self, workspace: &WorkspaceRef) -> Result<TokenPair> {
        let path = format!("/auth/switch/{}/{}", workspace.kind, workspace.id);
        json_body(self.post(&path).send().await?).await
    }

    async fn enterprise_permissions(&self, user_id: &str) -> Result<PermissionGrant> {
        let path = format!("/permissions/enterprise/{}", user_id);
        json_body(self.get(&path).send().await?).await
    }

    async fn project_permissions(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<PermissionGrant> {
        let path = format!("/permissions/project/{}", user_id);
        let response = self
            .get(&path)
            .query(&[("projectId", project_id)])
            .send()
            .await?;
        json_body(response).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

async fn no_body(response: Response) -> Result<()> {
    check_status(response).await?;
    Ok(())
}
