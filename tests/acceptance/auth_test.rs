mod common;

use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;

use common::{file_harness, grant, harness, FakeBackend};
use eventma::api::ApiClient;
use eventma::context::AppContext;
use eventma::controller::{AuthState, Route};
use eventma::models::{LocationInput, Role};
use eventma::notify::RecordingNotifier;
use eventma::permissions::PermissionScope;
use eventma::session::{keys, SessionStore, WorkspaceRef, WorkspaceType, SESSION_KEYS};
use eventma::storage::{MemoryStorage, SessionStorage};
use eventma::Error;

fn api_context(server_url: &str) -> (Arc<MemoryStorage>, AppContext, ApiClient) {
    let storage = Arc::new(MemoryStorage::new());
    let store = SessionStore::new(storage.clone());
    let api = ApiClient::new(server_url, 5, store.clone()).unwrap();
    let ctx = AppContext::with_store(
        store,
        Arc::new(api.clone()),
        Arc::new(RecordingNotifier::new()),
    );
    (storage, ctx, api)
}

#[tokio::test]
async fn test_login_switch_logout_against_api() {
    let mut server = mockito::Server::new_async().await;

    let login = server
        .mock("POST", "/auth/login")
        .match_body(Matcher::PartialJson(json!({
            "email": "dana@example.com",
            "password": "correct-horse",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"accessToken":"a1","refreshToken":"r1",
                "user":{"id":"u-1","name":"Dana Planner","email":"dana@example.com"}}"#,
        )
        .create_async()
        .await;
    let switch = server
        .mock("POST", "/auth/switch/enterprise/42")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accessToken":"a2","refreshToken":"r2"}"#)
        .create_async()
        .await;
    let permissions = server
        .mock("GET", "/permissions/enterprise/u-1")
        .match_header("authorization", "Bearer a2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"permissions":["location.view"],"isOwner":false}"#)
        .create_async()
        .await;
    let logout = server
        .mock("POST", "/auth/logout")
        .with_status(500)
        .create_async()
        .await;

    let (storage, mut ctx, _api) = api_context(&server.url());

    let user = eventma::auth::login(&mut ctx, "dana@example.com", "correct-horse", true)
        .await
        .unwrap();
    assert_eq!(user.id, "u-1");
    assert_eq!(ctx.auth_state(), AuthState::Authenticated);
    assert_eq!(ctx.check("/signin").redirect, Some(Route::SelectWorkspace));
    assert!(storage.get(keys::DEVICE_ID).is_some());

    let workspace = WorkspaceRef::new("42", WorkspaceType::Enterprise);
    ctx.switcher().switch(&workspace, None).await.unwrap();
    assert_eq!(storage.get(keys::TOKEN).as_deref(), Some("a2"));
    assert_eq!(
        ctx.check("/signin").redirect.unwrap().path(),
        "/enterprise/42/dashboard"
    );
    assert_eq!(ctx.check("/enterprise/42/events").redirect, None);

    eventma::auth::logout(&mut ctx).await.unwrap();

    login.assert_async().await;
    switch.assert_async().await;
    permissions.assert_async().await;
    logout.assert_async().await;

    for key in SESSION_KEYS {
        assert_eq!(storage.get(key), None, "{} should be cleared", key);
    }
    assert_eq!(
        storage.get(keys::REMEMBERED_EMAIL).as_deref(),
        Some("dana@example.com")
    );
    assert!(storage.get(keys::DEVICE_ID).is_some());
    assert!(ctx.permissions.snapshot().is_empty());
    assert_eq!(ctx.auth_state(), AuthState::Unauthenticated);
    assert_eq!(ctx.check("/").redirect, Some(Route::SignIn));
}

#[tokio::test]
async fn test_login_sends_persisted_device_id() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/login")
        .match_body(Matcher::PartialJson(json!({ "deviceId": "device-7" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"accessToken":"a1","refreshToken":"r1",
                "user":{"id":"u-1","email":"dana@example.com"}}"#,
        )
        .create_async()
        .await;

    let (storage, mut ctx, _api) = api_context(&server.url());
    storage.set(keys::DEVICE_ID, "device-7").unwrap();

    let user = eventma::auth::login(&mut ctx, "dana@example.com", "pw", false)
        .await
        .unwrap();
    assert_eq!(user.name, "");
    assert_eq!(storage.get(keys::REMEMBERED_EMAIL), None);
}

#[tokio::test]
async fn test_logout_clears_keys_from_any_state() {
    let mut h = harness(FakeBackend {
        fail_logout: true,
        ..Default::default()
    });
    h.storage.set(keys::USER, "{corrupted").unwrap();
    h.storage.set(keys::LAST_WORKSPACE_TYPE, "supplier").unwrap();
    h.storage.set(keys::CURRENT_WORKSPACE, "[]").unwrap();

    eventma::auth::logout(&mut h.ctx).await.unwrap();
    for key in SESSION_KEYS {
        assert_eq!(h.storage.get(key), None);
    }
    assert_eq!(FakeBackend::calls(&h.backend.logout_calls), 0);

    h.storage.set(keys::TOKEN, "t").unwrap();
    h.storage.set(keys::REFRESH_TOKEN, "r").unwrap();
    eventma::auth::logout(&mut h.ctx).await.unwrap();
    assert!(h.storage.is_empty());
    assert_eq!(FakeBackend::calls(&h.backend.logout_calls), 1);
}

#[tokio::test]
async fn test_wrong_password_keeps_session_empty() {
    let mut h = harness(FakeBackend::default());

    let result = eventma::auth::login(&mut h.ctx, "dana@example.com", "wrong", true).await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(h.storage.get(keys::TOKEN), None);
    assert_eq!(h.storage.get(keys::REMEMBERED_EMAIL), None);
    assert_eq!(h.notifier.errors(), vec!["Invalid email or password"]);
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_api() {
    let mut h = harness(FakeBackend::default());

    assert!(matches!(
        eventma::auth::login(&mut h.ctx, "not-an-email", "pw", false).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        eventma::auth::register(&h.ctx, "Dana", "dana@example.com", "short").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        eventma::auth::verify(&h.ctx, "dana@example.com", "12a4").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        eventma::auth::change_password(&mut h.ctx, "same-password", "same-password").await,
        Err(Error::Validation(_))
    ));
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_unauthorized_response_forces_relogin() {
    let mut h = harness(FakeBackend::default());
    h.storage.set(keys::TOKEN, "stale").unwrap();
    h.storage.set(keys::REFRESH_TOKEN, "stale-refresh").unwrap();
    h.storage.set(keys::LAST_WORKSPACE_ID, "4").unwrap();
    h.storage.set(keys::LAST_WORKSPACE_TYPE, "enterprise").unwrap();
    assert_eq!(h.ctx.check("/").state, AuthState::Authenticated);

    let result =
        eventma::auth::change_password(&mut h.ctx, "current-password", "new-password").await;

    assert!(matches!(result, Err(Error::Unauthorized)));
    for key in SESSION_KEYS {
        assert_eq!(h.storage.get(key), None);
    }
    assert_eq!(h.ctx.auth_state(), AuthState::Unauthenticated);
    assert_eq!(h.ctx.check("/enterprise/4/dashboard").redirect, Some(Route::SignIn));
}

#[tokio::test]
async fn test_failed_refresh_keeps_tokens() {
    let mut h = harness(FakeBackend::default());
    h.storage.set(keys::TOKEN, "t").unwrap();
    h.storage.set(keys::REFRESH_TOKEN, "r").unwrap();

    assert!(eventma::auth::refresh(&mut h.ctx).await.is_err());
    assert_eq!(h.storage.get(keys::TOKEN).as_deref(), Some("t"));
    assert_eq!(h.storage.get(keys::REFRESH_TOKEN).as_deref(), Some("r"));
}

#[tokio::test]
async fn test_refresh_replaces_tokens() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/auth/refresh-token")
        .match_body(Matcher::Json(json!({ "refreshToken": "r1" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accessToken":"a2","refreshToken":"r2"}"#)
        .create_async()
        .await;

    let (storage, mut ctx, _api) = api_context(&server.url());
    storage.set(keys::TOKEN, "a1").unwrap();
    storage.set(keys::REFRESH_TOKEN, "r1").unwrap();

    eventma::auth::refresh(&mut ctx).await.unwrap();

    mock.assert_async().await;
    assert_eq!(storage.get(keys::TOKEN).as_deref(), Some("a2"));
    assert_eq!(storage.get(keys::REFRESH_TOKEN).as_deref(), Some("r2"));
}

#[tokio::test]
async fn test_resource_listing_through_intercept() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/locations")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":"l-1","name":"Main Hall","capacity":300}]"#)
        .create_async()
        .await;
    server
        .mock("GET", "/notifications")
        .with_status(401)
        .create_async()
        .await;

    let (storage, mut ctx, api) = api_context(&server.url());
    storage.set(keys::TOKEN, "a1").unwrap();

    let result = api.list_locations().await;
    let locations = ctx.intercept(result).unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].capacity, Some(300));
    assert_eq!(storage.get(keys::TOKEN).as_deref(), Some("a1"));

    let result = api.list_notifications().await;
    assert!(matches!(ctx.intercept(result), Err(Error::Unauthorized)));
    assert_eq!(storage.get(keys::TOKEN), None);
}

#[tokio::test]
async fn test_logout_ends_session_even_when_storage_fails() {
    let mut h = file_harness(FakeBackend {
        enterprise: Some(grant(&["role.view"], false)),
        ..Default::default()
    });
    eventma::auth::login(&mut h.ctx, "dana@example.com", "correct-horse", false)
        .await
        .unwrap();
    let workspace = WorkspaceRef::new("1", WorkspaceType::Enterprise);
    h.ctx.switcher().switch(&workspace, None).await.unwrap();
    assert!(h
        .ctx
        .permissions
        .has_permission("role.view", PermissionScope::Enterprise));

    h.break_storage();
    let result = eventma::auth::logout(&mut h.ctx).await;

    assert!(matches!(result, Err(Error::Storage(_))));
    for key in SESSION_KEYS {
        assert_eq!(h.storage.get(key), None, "{} should be cleared", key);
    }
    assert!(h.ctx.permissions.snapshot().is_empty());
    assert_eq!(h.ctx.auth_state(), AuthState::Unauthenticated);
    assert_eq!(
        h.ctx.check("/enterprise/1/dashboard").redirect,
        Some(Route::SignIn)
    );
}

#[tokio::test]
async fn test_unauthorized_survives_failed_storage_clear() {
    let mut h = file_harness(FakeBackend::default());
    h.storage.set(keys::TOKEN, "stale").unwrap();
    h.storage.set(keys::REFRESH_TOKEN, "stale-refresh").unwrap();
    assert_eq!(h.ctx.check("/").state, AuthState::Authenticated);

    h.break_storage();
    let result: eventma::Result<()> = h.ctx.intercept(Err(Error::Unauthorized));

    assert!(matches!(result, Err(Error::Unauthorized)));
    assert_eq!(h.storage.get(keys::TOKEN), None);
    assert_eq!(h.ctx.auth_state(), AuthState::Unauthenticated);
    assert_eq!(
        h.notifier.errors(),
        vec!["Your session has expired. Please sign in again."]
    );
}

#[tokio::test]
async fn test_role_and_permission_catalog_through_intercept() {
    let mut server = mockito::Server::new_async().await;
    let catalog = server
        .mock("GET", "/permissions")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"code":"role.edit","name":"Edit roles","scope":"enterprise"},
                {"code":"task.create"}]"#,
        )
        .create_async()
        .await;
    let update = server
        .mock("PUT", "/role")
        .match_header("authorization", "Bearer a1")
        .match_body(Matcher::PartialJson(json!({
            "id": "r-1",
            "name": "Coordinator",
            "permissions": ["role.edit", "task.create"],
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"r-1","name":"Coordinator","permissions":["role.edit","task.create"]}"#)
        .create_async()
        .await;

    let (storage, mut ctx, api) = api_context(&server.url());
    storage.set(keys::TOKEN, "a1").unwrap();

    let result = api.list_permissions().await;
    let permissions = ctx.intercept(result).unwrap();
    assert_eq!(permissions.len(), 2);
    assert_eq!(permissions[0].scope.as_deref(), Some("enterprise"));
    assert_eq!(permissions[1].name, "");
    assert_eq!(permissions[1].scope, None);

    let role = Role {
        id: "r-1".to_string(),
        name: "Coordinator".to_string(),
        permissions: vec!["role.edit".to_string(), "task.create".to_string()],
    };
    let result = api.update_role(&role).await;
    let updated = ctx.intercept(result).unwrap();
    assert_eq!(updated.permissions.len(), 2);

    catalog.assert_async().await;
    update.assert_async().await;
    assert_eq!(storage.get(keys::TOKEN).as_deref(), Some("a1"));
}

#[tokio::test]
async fn test_location_update_and_rejected_token() {
    let mut server = mockito::Server::new_async().await;
    let update = server
        .mock("PUT", "/locations/l-1")
        .match_body(Matcher::Json(json!({ "name": "Main Hall", "capacity": 450 })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"l-1","name":"Main Hall","capacity":450}"#)
        .create_async()
        .await;
    server
        .mock("PUT", "/locations/l-2")
        .with_status(401)
        .create_async()
        .await;

    let (storage, mut ctx, api) = api_context(&server.url());
    storage.set(keys::TOKEN, "a1").unwrap();

    let input = LocationInput {
        name: "Main Hall".to_string(),
        address: None,
        capacity: Some(450),
    };
    let result = api.update_location("l-1", &input).await;
    let location = ctx.intercept(result).unwrap();
    update.assert_async().await;
    assert_eq!(location.capacity, Some(450));

    let result = api.update_location("l-2", &input).await;
    assert!(matches!(ctx.intercept(result), Err(Error::Unauthorized)));
    assert_eq!(storage.get(keys::TOKEN), None);
    assert_eq!(ctx.auth_state(), AuthState::Unauthenticated);
}
