use super::*;
use crate::adapters::identity::auth_state_channel;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::{json, Value};
use smoker_core::ports::IdentityProvider;
use smoker_core::testing::{FakeTelemetry, MemoryStore};
use smoker_core::{
    watch_auth_state, GuardFailurePolicy, RoleCache, RouteGuard, SensorConfig,
    SensorManager, SensorType, SessionRecorder,
};
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::default());
    let role_cache = Arc::new(RoleCache::new());
    let auth_state = auth_state_channel();
    watch_auth_state(role_cache.clone(), auth_state.subscribe());

    let sensors = SensorManager::new(store.clone(), Arc::new(FakeTelemetry::failing()));
    sensors.register("pit", SensorType::Temperature, SensorConfig::new());

    let state = Arc::new(AppState {
        store: store.clone(),
        accounts: store.clone(),
        routes: Arc::new(app_routes()),
        role_cache: role_cache.clone(),
        guard: Arc::new(RouteGuard::new(
            role_cache,
            store.clone(),
            GuardFailurePolicy::FailOpen,
        )),
        sensors,
        sessions: SessionRecorder::new(store.clone()),
        auth_state,
    });
    TestApp {
        router: router(state.clone(), None),
        state,
        store,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Registers through the public endpoint and returns the `Cookie` header value.
    async fn register(&self, path: &str, email: &str) -> String {
        let response = self
            .send("POST", path, None, Some(json!({ "email": email, "password": "applewood" })))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        session_from(&response)
    }
}

fn session_from(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_and_unknown_paths_redirect_to_login() {
    let app = test_app();

    for path in ["/", "/does/not/exist"] {
        let response = app.send("GET", path, None, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
    }
}

#[tokio::test]
async fn protected_route_without_session_redirects_to_login() {
    let app = test_app();

    let response = app.send("GET", "/admin-dashboard", None, None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn roles_are_sent_to_their_own_dashboard() {
    let app = test_app();
    let admin = app.register("/register", "admin@example.com").await;
    let user = app.register("/user-register", "user@example.com").await;

    let response = app.send("GET", "/admin-dashboard", Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["sensors"]["temperature"], json!(0.0));
    assert_eq!(body["activeSession"], Value::Null);

    let response = app.send("GET", "/user-dashboard", Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin-dashboard");

    let response = app
        .send("POST", "/admin-dashboard/sessions", Some(&user), Some(json!({ "duration": 60 })))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user-dashboard");
}

#[tokio::test]
async fn login_returns_role_and_landing_page() {
    let app = test_app();
    app.register("/user-register", "user@example.com").await;

    let response = app
        .send(
            "POST",
            "/login",
            None,
            Some(json!({ "email": "user@example.com", "password": "applewood" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["role"], json!("user"));
    assert_eq!(body["dashboard"], json!("/user-dashboard"));

    let response = app
        .send(
            "POST",
            "/login",
            None,
            Some(json!({ "email": "user@example.com", "password": "oak" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_runs_a_session_to_completion() {
    let app = test_app();
    let admin = app.register("/register", "admin@example.com").await;

    let response = app
        .send(
            "POST",
            "/admin-dashboard/sessions",
            Some(&admin),
            Some(json!({ "duration": 1800, "adminId": "admin1", "meat": "pork shoulder" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = json_body(response).await;
    assert_eq!(session["status"], json!("active"));
    assert_eq!(session["targetDuration"], json!(1800));
    assert_eq!(session["startedBy"], json!("admin1"));
    assert_eq!(session["meat"], json!("pork shoulder"));
    assert_eq!(session["temperatureData"], json!([]));
    let id = session["id"].as_str().unwrap().to_string();

    let response = app
        .send(
            "PATCH",
            &format!("/admin-dashboard/sessions/{}", id),
            Some(&admin),
            Some(json!({ "currentDuration": 300 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .send("POST", &format!("/admin-dashboard/sessions/{}/end", id), Some(&admin), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .send("GET", "/admin-dashboard/sessions/history", Some(&admin), None)
        .await;
    let history = json_body(response).await;
    assert_eq!(history[0]["id"], json!(id));
    assert_eq!(history[0]["status"], json!("completed"));
    assert_eq!(history[0]["currentDuration"], json!(300));
}

#[tokio::test]
async fn session_write_failure_is_reported() {
    let app = test_app();
    let admin = app.register("/register", "admin@example.com").await;
    app.send("GET", "/admin-dashboard", Some(&admin), None).await;
    app.store.fail_writes(true);

    let response = app
        .send("POST", "/admin-dashboard/sessions", Some(&admin), Some(json!({ "duration": 60 })))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn orphaned_account_is_signed_out() {
    let app = test_app();
    let user = app.register("/user-register", "user@example.com").await;
    let uid = app
        .state
        .identity_for(user.strip_prefix("session="))
        .await
        .current_user()
        .unwrap()
        .uid;
    app.store.remove_role(&uid);

    let response = app.send("GET", "/user-dashboard", Some(&user), None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(session_from(&response).ends_with("session="));
    let response = app.send("GET", "/user-dashboard", Some(&user), None).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn logout_clears_the_role_cache() {
    let app = test_app();
    let admin = app.register("/register", "admin@example.com").await;
    app.send("GET", "/admin-dashboard", Some(&admin), None).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(app.state.role_cache.len(), 1);

    let response = app.send("POST", "/logout", Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(app.state.role_cache.is_empty());
    let response = app.send("GET", "/admin-dashboard", Some(&admin), None).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn junk_cookie_does_not_clear_the_role_cache() {
    let app = test_app();
    let admin = app.register("/register", "admin@example.com").await;
    app.send("GET", "/admin-dashboard", Some(&admin), None).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = app
        .send("GET", "/admin-dashboard", Some("session=garbage"), None)
        .await;
    assert_eq!(location(&response), "/login");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(app.state.role_cache.len(), 1);
}

#[tokio::test]
async fn sensor_endpoints_serve_registry_and_history() {
    let app = test_app();
    let user = app.register("/user-register", "user@example.com").await;
    app.state.sensors.update_reading("pit", 22.5).await;

    let response = app.send("GET", "/user-dashboard/sensors/pit", Some(&user), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["reading"], json!(22.5));

    let response = app.send("GET", "/user-dashboard/sensors/nope", Some(&user), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(
            "GET",
            "/user-dashboard/sensors/pit/history?start=2000-01-01T00:00:00Z&end=2100-01-01T00:00:00Z",
            Some(&user),
            None,
        )
        .await;
    let history = json_body(response).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["type"], json!("temperature"));

    let response = app.send("GET", "/user-dashboard/sensors/latest", Some(&user), None).await;
    let latest = json_body(response).await;
    assert_eq!(latest["temperature"], json!(22.5));
    assert_eq!(latest["history"]["temperature"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn openapi_document_is_public() {
    let app = test_app();
    let response = app.send("GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/admin-dashboard/sessions"].is_object());
}
