use super::*;
use crate::NarrationService;
use crate::service::test_helpers::{MemoryStore, ScriptedSupplier, test_config, wait_until};
use crate::synthesis::JobStatus;
use crate::types::{OperationId, OperationState};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;


struct TestApp {
    router: Router,
    service: Arc<NarrationService>,
    store: Arc<MemoryStore>,
}

impl TestApp {
    async fn send(&self, request: Request) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn wait_for_state(&self, id: OperationId, state: OperationState) {
        wait_until(|| async {
            self.service
                .operation(id)
                .await
                .map(|r| r.state == state)
                .unwrap_or(false)
        })
        .await;
    }
}

/// Router over in-memory doubles, with the given API config tweaks
fn test_app_with(
    statuses: Vec<std::result::Result<JobStatus, crate::error::SupplierError>>,
    configure: impl FnOnce(&mut Config),
) -> TestApp {
    let supplier = Arc::new(ScriptedSupplier::with_statuses(statuses));
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config();
    configure(&mut config);

    let service = Arc::new(NarrationService::with_collaborators(
        config.clone(),
        supplier,
        store.clone(),
    ));
    let router = create_router(service.clone(), Arc::new(config));
    TestApp {
        router,
        service,
        store,
    }
}

fn test_app(
    statuses: Vec<std::result::Result<JobStatus, crate::error::SupplierError>>,
) -> TestApp {
    test_app_with(statuses, |_| {})
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let app = test_app(vec![]);

    let mut config = (*app.service.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let service = app.service.clone();
        let config = config.clone();
        async move { start_api_server(service, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server exited early");

    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = test_app_with(vec![], |config| {
        config.api.cors_enabled = true;
        config.api.cors_origins = vec!["*".to_string()];
    });

    let response = app
        .send(
            Request::builder()
                .uri("/api/status")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_cors_specific_origin() {
    let app = test_app_with(vec![], |config| {
        config.api.cors_origins = vec!["http://localhost:3000".to_string()];
    });

    let response = app
        .send(
            Request::builder()
                .uri("/api/status")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let app = test_app_with(vec![], |config| config.api.cors_enabled = false);

    let response = app
        .send(
            Request::builder()
                .uri("/api/status")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let enabled = test_app(vec![]);
    let response = enabled.get("/api-docs/openapi.json").await;
    assert_eq!(response.status(), StatusCode::OK);

    let disabled = test_app_with(vec![], |config| config.api.swagger_ui = false);
    let response = disabled.get("/api-docs/openapi.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = test_app(vec![]);
    let response = app.get("/api/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
