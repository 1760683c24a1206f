mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{app_state, bearer, topic_template, wait_terminal, MockProvider};
use forge::api::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(state: &AppState) -> Router {
    create_router(state.clone(), &[])
}

fn request(method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, bearer(user));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app(state).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(state, req).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_template(state: &AppState, user: &str, body: Value) -> String {
    let (status, value) = send_json(
        state,
        request(Method::POST, "/api/v1/templates", Some(user), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", value);
    value["template"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let state = app_state(MockProvider::new("ok"));
    let (status, body) = send_json(&state, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) =
        send_json(&state, request(Method::GET, "/api/v1/system/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "memory");
}

#[tokio::test]
async fn test_requests_without_valid_token_are_rejected() {
    let state = app_state(MockProvider::new("ok"));

    let (status, body) =
        send_json(&state, request(Method::GET, "/api/v1/templates", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let req = Request::builder()
        .uri("/api/v1/history")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_json(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/v1/history")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_json(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_template_crud() {
    let state = app_state(MockProvider::new("ok"));
    let id = create_template(&state, "alice", topic_template()).await;

    let (status, body) = send_json(
        &state,
        request(Method::GET, &format!("/api/v1/templates/{}", id), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ideas");
    assert_eq!(body["owner_id"], "alice");

    let (status, body) = send_json(
        &state,
        request(
            Method::PUT,
            &format!("/api/v1/templates/{}", id),
            Some("bob"),
            Some(json!({"name": "Stolen"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send_json(
        &state,
        request(
            Method::PUT,
            &format!("/api/v1/templates/{}", id),
            Some("alice"),
            Some(json!({"name": "Renamed"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["template"]["name"], "Renamed");

    let (status, body) = send_json(
        &state,
        request(Method::GET, "/api/v1/templates?limit=5", Some("bob"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["limit"], 5);

    let (status, _) = send(
        &state,
        request(Method::DELETE, &format!("/api/v1/templates/{}", id), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send_json(
        &state,
        request(Method::GET, &format!("/api/v1/templates/{}", id), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_template_is_a_bad_request() {
    let state = app_state(MockProvider::new("ok"));
    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/templates",
            Some("alice"),
            Some(json!({"name": "x", "user_prompt": "{{ broken "})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap().starts_with("Validation failed: "));
}

#[tokio::test]
async fn test_validate_and_preview() {
    let state = app_state(MockProvider::new("ok"));

    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/templates/validate",
            Some("alice"),
            Some(json!({"name": "x", "user_prompt": "Hi {{ who }}"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["warnings"].as_array().unwrap().len(), 1);

    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/templates/preview",
            Some("alice"),
            Some(json!({
                "template": {
                    "name": "x",
                    "user_prompt": "Generate {{count}} items about {{topic}}.",
                    "variables": {"count": {"type": "number", "default": 5}, "topic": {"type": "string"}}
                },
                "variables": {"topic": "AI"}
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_prompt"], "Generate 5 items about AI.");

    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/templates/preview",
            Some("alice"),
            Some(json!({"template": {"name": "x", "user_prompt": "{{ missing }}"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_generation_lifecycle_over_http() {
    let state = app_state(MockProvider::new("{\"name\": \"n{n}\", \"age\": 3{n}}"));
    let template_id = create_template(
        &state,
        "alice",
        json!({
            "name": "People",
            "user_prompt": "Person {{index}}",
            "output_schema": {"type": "object"}
        }),
    )
    .await;

    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/generate",
            Some("alice"),
            Some(json!({"template_id": template_id, "provider": "mock", "model": "m", "count": 2})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("gen_"));

    let job = wait_terminal(&state, "alice", &job_id).await;
    assert_eq!(job.status, forge::db::models::JobStatus::Completed);

    let (status, body) = send_json(
        &state,
        request(Method::GET, &format!("/api/v1/generate/{}/result", job_id), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"], 100);
    assert_eq!(body["results"], json!([{"name": "n1", "age": 31}, {"name": "n2", "age": 32}]));
    assert!(body.get("template").is_none());

    let response = app(&state)
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/generate/{}/export?format=csv", job_id),
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"generation_{}.csv\"", job_id).as_str()
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"age,name\r\n31,n1\r\n32,n2\r\n");

    let (status, _) = send(
        &state,
        request(
            Method::GET,
            &format!("/api/v1/generate/{}/export?format=docx", job_id),
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_json(
        &state,
        request(Method::DELETE, &format!("/api/v1/generate/{}", job_id), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot cancel completed generation");

    let (status, _) = send_json(
        &state,
        request(Method::GET, &format!("/api/v1/generate/{}", job_id), Some("bob"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(
        &state,
        request(Method::GET, "/api/v1/history?status=completed", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["job_id"], job_id.as_str());
}

#[tokio::test]
async fn test_generate_validation_errors() {
    let state = app_state(MockProvider::new("ok"));
    let template_id = create_template(&state, "alice", topic_template()).await;

    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/generate",
            Some("alice"),
            Some(json!({"template_id": template_id, "provider": "mock", "model": "m"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed: missing required variable `topic`");

    let (status, _) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/generate",
            Some("alice"),
            Some(json!({"template_id": "nope", "provider": "mock", "model": "m"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &state,
        request(Method::GET, "/api/v1/history?limit=500", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_over_http() {
    let state = app_state(MockProvider::new("ok"));
    let template_id = create_template(&state, "alice", topic_template()).await;

    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/generate/batch",
            Some("alice"),
            Some(json!({"generations": [
                {"template_id": template_id, "provider": "mock", "model": "m", "variables": {"topic": "AI"}},
                {"template_id": "gone", "provider": "mock", "model": "m"},
                {"template_id": template_id, "provider": "mock"},
                {"template_id": template_id, "provider": "mock", "model": "m", "variables": {"topic": "ML"}}
            ]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 4);
    assert!(jobs[0]["job_id"].as_str().unwrap().starts_with("gen_"));
    assert_eq!(jobs[1], json!({"error": "Template gone not found", "template_id": "gone"}));
    assert_eq!(jobs[2]["template_id"], json!(template_id));
    assert!(jobs[2]["error"].as_str().unwrap().contains("missing field `model`"));
    assert!(jobs[3]["job_id"].as_str().unwrap().starts_with("gen_"));

    let (status, body) = send_json(&state, request(Method::GET, "/api/v1/history", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn test_provider_endpoints() {
    let state = app_state(MockProvider::new("ok"));

    let (status, body) =
        send_json(&state, request(Method::GET, "/api/v1/providers", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "mock");
    assert_eq!(body[0]["status"]["available"], true);

    let (status, body) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/providers/test",
            Some("alice"),
            Some(json!({"provider": "mock"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Successfully connected to Mock");

    let (status, _) = send_json(
        &state,
        request(
            Method::POST,
            "/api/v1/providers/test",
            Some("alice"),
            Some(json!({"provider": "nope"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &state,
        request(Method::GET, "/api/v1/providers/models/openai/gpt-4o", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
