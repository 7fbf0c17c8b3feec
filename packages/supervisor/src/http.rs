//! JSON/HTTP control plane.
//!
//! A thin adapter over the orchestrator: handlers check field presence,
//! translate to core operations, and map errors to status codes. Semantic
//! validation lives in the core. Non-2xx responses carry `{"error": ...}`.

use crate::error::SupervisorError;
use crate::orchestrator::Orchestrator;
use crate::types::{
    HeartbeatPayload, TaskPriority, TaskResult, TaskSubmission, Worker, WorkerStatus,
    DEFAULT_MAX_LOAD,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Error envelope returned by every non-2xx response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        let status = match err {
            SupervisorError::Validation { .. } | SupervisorError::QueueFull { .. } => {
                StatusCode::BAD_REQUEST
            }
            SupervisorError::WorkerNotFound { .. } | SupervisorError::TaskNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Build the control-plane router.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/workers/register", post(register_worker))
        .route("/workers/heartbeat", post(heartbeat))
        .route("/workers/{id}", delete(unregister_worker))
        .route("/workers", get(list_workers))
        .route("/tasks", post(submit_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/result", post(report_result))
        .route("/status", get(status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    id: Option<String>,
    name: Option<String>,
    endpoint: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    current_load: Option<u32>,
    max_load: Option<u32>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

async fn register_worker(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = req
        .id
        .ok_or_else(|| ApiError::bad_request("Missing required field: id"))?;
    let name = req
        .name
        .ok_or_else(|| ApiError::bad_request("Missing required field: name"))?;
    let endpoint = req
        .endpoint
        .ok_or_else(|| ApiError::bad_request("Missing required field: endpoint"))?;

    let worker = Worker::new(id, name, endpoint)
        .with_capabilities(req.capabilities)
        .with_max_load(req.max_load.unwrap_or(DEFAULT_MAX_LOAD))
        .with_current_load(req.current_load.unwrap_or(0))
        .with_metadata(req.metadata);

    let worker = orchestrator.register_worker(worker).await;
    Ok(Json(json!({ "success": true, "worker": worker })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatRequest {
    worker_id: Option<String>,
    status: Option<WorkerStatus>,
    current_load: Option<u32>,
    max_load: Option<u32>,
    #[serde(default)]
    capabilities: Option<Vec<String>>,
}

async fn heartbeat(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<Value>, ApiError> {
    let worker_id = req
        .worker_id
        .ok_or_else(|| ApiError::bad_request("Missing required field: workerId"))?;
    let status = req
        .status
        .ok_or_else(|| ApiError::bad_request("Missing required field: status"))?;

    let payload = HeartbeatPayload {
        worker_id: worker_id.clone(),
        status,
        current_load: req.current_load.unwrap_or(0),
        max_load: req.max_load.unwrap_or(DEFAULT_MAX_LOAD),
        capabilities: req.capabilities,
    };

    let worker = orchestrator
        .heartbeat(payload)
        .await
        .ok_or(SupervisorError::WorkerNotFound { worker_id })?;

    Ok(Json(json!({ "success": true, "worker": worker })))
}

async fn unregister_worker(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let removed = orchestrator.unregister_worker(&id).await;
    Json(json!({ "success": removed }))
}

async fn list_workers(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    let workers = orchestrator.registry().get_all().await;
    Json(json!({ "workers": workers }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    #[serde(rename = "type")]
    task_type: Option<String>,
    payload: Option<Value>,
    priority: Option<TaskPriority>,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
}

async fn submit_task(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Value>, ApiError> {
    let task_type = req
        .task_type
        .ok_or_else(|| ApiError::bad_request("Missing required field: type"))?;

    let task = orchestrator.submit_task(TaskSubmission {
        task_type,
        payload: req.payload.unwrap_or(Value::Null),
        priority: req.priority,
        timeout_ms: req.timeout_ms,
        max_retries: req.max_retries,
    })?;

    Ok(Json(json!({ "success": true, "task": task })))
}

async fn get_task(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = orchestrator.get_task(&id);
    let result = orchestrator.get_task_result(&id);

    if task.is_none() && result.is_none() {
        return Err(SupervisorError::TaskNotFound { task_id: id }.into());
    }

    let mut body = serde_json::Map::new();
    if let Some(task) = task {
        body.insert("task".into(), json!(task));
    }
    if let Some(result) = result {
        body.insert("result".into(), json!(result));
    }
    Ok(Json(Value::Object(body)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultRequest {
    worker_id: Option<String>,
    success: Option<bool>,
    result: Option<Value>,
    error: Option<String>,
    duration_ms: Option<u64>,
}

async fn report_result(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
    Json(req): Json<ResultRequest>,
) -> Result<Json<Value>, ApiError> {
    let worker_id = req
        .worker_id
        .ok_or_else(|| ApiError::bad_request("Missing required field: workerId"))?;
    let success = req
        .success
        .ok_or_else(|| ApiError::bad_request("Missing required field: success"))?;
    let duration_ms = req
        .duration_ms
        .ok_or_else(|| ApiError::bad_request("Missing required field: durationMs"))?;

    orchestrator.report_task_result(TaskResult {
        task_id: id,
        worker_id,
        success,
        result: req.result,
        error: req.error,
        duration_ms,
    });

    Ok(Json(json!({ "success": true })))
}

async fn status(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    let stats = orchestrator.stats().await;
    let health = orchestrator.worker_health().await;
    Json(json!({
        "workers": stats.workers,
        "tasks": stats.tasks,
        "health": health,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> (Arc<Orchestrator>, Router) {
        let config = SupervisorConfig {
            default_max_retries: 0,
            default_task_timeout_ms: 5_000,
            ..SupervisorConfig::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(config));
        let app = router(orchestrator.clone());
        (orchestrator, app)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_, app) = test_app();
        let (status, body) = call(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_requires_fields() {
        let (_, app) = test_app();
        let (status, body) = call(
            &app,
            "POST",
            "/workers/register",
            Some(json!({ "id": "w1" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("name"));
    }

    #[tokio::test]
    async fn test_register_defaults_max_load() {
        let (_, app) = test_app();
        let (status, body) = call(
            &app,
            "POST",
            "/workers/register",
            Some(json!({ "id": "w1", "name": "Worker", "endpoint": "http://h1" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["worker"]["maxLoad"], 10);
        assert_eq!(body["worker"]["status"], "online");
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_worker_is_404() {
        let (_, app) = test_app();
        let (status, body) = call(
            &app,
            "POST",
            "/workers/heartbeat",
            Some(json!({
                "workerId": "ghost",
                "status": "online",
                "currentLoad": 0,
                "maxLoad": 10,
                "capabilities": []
            })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_task_flow_over_http() {
        let (orchestrator, app) = test_app();

        let (status, _) = call(
            &app,
            "POST",
            "/workers/register",
            Some(json!({
                "id": "w1",
                "name": "Worker",
                "endpoint": "http://h1",
                "capabilities": ["chat"],
                "maxLoad": 2
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "POST",
            "/tasks",
            Some(json!({ "type": "chat", "payload": { "msg": "hi" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let task_id = body["task"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["task"]["status"], "pending");

        orchestrator.run_assignment_tick().await;

        let (status, body) = call(&app, "GET", &format!("/tasks/{task_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["status"], "assigned");
        assert_eq!(body["task"]["assignedTo"], "w1");

        let (status, _) = call(
            &app,
            "POST",
            &format!("/tasks/{task_id}/result"),
            Some(json!({
                "workerId": "w1",
                "success": true,
                "result": { "reply": "ok" },
                "durationMs": 42
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "GET", &format!("/tasks/{task_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("task").is_none());
        assert_eq!(body["result"]["success"], true);

        let (status, body) = call(&app, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tasks"]["completed"], 1);
        assert_eq!(body["workers"]["total"], 1);
        assert!(body["health"]["w1"].is_number());
    }

    #[tokio::test]
    async fn test_submit_requires_type() {
        let (_, app) = test_app();
        let (status, body) = call(&app, "POST", "/tasks", Some(json!({ "payload": {} }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("type"));
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let (_, app) = test_app();
        let (status, body) = call(&app, "GET", "/tasks/ghost", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_result_requires_fields() {
        let (_, app) = test_app();
        let (status, body) = call(
            &app,
            "POST",
            "/tasks/t1/result",
            Some(json!({ "workerId": "w1", "success": true })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("durationMs"));
    }

    #[tokio::test]
    async fn test_unregister_reports_existence() {
        let (orchestrator, app) = test_app();
        orchestrator
            .register_worker(Worker::new("w1", "Worker", "http://h1"))
            .await;

        let (status, body) = call(&app, "DELETE", "/workers/w1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = call(&app, "DELETE", "/workers/w1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_queue_full_is_400() {
        let config = SupervisorConfig {
            max_queue_size: 1,
            ..SupervisorConfig::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(config));
        let app = router(orchestrator);

        let submit = json!({ "type": "chat", "payload": {} });
        let (status, _) = call(&app, "POST", "/tasks", Some(submit.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "POST", "/tasks", Some(submit)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("full"));
    }
}
