//! HttpTaskApi against a local axum backend.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use taskdeck_core::domain::{
    ErrorKind, ListQuery, LogLevel, LogQuery, SearchFilter, SubmitRequest, TaskId, TaskStats,
    TaskStatus,
};
use taskdeck_core::impls::HttpTaskApi;
use taskdeck_core::ports::TaskApi;
use url::Url;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr) -> HttpTaskApi {
    let base = Url::parse(&format!("http://{addr}")).unwrap();
    HttpTaskApi::new(base, None).unwrap()
}

fn task_json(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "task_type": "general_agent_task",
        "created_at": "2024-05-01 09:00:00",
    })
}

#[tokio::test]
async fn list_decodes_tasks_and_forwards_paging() {
    let app = Router::new().route(
        "/tasks/list/json",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            assert_eq!(q.get("limit").map(String::as_str), Some("25"));
            assert_eq!(q.get("offset").map(String::as_str), Some("50"));
            Json(json!([task_json("t2", "RUNNING"), task_json("t1", "PAUSED")]))
        }),
    );
    let api = client(serve(app).await);

    let tasks = api.list_tasks(ListQuery::new(25, 50)).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, TaskId::new("t2"));
    assert_eq!(tasks[0].status, TaskStatus::Running);
    assert_eq!(tasks[1].status, TaskStatus::Unknown);
}

#[tokio::test]
async fn list_not_found_is_empty() {
    let app = Router::new().route(
        "/tasks/list/json",
        get(|| async { (StatusCode::NOT_FOUND, Json(json!({"detail": "No tasks"}))) }),
    );
    let api = client(serve(app).await);

    assert!(api.list_tasks(ListQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn stats_not_implemented_degrades_to_zeros() {
    let app = Router::new().route(
        "/tasks/stats/json",
        get(|| async {
            (
                StatusCode::NOT_IMPLEMENTED,
                Json(json!({"detail": "Statistics functionality not yet implemented"})),
            )
        }),
    );
    let api = client(serve(app).await);

    assert_eq!(api.get_task_stats().await.unwrap(), TaskStats::zero());
}

#[tokio::test]
async fn stats_accept_either_total_spelling() {
    let app = Router::new().route(
        "/tasks/stats/json",
        get(|| async {
            Json(json!({"PENDING": 1, "RUNNING": 1, "COMPLETED": 5, "FAILED": 2, "TOTAL": 9}))
        }),
    );
    let api = client(serve(app).await);

    let stats = api.get_task_stats().await.unwrap();
    assert_eq!(stats.total, 9);
    assert_eq!(stats.count(TaskStatus::Completed), 5);
}

#[tokio::test]
async fn submit_validation_failure_is_flattened() {
    let app = Router::new().route(
        "/tasks/submit",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": [
                    {"loc": ["body", "task_instructions"], "msg": "field required", "type": "value_error.missing"},
                    {"loc": ["body", "context_urls", 0], "msg": "invalid URL", "type": "value_error"}
                ]})),
            )
        }),
    );
    let api = client(serve(app).await);

    let err = api
        .submit_task(&SubmitRequest::new("Find the pricing page"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.status_code(), Some(422));
    assert_eq!(
        err.detail(),
        Some("body.task_instructions - field required; body.context_urls.0 - invalid URL")
    );
}

#[tokio::test]
async fn submit_sends_payload_and_decodes_response() {
    let app = Router::new().route(
        "/tasks/submit",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["task_instructions"], "Find the pricing page");
            assert_eq!(body["context_urls"], json!(["https://acme.example"]));
            assert_eq!(body["agent_config"]["max_steps"], 15);
            Json(json!({"id": "new-1", "status": "PENDING", "message": "Agent task accepted and queued."}))
        }),
    );
    let api = client(serve(app).await);

    let request = SubmitRequest::new("Find the pricing page")
        .with_url("https://acme.example")
        .with_config("max_steps", json!(15));
    let response = api.submit_task(&request).await.unwrap();
    assert_eq!(response.id, TaskId::new("new-1"));
    assert_eq!(response.status, TaskStatus::Pending);
}

#[tokio::test]
async fn client_side_validation_skips_the_network() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/tasks/submit",
            post(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({"id": "x", "status": "PENDING"}))
            }),
        )
        .with_state(Arc::clone(&hits));
    let api = client(serve(app).await);

    let err = api.submit_task(&SubmitRequest::new("short")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.status_code(), None);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_and_delete_not_implemented_are_feature_unavailable() {
    let app = Router::new()
        .route(
            "/tasks/search/json",
            get(|| async { (StatusCode::NOT_IMPLEMENTED, Json(json!({"detail": "nope"}))) }),
        )
        .route(
            "/tasks/:id",
            delete(|| async { (StatusCode::NOT_IMPLEMENTED, Json(json!({"detail": "nope"}))) }),
        );
    let api = client(serve(app).await);

    let err = api
        .search_tasks(&SearchFilter::default().with_status(TaskStatus::Failed))
        .await
        .unwrap_err();
    assert!(err.is_feature_unavailable());

    let err = api.delete_task(&TaskId::new("t1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FeatureUnavailable);
}

#[tokio::test]
async fn search_sends_normalized_filter() {
    let app = Router::new().route(
        "/tasks/search/json",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            assert_eq!(q.get("status").map(String::as_str), Some("FAILED"));
            assert_eq!(q.get("days").map(String::as_str), Some("7"));
            assert!(!q.contains_key("task_type"));
            Json(json!([task_json("t9", "FAILED")]))
        }),
    );
    let api = client(serve(app).await);

    let filter = SearchFilter {
        status: Some("failed".into()),
        task_type: None,
        days: Some(7),
    };
    let hits = api.search_tasks(&filter).await.unwrap();
    assert_eq!(hits[0].status, TaskStatus::Failed);
}

#[tokio::test]
async fn detail_includes_logs_and_unknown_id_is_not_found() {
    let app = Router::new().route(
        "/tasks/:id/json",
        get(|Path(id): Path<String>| async move {
            if id != "t1" {
                return (StatusCode::NOT_FOUND, Json(json!({"detail": "Task ID not found"})));
            }
            let mut task = task_json("t1", "COMPLETED");
            task["started_at"] = json!("2024-05-01T09:00:05Z");
            task["completed_at"] = json!("2024-05-01T09:01:00+00:00");
            task["result_data"] = json!({"answer": 42});
            task["logs"] = json!([
                {"timestamp": "2024-05-01 09:00:00", "level": "INFO", "message": "submitted"},
                {"timestamp": "2024-05-01 09:01:00", "level": "WARN", "message": "slow page"}
            ]);
            (StatusCode::OK, Json(task))
        }),
    );
    let api = client(serve(app).await);

    let task = api.get_task_details(&TaskId::new("t1")).await.unwrap();
    assert!(task.is_terminal());
    assert!(task.check_invariants().is_ok());
    assert_eq!(task.logs.len(), 2);
    assert_eq!(task.logs[1].level, LogLevel::Warning);

    let err = api.get_task_details(&TaskId::new("nope")).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.detail(), Some("Task ID not found"));
}

#[tokio::test]
async fn logs_forward_level_and_limit() {
    let app = Router::new().route(
        "/tasks/:id/logs/json",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            assert_eq!(q.get("level").map(String::as_str), Some("ERROR"));
            assert_eq!(q.get("limit").map(String::as_str), Some("10"));
            Json(json!([
                {"timestamp": "2024-05-01T09:00:00Z", "level": "ERROR", "message": "boom"}
            ]))
        }),
    );
    let api = client(serve(app).await);

    let query = LogQuery {
        level: Some(LogLevel::Error),
        limit: Some(10),
    };
    let logs = api.get_task_logs(&TaskId::new("t1"), query).await.unwrap();
    assert_eq!(logs[0].message, "boom");
}

#[tokio::test]
async fn cancel_and_retry_responses() {
    let app = Router::new()
        .route(
            "/tasks/:id/cancel",
            post(|| async { Json(json!({"status": "cancellation_requested", "message": "marked as failed"})) }),
        )
        .route(
            "/tasks/:id/retry",
            post(|Path(id): Path<String>| async move {
                Json(json!({"status": "retry_queued", "new_task_id": format!("retry_{id}")}))
            }),
        );
    let api = client(serve(app).await);

    let cancel = api.cancel_task(&TaskId::new("t1")).await.unwrap();
    assert_eq!(cancel.status, "cancellation_requested");

    let retry = api.retry_task(&TaskId::new("t1")).await.unwrap();
    assert_eq!(retry.new_task_id, TaskId::new("retry_t1"));
    assert_eq!(retry.message, None);
}

#[tokio::test]
async fn server_error_keeps_status_and_detail() {
    let app = Router::new().route(
        "/tasks/:id/cancel",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": "Task cannot be cancelled, status is COMPLETED."})),
            )
        }),
    );
    let api = client(serve(app).await);

    let err = api.cancel_task(&TaskId::new("t1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.status_code(), Some(400));
    assert!(err.user_message().contains("status is COMPLETED"));
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr).get_task_stats().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkUnreachable);
    assert_eq!(err.status_code(), None);
    assert!(err.detail().unwrap().contains(&addr.to_string()));
}

#[tokio::test]
async fn undecodable_success_body_is_server_error() {
    let app = Router::new().route("/tasks/list/json", get(|| async { "definitely not json" }));
    let api = client(serve(app).await);

    let err = api.list_tasks(ListQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
}
