use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use axum::routing::post;
use longrun::task;
use pw_longrun_protocol::SubmitParams;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::AppState;
use crate::config::Config;
use crate::server::ApiServer;
use crate::submit::accept_task;

fn test_server() -> ApiServer {
	let mut config = Config::default();
	config.scheduler.sweep_interval_secs = None;
	ApiServer::new(config)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
	let mut request = Request::builder().method(method).uri(uri);
	let body = match body {
		Some(json) => {
			request = request.header(header::CONTENT_TYPE, "application/json");
			Body::from(serde_json::to_vec(&json).unwrap())
		}
		None => Body::empty(),
	};
	let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
	let status = response.status();
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	let value = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).unwrap()
	};
	(status, value)
}

async fn submit(app: &Router, uri: &str) -> String {
	let (status, body) = send(app, Method::POST, uri, None).await;
	assert_eq!(status, StatusCode::ACCEPTED, "{body}");
	assert_eq!(body["status"], "QUEUED");
	body["taskId"].as_str().unwrap().to_string()
}

/// Polls the status route until the task leaves the running set.
async fn wait_until_done(app: &Router, id: &str) -> String {
	for _ in 0..500 {
		let (_, body) = send(app, Method::GET, &format!("/api/tasks/{id}/status"), None).await;
		let status = body["status"].as_str().unwrap_or_default().to_string();
		if status == "FINISHED" || status == "FAILED" {
			return status;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("task {id} did not finish");
}

#[tokio::test]
async fn unknown_paths_and_ids_are_not_found() {
	let server = test_server();
	let app = server.router();

	let (status, _) = send(&app, Method::GET, "/tasks", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);

	let (status, body) = send(&app, Method::GET, "/api/tasks/nope/status", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], 404);
	assert_eq!(body["message"], "Task not found: nope");

	let (status, _) = send(&app, Method::GET, "/api/tasks/nope", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	let (status, _) = send(&app, Method::DELETE, "/api/tasks/nope", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);

	server.shutdown();
}

#[tokio::test]
async fn delay_task_lifecycle() {
	let server = test_server();
	let app = server.router();

	let (status, body) = send(&app, Method::GET, "/api/tasks", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({"queuedTasks": [], "finishedTasks": []}));

	let id = submit(&app, "/api/diagnostics/delay?millis=0&steps=1").await;
	assert_eq!(wait_until_done(&app, &id).await, "FINISHED");

	let (status, body) = send(&app, Method::GET, &format!("/api/tasks/{id}/status"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["progress"], 1000);
	assert_eq!(body["message"], "Task has finished");

	let (status, body) = send(&app, Method::GET, &format!("/api/tasks/{id}"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({"millis": 0, "steps": 1}));

	// Results are replayable within the retention window.
	let (status, _) = send(&app, Method::GET, &format!("/api/tasks/{id}"), None).await;
	assert_eq!(status, StatusCode::OK);

	let (_, body) = send(&app, Method::GET, "/api/tasks", None).await;
	assert_eq!(body["finishedTasks"], json!([id]));

	let (status, body) = send(&app, Method::DELETE, &format!("/api/tasks/{id}"), None).await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["status"], "FINISHED");

	server.shutdown();
}

#[tokio::test]
async fn running_task_can_be_polled_and_cancelled() {
	let server = test_server();
	let app = server.router();

	let id = submit(&app, "/api/diagnostics/delay?millis=100000&steps=1000").await;

	let (status, body) = send(&app, Method::GET, &format!("/api/tasks/{id}"), None).await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert!(matches!(body["status"].as_str(), Some("WAITING" | "RUNNING")), "{body}");
	assert_eq!(body["taskId"], id.as_str());

	let (status, body) = send(&app, Method::DELETE, &format!("/api/tasks/{id}"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "CANCELLED");

	assert_eq!(wait_until_done(&app, &id).await, "FAILED");
	let (status, body) = send(&app, Method::GET, &format!("/api/tasks/{id}"), None).await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(body, json!({"error": 503, "message": "Task cancelled"}));

	server.shutdown();
}

#[tokio::test]
async fn immediate_execution_from_query_or_body() {
	let server = test_server();
	let app = server.router();

	let (status, body) = send(
		&app,
		Method::POST,
		"/api/diagnostics/delay?millis=0&steps=2&forceImmediateExecution=true",
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({"millis": 0, "steps": 2}));

	let (status, body) = send(
		&app,
		Method::POST,
		"/api/diagnostics/delay?millis=0",
		Some(json!({"forceImmediateExecution": "1"})),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["millis"], 0);

	let (_, listing) = send(&app, Method::GET, "/api/tasks", None).await;
	assert_eq!(listing, json!({"queuedTasks": [], "finishedTasks": []}));

	let (status, body) = send(&app, Method::POST, "/api/diagnostics/delay", Some(json!(42))).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], 400);

	server.shutdown();
}

#[tokio::test]
async fn delay_steps_are_capped() {
	let server = test_server();
	let app = server.router();

	let (status, body) = send(
		&app,
		Method::POST,
		"/api/diagnostics/delay?millis=0&steps=50000000&forceImmediateExecution=true",
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({"millis": 0, "steps": 10000}));

	let id = submit(&app, "/api/diagnostics/delay?millis=0&steps=4294967295").await;
	assert_eq!(wait_until_done(&app, &id).await, "FINISHED");
	let (_, body) = send(&app, Method::GET, &format!("/api/tasks/{id}/status"), None).await;
	assert_eq!(body["progress"], 1000);

	server.shutdown();
}

#[tokio::test]
async fn chained_task_runs_after_its_dependency() {
	let server = test_server();
	let app = server.router();

	let first = submit(&app, "/api/diagnostics/delay?millis=200&steps=1").await;
	let second = submit(&app, &format!("/api/diagnostics/delay?millis=0&steps=1&afterRunningTask={first}")).await;

	assert_eq!(wait_until_done(&app, &second).await, "FINISHED");
	let (_, body) = send(&app, Method::GET, &format!("/api/tasks/{first}/status"), None).await;
	assert_eq!(body["status"], "FINISHED");

	server.shutdown();
}

async fn lookup_missing_order(State(state): State<AppState>) -> crate::error::Result<Response> {
	let lookup = task(|_control| async move {
		Err(longrun::Error::operation_failed_with_status(
			"order 0035928976 not found",
			422,
		))
	});
	accept_task(&state.scheduler, SubmitParams::default(), lookup).await
}

#[tokio::test]
async fn embedded_routes_share_the_scheduler() {
	let server = test_server().with_routes(Router::new().route("/orders/lookup", post(lookup_missing_order)));
	let app = server.router();

	let id = submit(&app, "/api/orders/lookup").await;
	assert_eq!(wait_until_done(&app, &id).await, "FAILED");

	let (status, body) = send(&app, Method::GET, &format!("/api/tasks/{id}"), None).await;
	assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(body, json!({"error": 422, "message": "order 0035928976 not found"}));
	assert!(server.state().sessions.users().is_empty());

	server.shutdown();
	let (status, body) = send(&app, Method::POST, "/api/orders/lookup", None).await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(body["message"], "Service is shutting down");
}
