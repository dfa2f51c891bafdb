use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use longrun::{CancelOutcome, Error, TaskId};
use pw_longrun_protocol::{TaskListing, TaskStatus, TaskStatusMessage};
use tracing::debug;

use super::AppState;
use crate::error::{Result, ServerError};
use crate::sink::HttpSink;

pub(super) fn routes() -> Router<AppState> {
	Router::new()
		.route("/tasks", get(list_tasks))
		.route("/tasks/{id}", get(task_result).delete(cancel_task))
		.route("/tasks/{id}/status", get(task_status))
}

async fn list_tasks(State(state): State<AppState>) -> Json<TaskListing> {
	Json(state.scheduler.list())
}

async fn task_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<TaskStatusMessage>> {
	let report = state.scheduler.status(&TaskId::from(id))?;
	Ok(Json(report.into()))
}

/// Stored result once finished; 503 with the live status while running.
async fn task_result(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
	let id = TaskId::from(id);
	match state.scheduler.result(&id) {
		Ok(producer) => {
			debug!(target = "longrun.server", task_id = %id, "serving task result");
			Ok(HttpSink::render(&producer))
		}
		Err(Error::NotFound(_)) => {
			let report = state.scheduler.status(&id)?;
			if report.status.is_terminal() {
				// Finished between the two lookups.
				return Ok(HttpSink::render(&state.scheduler.result(&id)?));
			}
			let body: TaskStatusMessage = report.into();
			Ok((StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response())
		}
		Err(err) => Err(ServerError::from(err)),
	}
}

async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
	let id = TaskId::from(id);
	match state.scheduler.cancel(&id) {
		CancelOutcome::Cancelled => {
			let body = TaskStatusMessage::new(TaskStatus::Cancelled, "Task cancellation requested", id.to_string());
			Ok((StatusCode::OK, Json(body)).into_response())
		}
		CancelOutcome::Conflict => {
			let body = TaskStatusMessage::new(TaskStatus::Finished, "Task has already finished", id.to_string());
			Ok((StatusCode::CONFLICT, Json(body)).into_response())
		}
		CancelOutcome::NotFound => Err(Error::NotFound(id).into()),
	}
}
