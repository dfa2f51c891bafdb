//! Shared submission path for every task-producing route.

use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use longrun::{Submission, SubmitOptions, Task, TaskId, TaskScheduler};
use pw_longrun_protocol::{SubmitParams, TaskStatus, TaskStatusMessage};
use tracing::info;

use crate::error::Result;
use crate::sink::HttpSink;

/// Merges query parameters with those found in a JSON request body.
///
/// Body values win. An empty body leaves the query untouched; a non-object
/// body is rejected.
pub fn merge_params(query: SubmitParams, body: &Bytes) -> Result<SubmitParams> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(query);
	}
	let from_body: SubmitParams = serde_json::from_slice(body)?;
	Ok(query.overlay(from_body))
}

/// Hands `task` to the scheduler honouring `afterRunningTask` and
/// `forceImmediateExecution`.
///
/// Queued tasks answer `202` with a QUEUED [`TaskStatusMessage`]; immediate
/// tasks answer with their rendered result.
pub async fn accept_task(scheduler: &TaskScheduler, params: SubmitParams, task: Task) -> Result<Response> {
	let options = SubmitOptions {
		depends_on: params.after_running_task.map(TaskId::from),
		immediate: params.force_immediate_execution,
	};

	match scheduler.accept(task, options).await? {
		Submission::Queued(id) => {
			info!(target = "longrun.server", task_id = %id, "task accepted");
			let body = TaskStatusMessage::new(TaskStatus::Queued, "Task has been queued", id.to_string());
			Ok((StatusCode::ACCEPTED, Json(body)).into_response())
		}
		Submission::Completed(producer) => Ok(HttpSink::render(&producer)),
	}
}
