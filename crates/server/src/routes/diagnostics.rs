//! Self-test endpoint exercising the full submit/poll/cancel cycle without a
//! remote target.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use longrun::{PROGRESS_COMPLETE, ResultProducer, task};
use pw_longrun_protocol::SubmitParams;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::error::Result;
use crate::submit::{accept_task, merge_params};

const DEFAULT_DELAY_MILLIS: u64 = 1_000;
const DEFAULT_DELAY_STEPS: u32 = 10;
const MAX_DELAY_STEPS: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct DelayParams {
	millis: Option<u64>,
	steps: Option<u32>,
}

pub(super) fn routes() -> Router<AppState> {
	Router::new().route("/diagnostics/delay", post(delay))
}

/// Sleeps `millis` split over `steps` (at most 10 000), reporting progress and
/// honouring cancellation between steps.
async fn delay(
	State(state): State<AppState>,
	Query(delay): Query<DelayParams>,
	Query(submit): Query<SubmitParams>,
	body: Bytes,
) -> Result<Response> {
	let params = merge_params(submit, &body)?;
	let millis = delay.millis.unwrap_or(DEFAULT_DELAY_MILLIS);
	let steps = delay.steps.unwrap_or(DEFAULT_DELAY_STEPS).clamp(1, MAX_DELAY_STEPS);
	let pause = Duration::from_millis(millis / u64::from(steps));

	let delay_task = task(move |control| async move {
		for step in 1..=steps {
			control.check_and_pass(())?;
			if !pause.is_zero() {
				tokio::time::sleep(pause).await;
			}
			control.set_progress(step_progress(step, steps));
			control.set_progress_message(format!("step {step} of {steps}"));
		}
		Ok(ResultProducer::json(json!({ "millis": millis, "steps": steps })))
	});

	accept_task(&state.scheduler, params, delay_task).await
}

fn step_progress(step: u32, steps: u32) -> u32 {
	let scaled = u64::from(step) * u64::from(PROGRESS_COMPLETE) / u64::from(steps);
	u32::try_from(scaled).unwrap_or(PROGRESS_COMPLETE)
}
