use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use longrun::{Error, OutputSink, ResultProducer};
use serde_json::Value;

use crate::error::ServerError;

/// [`OutputSink`] that turns a task outcome into an HTTP response.
#[derive(Default)]
pub struct HttpSink {
	response: Option<Response>,
}

impl HttpSink {
	/// Renders `producer`; a producer that emits nothing becomes `200 null`.
	pub fn render(producer: &ResultProducer) -> Response {
		let mut sink = Self::default();
		producer.produce(&mut sink);
		sink.response
			.unwrap_or_else(|| (StatusCode::OK, Json(Value::Null)).into_response())
	}
}

impl OutputSink for HttpSink {
	fn success(&mut self, payload: Value) {
		self.response = Some((StatusCode::OK, Json(payload)).into_response());
	}

	fn failure(&mut self, error: &Error) {
		self.response = Some(ServerError::Task(error.clone()).into_response());
	}
}
