use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pw_longrun_protocol::ErrorMessage;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
	#[error("invalid config {}: {message}", path.display())]
	Config { path: PathBuf, message: String },

	#[error("failed to bind {addr}")]
	Bind {
		addr: String,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error("invalid request body: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Task(#[from] longrun::Error),
}

impl ServerError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ServerError::Json(_) => StatusCode::BAD_REQUEST,
			ServerError::Task(err) => {
				StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
			}
			ServerError::Config { .. } | ServerError::Bind { .. } | ServerError::Io(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		let body = ErrorMessage::new(status.as_u16(), self.to_string());
		(status, Json(body)).into_response()
	}
}
