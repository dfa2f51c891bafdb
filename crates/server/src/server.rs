use std::future::Future;

use axum::Router;
use longrun::{SessionRegistry, TaskScheduler};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::routes::{self, AppState};

/// The task API bound to one scheduler and one session registry.
///
/// Embedding crates mount their own task-producing routes with
/// [`with_routes`](Self::with_routes); they share the same [`AppState`].
pub struct ApiServer {
	config: Config,
	state: AppState,
	routes: Router<AppState>,
}

impl ApiServer {
	/// Starts the scheduler and session registry. Must run inside a tokio runtime.
	pub fn new(config: Config) -> Self {
		let scheduler = TaskScheduler::new(config.scheduler_config());
		let session_config = config.session_config();
		let eviction_interval = session_config.eviction_interval;
		let sessions = SessionRegistry::new(session_config);
		sessions.start_eviction(eviction_interval);

		Self {
			config,
			state: AppState { scheduler, sessions },
			routes: routes::api_routes(),
		}
	}

	/// Adds routes relative to `/api`.
	pub fn with_routes(mut self, routes: Router<AppState>) -> Self {
		self.routes = self.routes.merge(routes);
		self
	}

	pub fn state(&self) -> &AppState {
		&self.state
	}

	pub fn router(&self) -> Router {
		routes::router(self.state.clone(), self.routes.clone())
	}

	/// Serves until SIGINT/SIGTERM, then stops the scheduler and sessions.
	pub async fn run(self) -> Result<()> {
		let addr = self.config.bind_addr();
		let listener = TcpListener::bind(&addr).await.map_err(|source| ServerError::Bind {
			addr: addr.clone(),
			source,
		})?;
		let shutdown = shutdown_signal()?;
		info!(target = "longrun.server", addr, "serving task API");

		let served = axum::serve(listener, self.router().into_make_service())
			.with_graceful_shutdown(shutdown)
			.await;
		self.shutdown();
		served.map_err(ServerError::Io)
	}

	/// Shuts down the scheduler and closes every session. Idempotent.
	pub fn shutdown(&self) {
		self.state.scheduler.shutdown();
		self.state.sessions.close_all();
	}
}

#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigint = signal(SignalKind::interrupt())?;
	Ok(async move {
		tokio::select! {
			_ = sigterm.recv() => {
				info!(target = "longrun.server", "received SIGTERM, shutting down");
			}
			_ = sigint.recv() => {
				info!(target = "longrun.server", "received SIGINT, shutting down");
			}
		}
	})
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
	Ok(async {
		match tokio::signal::ctrl_c().await {
			Ok(()) => info!(target = "longrun.server", "received Ctrl+C, shutting down"),
			Err(err) => {
				tracing::warn!(target = "longrun.server", error = %err, "failed to listen for Ctrl+C");
				std::future::pending::<()>().await;
			}
		}
	})
}
