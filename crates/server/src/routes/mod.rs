//! HTTP surface, mounted under `/api`.

mod diagnostics;
mod tasks;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::Router;
use longrun::{SessionRegistry, TaskScheduler};

/// State shared by every route, including routes added by embedding crates.
#[derive(Clone)]
pub struct AppState {
	pub scheduler: TaskScheduler,
	pub sessions: Arc<SessionRegistry>,
}

/// Built-in routes, relative to `/api`.
pub fn api_routes() -> Router<AppState> {
	Router::new().merge(tasks::routes()).merge(diagnostics::routes())
}

/// Mounts `routes` under `/api` and attaches `state`.
pub fn router(state: AppState, routes: Router<AppState>) -> Router {
	Router::new().nest("/api", routes).with_state(state)
}
