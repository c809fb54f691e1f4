//! JSON REST layer for Didact.
//!
//! Exposes an axum [`Router`] over any [`TaskStore`] backend, with HTTP
//! Basic authentication resolving the acting principal against stored
//! argon2 hashes. Access gates run here, once per route, before the store
//! operation; the store itself does not re-check.

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::Error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use didact_core::{StoreFailure, grading::Grader, store::TaskStore};

use handlers::{
  access, answers, documents, history, principals, repositories, tasks,
};

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct ApiState<S: TaskStore> {
  pub store:  Arc<S>,
  /// Scores free-text submissions that arrive without a score. When
  /// absent, such submissions are rejected as validation failures.
  pub grader: Option<Arc<dyn Grader>>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the task API.
pub fn router<S>(state: ApiState<S>) -> Router
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  Router::new()
    .route("/principals", post(principals::create::<S>))
    .route("/repositories", post(repositories::create::<S>))
    .route("/repositories/{id}/grants", post(repositories::grant::<S>))
    .route(
      "/repositories/{id}/grants/{principal_id}",
      delete(repositories::revoke::<S>),
    )
    .route("/repositories/{id}/stats", get(repositories::stats::<S>))
    .route("/repositories/{id}/units", post(repositories::create_unit::<S>))
    .route(
      "/repositories/{id}/documents/{document_id}",
      post(documents::link::<S>),
    )
    .route("/documents", post(documents::create::<S>))
    .route("/documents/{id}/chunks", post(documents::create_chunk::<S>))
    .route("/access/check", get(access::check::<S>))
    .route("/tasks", post(tasks::create::<S>))
    .route(
      "/tasks/{id}",
      get(tasks::fetch::<S>)
        .patch(tasks::update::<S>)
        .delete(tasks::remove::<S>),
    )
    .route(
      "/tasks/{id}/units/{unit_id}",
      post(tasks::link_unit::<S>).delete(tasks::unlink_unit::<S>),
    )
    .route(
      "/tasks/{id}/answers",
      post(answers::submit::<S>).get(answers::attempts::<S>),
    )
    .route("/tasks/{id}/versions/latest", get(history::latest::<S>))
    .route("/tasks/{id}/versions/{version}", get(history::version::<S>))
    .route("/tasks/{id}/diff", get(history::diff::<S>))
    .route("/tasks/{id}/changes", get(history::changes::<S>))
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────
