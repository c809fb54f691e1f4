//! Answer submission and per-task answer history.

use axum::{
  Json,
  extract::{Path, State},
  response::{IntoResponse, Response},
};
use didact_core::{
  StoreFailure,
  access::{AccessLevel, EntityRef},
  audit::{AnswerEvent, AnswerSubmission},
  store::TaskStore,
  task::TaskKind,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{ApiState, auth::Actor, error::Error, handlers::created};

/// The judged answer event, with the grader's feedback when one ran.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
  #[serde(flatten)]
  pub event:    AnswerEvent,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub feedback: Option<String>,
}

/// Submit an answer. Free-text submissions arriving without a score are
/// sent to the configured grader first; grading happens here so no
/// external call runs inside the store's transaction. Without a grader,
/// such submissions are a validation failure. A deleted task conflicts
/// before the grader is consulted.
pub async fn submit<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(task_id): Path<Uuid>,
  Json(mut submission): Json<AnswerSubmission>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(actor.principal_id, EntityRef::Task(task_id), AccessLevel::Read)
    .await
    .map_err(Error::from_store)?;

  let mut feedback = None;
  if let (None, Some(text)) = (submission.score, submission.free_text.clone()) {
    let view = state
      .store
      .get_task(task_id)
      .await
      .map_err(Error::from_store)?
      .ok_or_else(|| {
        Error::from_domain(&didact_core::Error::TaskNotFound(task_id))
      })?;

    if view.task.is_deleted() {
      return Err(Error::from_domain(&didact_core::Error::TaskDeleted(task_id)));
    }

    if view.task.kind == TaskKind::FreeText {
      match &state.grader {
        Some(grader) => {
          let outcome = grader.grade(&view.task, &text).await?;
          submission.score = Some(outcome.score);
          feedback = outcome.feedback;
        }
        None => {
          return Err(Error::from_domain(&didact_core::Error::MissingScore));
        }
      }
    }
  }

  let event = state
    .store
    .submit_answer(task_id, actor.principal_id, submission)
    .await
    .map_err(Error::from_store)?;

  Ok(created(AnswerResponse { event, feedback }))
}

/// Full answer history for a task, oldest first, across all learners.
/// Requires `Write`.
pub async fn attempts<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(task_id): Path<Uuid>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(actor.principal_id, EntityRef::Task(task_id), AccessLevel::Write)
    .await
    .map_err(Error::from_store)?;

  let events = state
    .store
    .answer_events(task_id)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(events).into_response())
}
