//! Task routes: creation, reads, partial updates, soft deletion, and
//! unit links.

use axum::{
  Json,
  extract::{Path, State},
  response::{IntoResponse, Response},
};
use didact_core::{
  StoreFailure,
  access::{AccessLevel, EntityRef},
  store::TaskStore,
  task::{NewTask, TaskPatch},
};
use uuid::Uuid;

use crate::{ApiState, auth::Actor, error::Error, handlers::created};

/// Create a task. The actor needs `Write` through every unit the task is
/// linked to at birth, not just one of them.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Json(body): Json<NewTask>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  // An empty unit list skips the gate; `create_task` rejects it below.
  for unit_id in &body.unit_ids {
    state
      .store
      .check_access(
        actor.principal_id,
        EntityRef::Unit(*unit_id),
        AccessLevel::Write,
      )
      .await
      .map_err(Error::from_store)?;
  }

  let view = state
    .store
    .create_task(body, actor.principal_id)
    .await
    .map_err(Error::from_store)?;

  Ok(created(view))
}

pub async fn fetch<S>(
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
    .check_access(actor.principal_id, EntityRef::Task(task_id), AccessLevel::Read)
    .await
    .map_err(Error::from_store)?;

  let view = state
    .store
    .get_task(task_id)
    .await
    .map_err(Error::from_store)?
    .ok_or_else(|| {
      Error::from_domain(&didact_core::Error::TaskNotFound(task_id))
    })?;

  Ok(Json(view).into_response())
}

pub async fn update<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(task_id): Path<Uuid>,
  Json(patch): Json<TaskPatch>,
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

  let view = state
    .store
    .update_task(task_id, patch, actor.principal_id)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(view).into_response())
}

/// Soft delete. Returns the final view with `deleted_at` stamped; the
/// task stays readable for history.
pub async fn remove<S>(
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

  let view = state
    .store
    .soft_delete_task(task_id, actor.principal_id)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(view).into_response())
}

/// Link a task to a unit. The gate is `Write` on the unit being linked;
/// the task's existing links are irrelevant here.
pub async fn link_unit<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path((task_id, unit_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(actor.principal_id, EntityRef::Unit(unit_id), AccessLevel::Write)
    .await
    .map_err(Error::from_store)?;

  let view = state
    .store
    .link_task_unit(task_id, unit_id)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(view).into_response())
}

/// Unlink a task from a unit. Removing the last link is allowed and
/// leaves the task reachable by nobody until relinked.
pub async fn unlink_unit<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path((task_id, unit_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(actor.principal_id, EntityRef::Unit(unit_id), AccessLevel::Write)
    .await
    .map_err(Error::from_store)?;

  let view = state
    .store
    .unlink_task_unit(task_id, unit_id)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(view).into_response())
}
