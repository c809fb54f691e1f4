//! Version history and the structural audit trail. All routes require
//! `Read` and work on deleted tasks; history stays readable.

use axum::{
  Json,
  extract::{Path, Query, State},
  response::{IntoResponse, Response},
};
use didact_core::{
  StoreFailure,
  access::{AccessLevel, EntityRef},
  store::TaskStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, auth::Actor, error::Error};

pub async fn latest<S>(
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

  let version = state
    .store
    .latest_snapshot(task_id)
    .await
    .map_err(Error::from_store)?
    .ok_or_else(|| Error::NotFound(format!("task {task_id} has no versions")))?;

  Ok(Json(version).into_response())
}

pub async fn version<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path((task_id, version)): Path<(Uuid, i64)>,
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

  let snapshot = state
    .store
    .snapshot(task_id, version)
    .await
    .map_err(Error::from_store)?
    .ok_or_else(|| {
      Error::from_domain(&didact_core::Error::VersionNotFound {
        task_id,
        version,
      })
    })?;

  Ok(Json(snapshot).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DiffParams {
  pub from: i64,
  pub to:   i64,
}

pub async fn diff<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(task_id): Path<Uuid>,
  Query(params): Query<DiffParams>,
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

  let diff = state
    .store
    .compare_versions(task_id, params.from, params.to)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(diff).into_response())
}

pub async fn changes<S>(
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

  let events = state
    .store
    .change_events(task_id)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(events).into_response())
}
