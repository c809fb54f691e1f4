//! Repository routes: creation, grants, counters, units.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use didact_core::{
  StoreFailure,
  access::{AccessLevel, EntityRef},
  graph::{NewRepository, NewUnit},
  store::TaskStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, auth::Actor, error::Error, handlers::created};

#[derive(Debug, Deserialize)]
pub struct CreateRepository {
  pub name: String,
}

/// Create a repository owned by the actor. Ownership alone carries
/// `Owner`-level access; no grant row is written.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Json(body): Json<CreateRepository>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  let repository = state
    .store
    .create_repository(NewRepository {
      name:     body.name,
      owner_id: actor.principal_id,
    })
    .await
    .map_err(Error::from_store)?;

  Ok(created(repository))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
  pub principal_id: Uuid,
  pub level:        AccessLevel,
}

/// Grant or upgrade access. Re-granting replaces the stored level.
pub async fn grant<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(repository_id): Path<Uuid>,
  Json(body): Json<GrantRequest>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(
      actor.principal_id,
      EntityRef::Repository(repository_id),
      AccessLevel::Owner,
    )
    .await
    .map_err(Error::from_store)?;

  let grant = state
    .store
    .grant_access(repository_id, body.principal_id, body.level)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(grant).into_response())
}

pub async fn revoke<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path((repository_id, principal_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(
      actor.principal_id,
      EntityRef::Repository(repository_id),
      AccessLevel::Owner,
    )
    .await
    .map_err(Error::from_store)?;

  let removed = state
    .store
    .revoke_access(repository_id, principal_id)
    .await
    .map_err(Error::from_store)?;

  if removed {
    Ok(StatusCode::NO_CONTENT.into_response())
  } else {
    Err(Error::NotFound(format!(
      "no grant for principal {principal_id} on repository {repository_id}"
    )))
  }
}

pub async fn stats<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(repository_id): Path<Uuid>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(
      actor.principal_id,
      EntityRef::Repository(repository_id),
      AccessLevel::Read,
    )
    .await
    .map_err(Error::from_store)?;

  let stats = state
    .store
    .repository_stats(repository_id)
    .await
    .map_err(Error::from_store)?;

  Ok(Json(stats).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateUnit {
  pub title: String,
}

pub async fn create_unit<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(repository_id): Path<Uuid>,
  Json(body): Json<CreateUnit>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(
      actor.principal_id,
      EntityRef::Repository(repository_id),
      AccessLevel::Write,
    )
    .await
    .map_err(Error::from_store)?;

  let unit = state
    .store
    .create_unit(NewUnit { repository_id, title: body.title })
    .await
    .map_err(Error::from_store)?;

  Ok(created(unit))
}
