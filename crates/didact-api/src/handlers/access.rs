//! The raw access-check route.

use axum::{
  extract::{Query, State},
  http::StatusCode,
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

#[derive(Debug, Deserialize)]
pub struct CheckParams {
  pub kind:  String,
  pub id:    Uuid,
  pub level: AccessLevel,
}

/// Resolve one access question for the actor. 204 when the requirement is
/// met; otherwise the resolver's error maps to 403 or 404 as usual.
pub async fn check<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Query(params): Query<CheckParams>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  let entity = match params.kind.as_str() {
    "repository" => EntityRef::Repository(params.id),
    "unit" => EntityRef::Unit(params.id),
    "document" => EntityRef::Document(params.id),
    "chunk" => EntityRef::Chunk(params.id),
    "task" => EntityRef::Task(params.id),
    other => {
      return Err(Error::BadRequest(format!("unknown entity kind: {other}")));
    }
  };

  state
    .store
    .check_access(actor.principal_id, entity, params.level)
    .await
    .map_err(Error::from_store)?;

  Ok(StatusCode::NO_CONTENT.into_response())
}
