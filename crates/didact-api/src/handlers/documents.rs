//! Document routes: creation, repository links, chunk appends.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use didact_core::{
  StoreFailure,
  access::{AccessLevel, EntityRef},
  graph::{NewChunk, NewDocument},
  store::TaskStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, auth::Actor, error::Error, handlers::created};

#[derive(Debug, Deserialize)]
pub struct CreateDocument {
  pub title: String,
}

/// Create a document. It starts unlinked, so there is nothing to check
/// access against yet; any authenticated principal may upload.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Actor(_actor): Actor,
  Json(body): Json<CreateDocument>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  let document = state
    .store
    .create_document(NewDocument { title: body.title })
    .await
    .map_err(Error::from_store)?;

  Ok(created(document))
}

/// Link a document into a repository, making it (and its chunks)
/// reachable for access resolution.
pub async fn link<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path((repository_id, document_id)): Path<(Uuid, Uuid)>,
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

  state
    .store
    .link_document(repository_id, document_id)
    .await
    .map_err(Error::from_store)?;

  Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateChunk {
  pub position: i64,
  pub content:  String,
}

/// Append a chunk. Requires `Write` via the document, which in turn
/// requires the document to be linked somewhere the actor can write.
pub async fn create_chunk<S>(
  State(state): State<ApiState<S>>,
  Actor(actor): Actor,
  Path(document_id): Path<Uuid>,
  Json(body): Json<CreateChunk>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  state
    .store
    .check_access(
      actor.principal_id,
      EntityRef::Document(document_id),
      AccessLevel::Write,
    )
    .await
    .map_err(Error::from_store)?;

  let chunk = state
    .store
    .create_chunk(NewChunk {
      document_id,
      position: body.position,
      content: body.content,
    })
    .await
    .map_err(Error::from_store)?;

  Ok(created(chunk))
}
