//! Principal registration.

use axum::{Json, extract::State, response::Response};
use didact_core::{StoreFailure, graph::NewPrincipal, store::TaskStore};
use serde::Deserialize;

use crate::{ApiState, auth::hash_password, error::Error, handlers::created};

#[derive(Debug, Deserialize)]
pub struct CreatePrincipal {
  pub name:     String,
  pub password: String,
}

/// The one unauthenticated route: anyone may register. The password is
/// hashed here; the store only ever sees the PHC string.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<CreatePrincipal>,
) -> Result<Response, Error>
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  let password_hash = hash_password(&body.password)?;

  let principal = state
    .store
    .create_principal(NewPrincipal { name: body.name, password_hash })
    .await
    .map_err(Error::from_store)?;

  Ok(created(principal))
}
