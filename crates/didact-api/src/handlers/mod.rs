pub mod access;
pub mod answers;
pub mod documents;
pub mod history;
pub mod principals;
pub mod repositories;
pub mod tasks;

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// 201 with a JSON body — the shape every creation route returns.
pub(super) fn created<T: Serialize>(value: T) -> Response {
  (StatusCode::CREATED, Json(value)).into_response()
}
