//! Error types and axum `IntoResponse` implementation.

use axum::{
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use didact_core::{ErrorKind, StoreFailure, grading::GraderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Forbidden(String),
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("password hash error: {0}")]
  PasswordHash(String),
  #[error(transparent)]
  Grader(#[from] GraderError),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Classify a backend failure: domain errors map by their kind,
  /// constraint violations surface as conflicts, anything else is a
  /// storage fault.
  pub fn from_store<E: StoreFailure>(e: E) -> Self {
    if let Some(domain) = e.domain() {
      return Self::from_domain(domain);
    }
    if e.is_constraint() {
      return Self::Conflict(e.to_string());
    }
    Self::Store(Box::new(e))
  }

  pub fn from_domain(domain: &didact_core::Error) -> Self {
    let message = domain.to_string();
    match domain.kind() {
      ErrorKind::NotFound => Self::NotFound(message),
      ErrorKind::Forbidden => Self::Forbidden(message),
      ErrorKind::Validation => Self::BadRequest(message),
      ErrorKind::Conflict => Self::Conflict(message),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res =
          (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"didact\""),
        );
        res
      }
      Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
      Error::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
      Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
      Error::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
      Error::PasswordHash(msg) => {
        (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
      }
      Error::Grader(e) => {
        tracing::warn!(error = %e, "grader failure");
        (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
      }
      Error::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
      }
    }
  }
}
