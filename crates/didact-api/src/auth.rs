//! HTTP Basic-auth extractor resolving the acting principal.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use didact_core::{StoreFailure, graph::Principal, store::TaskStore};
use rand_core::OsRng;

use crate::{ApiState, error::Error};

/// The authenticated principal behind the current request.
///
/// Extraction runs the whole handshake: header parsing, principal lookup
/// by name, argon2 verification. Every failure collapses into
/// [`Error::Unauthorized`] so the response never reveals which step
/// rejected the request.
pub struct Actor(pub Principal);

/// Hash a plaintext password into its argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| Error::PasswordHash(e.to_string()))?
      .to_string(),
  )
}

/// Pull the Basic credential pair out of the request headers.
fn parse_basic(headers: &HeaderMap) -> Result<(String, String), Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (name, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;
  Ok((name.to_string(), password.to_string()))
}

impl<S> FromRequestParts<ApiState<S>> for Actor
where
  S: TaskStore + Clone + Send + Sync + 'static,
  S::Error: StoreFailure,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S>,
  ) -> Result<Self, Self::Rejection> {
    let (name, password) = parse_basic(&parts.headers)?;

    let principal = state
      .store
      .principal_by_name(&name)
      .await
      .map_err(Error::from_store)?
      .ok_or(Error::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&principal.password_hash)
      .map_err(|_| Error::Unauthorized)?;

    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| Error::Unauthorized)?;

    Ok(Actor(principal))
  }
}
