//! Error type for `didact-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain failure from the core taxonomy, carried through unchanged so
  /// callers can still classify it via [`didact_core::Error::kind`].
  #[error("core error: {0}")]
  Core(#[from] didact_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sql error: {0}")]
  Sql(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored value failed to decode back into its domain type: a
  /// malformed timestamp or an unknown enum discriminant.
  #[error("decode error: {0}")]
  Decode(String),
}

impl didact_core::StoreFailure for Error {
  fn domain(&self) -> Option<&didact_core::Error> { self.as_core() }

  fn is_constraint(&self) -> bool { self.is_constraint_violation() }
}

impl Error {
  /// The domain error inside, if this is one.
  pub fn as_core(&self) -> Option<&didact_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }

  /// True when SQLite rejected a statement for violating a UNIQUE, foreign
  /// key, or CHECK constraint. The HTTP layer reports these as conflicts.
  pub fn is_constraint_violation(&self) -> bool {
    let sql_err = match self {
      Self::Sql(e) => Some(e),
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => Some(e),
      _ => None,
    };
    matches!(
      sql_err,
      Some(rusqlite::Error::SqliteFailure(err, _))
        if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
