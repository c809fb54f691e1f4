//! Error types for `didact-core`.
//!
//! Every domain failure is its own variant; [`Error::kind`] collapses the
//! variants into the four classes the HTTP layer maps onto status codes.

use thiserror::Error;
use uuid::Uuid;

use crate::access::{AccessLevel, EntityRef};

/// The coarse class of a domain error, used for HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The referenced entity does not exist — 404.
  NotFound,
  /// The entity exists but the principal may not touch it — 403.
  Forbidden,
  /// The request payload is malformed for the operation — 400.
  Validation,
  /// The operation collides with the entity's current state — 409.
  Conflict,
}

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ───────────────────────────────────────────────────────────
  #[error("principal not found: {0}")]
  PrincipalNotFound(Uuid),

  #[error("repository not found: {0}")]
  RepositoryNotFound(Uuid),

  #[error("document not found: {0}")]
  DocumentNotFound(Uuid),

  #[error("chunk not found: {0}")]
  ChunkNotFound(Uuid),

  #[error("unit not found: {0}")]
  UnitNotFound(Uuid),

  #[error("task not found: {0}")]
  TaskNotFound(Uuid),

  #[error("task {task_id} has no version {version}")]
  VersionNotFound { task_id: Uuid, version: i64 },

  // ── Forbidden ───────────────────────────────────────────────────────────
  #[error("principal {principal_id} lacks {required:?} access to {entity:?}")]
  AccessDenied {
    principal_id: Uuid,
    entity:       EntityRef,
    required:     AccessLevel,
  },

  /// The entity exists but no repository is reachable from it, so no
  /// principal can hold access through any path.
  #[error("{entity:?} is not linked to any repository")]
  NotLinked { entity: EntityRef },

  // ── Validation ──────────────────────────────────────────────────────────
  #[error("a task must be linked to at least one unit")]
  NoUnits,

  #[error("a multiple-choice task requires at least one answer option")]
  OptionsRequired,

  #[error("a free-text task cannot carry answer options")]
  OptionsForbidden,

  #[error("option {option_id} does not belong to task {task_id}")]
  OptionNotOnTask { option_id: Uuid, task_id: Uuid },

  #[error("answering a multiple-choice task requires an option id")]
  MissingOption,

  #[error("answering a free-text task requires the submitted text")]
  MissingFreeText,

  #[error("free-text answers must arrive with a grade score")]
  MissingScore,

  #[error("grade score {0} is outside 0..=100")]
  ScoreOutOfRange(i64),

  // ── Conflict ────────────────────────────────────────────────────────────
  #[error("task {0} is deleted; its history is read-only")]
  TaskDeleted(Uuid),

  #[error("version {version} already exists for task {task_id}")]
  VersionConflict { task_id: Uuid, version: i64 },

  // ── Transport ───────────────────────────────────────────────────────────
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// The not-found variant matching an entity reference's kind.
  pub fn not_found(entity: EntityRef) -> Self {
    match entity {
      EntityRef::Repository(id) => Self::RepositoryNotFound(id),
      EntityRef::Unit(id) => Self::UnitNotFound(id),
      EntityRef::Document(id) => Self::DocumentNotFound(id),
      EntityRef::Chunk(id) => Self::ChunkNotFound(id),
      EntityRef::Task(id) => Self::TaskNotFound(id),
    }
  }

  /// Classify the variant for HTTP status mapping.
  ///
  /// `Serialization` counts as `Validation`: it only occurs while shaping
  /// caller-supplied payloads.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::PrincipalNotFound(_)
      | Self::RepositoryNotFound(_)
      | Self::DocumentNotFound(_)
      | Self::ChunkNotFound(_)
      | Self::UnitNotFound(_)
      | Self::TaskNotFound(_)
      | Self::VersionNotFound { .. } => ErrorKind::NotFound,

      Self::AccessDenied { .. } | Self::NotLinked { .. } => ErrorKind::Forbidden,

      Self::NoUnits
      | Self::OptionsRequired
      | Self::OptionsForbidden
      | Self::OptionNotOnTask { .. }
      | Self::MissingOption
      | Self::MissingFreeText
      | Self::MissingScore
      | Self::ScoreOutOfRange(_)
      | Self::Serialization(_) => ErrorKind::Validation,

      Self::TaskDeleted(_) | Self::VersionConflict { .. } => ErrorKind::Conflict,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Backend classification ──────────────────────────────────────────────────

/// Implemented by backend error types so the HTTP layer can classify
/// failures without naming a concrete store.
pub trait StoreFailure: std::error::Error + Send + Sync + 'static {
  /// The domain error inside, if this failure carries one.
  fn domain(&self) -> Option<&Error>;

  /// True when the backend refused a write over a uniqueness or
  /// referential constraint.
  fn is_constraint(&self) -> bool { false }
}
