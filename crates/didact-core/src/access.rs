//! Access-control vocabulary: levels, entity references, grants.
//!
//! Authorization is rooted at repositories. Every other entity resolves to
//! the set of repositories reachable from it, and a principal needs a
//! sufficient grant (or ownership) on at least one of them — union of
//! paths, first match wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Access levels ───────────────────────────────────────────────────────────

/// What a principal may do with a repository's contents.
///
/// The derive order gives the total order `Read < Write < Owner`; a grant
/// satisfies a requirement when `granted >= required`. Owning a repository
/// implies `Owner` with no grant row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
  Read,
  Write,
  Owner,
}

impl AccessLevel {
  pub fn satisfies(self, required: AccessLevel) -> bool { self >= required }
}

// ─── Entity references ───────────────────────────────────────────────────────

/// A typed reference to any entity the access resolver understands.
///
/// Resolution dispatches over the variant, one lookup path per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityRef {
  Repository(Uuid),
  Unit(Uuid),
  Document(Uuid),
  Chunk(Uuid),
  Task(Uuid),
}

impl EntityRef {
  pub fn id(&self) -> Uuid {
    match self {
      Self::Repository(id)
      | Self::Unit(id)
      | Self::Document(id)
      | Self::Chunk(id)
      | Self::Task(id) => *id,
    }
  }
}

// ─── Grants ──────────────────────────────────────────────────────────────────

/// An explicit access grant; unique per (repository, principal).
/// Re-granting replaces the level rather than adding a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
  pub repository_id: Uuid,
  pub principal_id:  Uuid,
  pub level:         AccessLevel,
  pub granted_at:    DateTime<Utc>,
}
