//! The entities that make up the authorization graph: principals,
//! repositories, documents, chunks, and units.
//!
//! These are thin envelopes — ids, names, timestamps. The interesting
//! behavior (resolution, counters, history) lives elsewhere and refers to
//! them by id only; no struct holds a live back-reference to its parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Principal ───────────────────────────────────────────────────────────────

/// An authenticated actor. The password hash is an opaque PHC string set at
/// the HTTP boundary; the core stores and returns it without inspecting it,
/// and it never serialises into responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
  pub principal_id:  Uuid,
  pub name:          String,
  #[serde(skip_serializing, default)]
  pub password_hash: String,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::TaskStore::create_principal`].
#[derive(Debug, Clone)]
pub struct NewPrincipal {
  pub name:          String,
  pub password_hash: String,
}

// ─── Repository ──────────────────────────────────────────────────────────────

/// The authorization root. Owning it implies `Owner`-level access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
  pub repository_id: Uuid,
  pub name:          String,
  pub owner_id:      Uuid,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRepository {
  pub name:     String,
  pub owner_id: Uuid,
}

// ─── Document / Chunk ────────────────────────────────────────────────────────

/// An uploaded source document. Linked to repositories many-to-many; a
/// document linked to none is unreachable for access purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub document_id: Uuid,
  pub title:       String,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
  pub title: String,
}

/// A contiguous slice of a document's text; the source-of-truth a task is
/// generated from. Belongs to exactly one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
  pub chunk_id:    Uuid,
  pub document_id: Uuid,
  /// Zero-based order of the chunk within its document.
  pub position:    i64,
  pub content:     String,
}

#[derive(Debug, Clone)]
pub struct NewChunk {
  pub document_id: Uuid,
  pub position:    i64,
  pub content:     String,
}

// ─── Unit ────────────────────────────────────────────────────────────────────

/// A curriculum section. Belongs to exactly one repository (direct foreign
/// key); tasks become visible inside a repository by being linked to its
/// units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
  pub unit_id:       Uuid,
  pub repository_id: Uuid,
  pub title:         String,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUnit {
  pub repository_id: Uuid,
  pub title:         String,
}
