//! Access-graph resolution over the live tables.
//!
//! Every entity kind reduces to a set of repository ids, and the principal
//! needs a sufficient grant (or ownership) on at least one of them. Pure
//! reads; runs on the connection thread with no transaction and holds no
//! locks.

use didact_core::{
  access::{AccessLevel, EntityRef},
  Error as CoreError,
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  encode::{decode_access_level, encode_uuid},
  Result,
};

/// Resolve whether `principal_id` holds at least `required` on `entity`.
///
/// Union of paths, first match wins: the loop grants on the first
/// repository whose effective level satisfies the requirement and only
/// denies after every reachable repository has fallen short.
pub(crate) fn resolve(
  conn: &Connection,
  principal_id: Uuid,
  entity: EntityRef,
  required: AccessLevel,
) -> Result<()> {
  // Existence check precedes any authorization logic.
  let repos = match repository_set(conn, entity)? {
    None => return Err(CoreError::not_found(entity).into()),
    Some(repos) => repos,
  };

  if repos.is_empty() {
    return Err(CoreError::NotLinked { entity }.into());
  }

  let principal_str = encode_uuid(principal_id);
  for repo_str in &repos {
    if let Some(level) = effective_level(conn, repo_str, &principal_str)? {
      if level.satisfies(required) {
        return Ok(());
      }
    }
  }

  Err(CoreError::AccessDenied { principal_id, entity, required }.into())
}

/// The repositories reachable from `entity`, as id strings.
///
/// `None` means the entity itself does not exist; `Some(vec![])` means it
/// exists but reaches no repository (documents linked nowhere, tasks with
/// no unit links).
fn repository_set(conn: &Connection, entity: EntityRef) -> Result<Option<Vec<String>>> {
  let id_str = encode_uuid(entity.id());

  match entity {
    EntityRef::Repository(_) => {
      let exists: bool = conn
        .query_row(
          "SELECT 1 FROM repositories WHERE repository_id = ?1",
          rusqlite::params![id_str],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
      Ok(exists.then(|| vec![id_str]))
    }

    EntityRef::Unit(_) => {
      // A unit's repository is a direct NOT NULL column, so the set is
      // never empty for an existing unit.
      let repo: Option<String> = conn
        .query_row(
          "SELECT repository_id FROM units WHERE unit_id = ?1",
          rusqlite::params![id_str],
          |row| row.get(0),
        )
        .optional()?;
      Ok(repo.map(|r| vec![r]))
    }

    EntityRef::Document(_) => {
      let exists: bool = conn
        .query_row(
          "SELECT 1 FROM documents WHERE document_id = ?1",
          rusqlite::params![id_str],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
      if !exists {
        return Ok(None);
      }
      Ok(Some(document_repositories(conn, &id_str)?))
    }

    EntityRef::Chunk(_) => {
      // A chunk resolves through its document.
      let document: Option<String> = conn
        .query_row(
          "SELECT document_id FROM chunks WHERE chunk_id = ?1",
          rusqlite::params![id_str],
          |row| row.get(0),
        )
        .optional()?;
      match document {
        None => Ok(None),
        Some(doc_str) => Ok(Some(document_repositories(conn, &doc_str)?)),
      }
    }

    EntityRef::Task(_) => {
      let exists: bool = conn
        .query_row(
          "SELECT 1 FROM tasks WHERE task_id = ?1",
          rusqlite::params![id_str],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
      if !exists {
        return Ok(None);
      }
      let mut stmt = conn.prepare(
        "SELECT DISTINCT u.repository_id
         FROM unit_tasks ut
         JOIN units u ON u.unit_id = ut.unit_id
         WHERE ut.task_id = ?1",
      )?;
      let repos = stmt
        .query_map(rusqlite::params![id_str], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      Ok(Some(repos))
    }
  }
}

fn document_repositories(conn: &Connection, document_str: &str) -> Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT repository_id FROM repository_documents WHERE document_id = ?1",
  )?;
  let repos = stmt
    .query_map(rusqlite::params![document_str], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(repos)
}

/// The principal's effective level on one repository: `Owner` when they own
/// it, otherwise the level of their grant row, otherwise `None`.
fn effective_level(
  conn: &Connection,
  repo_str: &str,
  principal_str: &str,
) -> Result<Option<AccessLevel>> {
  let row: Option<(String, Option<String>)> = conn
    .query_row(
      "SELECT r.owner_id, ra.level
       FROM repositories r
       LEFT JOIN repository_access ra
         ON ra.repository_id = r.repository_id AND ra.principal_id = ?2
       WHERE r.repository_id = ?1",
      rusqlite::params![repo_str, principal_str],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?;

  let Some((owner_str, level_str)) = row else {
    return Ok(None);
  };

  // Both sides come from `encode_uuid`, so plain string equality holds.
  if owner_str == principal_str {
    return Ok(Some(AccessLevel::Owner));
  }
  level_str.as_deref().map(decode_access_level).transpose()
}
