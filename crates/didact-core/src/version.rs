//! Immutable task snapshots and snapshot comparison.
//!
//! A [`TaskVersion`] freezes a task's structural fields immediately before
//! a mutation is applied; version 1 is therefore the state at creation
//! time, captured lazily on the first change. Snapshots are append-only
//! and survive option deletion and task soft-deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::TaskKind;

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// A frozen copy of a task's structural state.
///
/// Numbering is dense per task, starting at 1. The live row always
/// represents version `latest + 1` of the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskVersion {
  pub version_id: Uuid,
  pub task_id:    Uuid,
  pub version:    i64,
  pub question:   String,
  pub kind:       TaskKind,
  pub chunk_id:   Uuid,
  pub skill_id:   Option<Uuid>,
  pub created_at: DateTime<Utc>,
  pub options:    Vec<OptionVersion>,
}

/// One answer option as it stood at snapshot time.
///
/// `option_id` points at the live option row the copy was taken from. Once
/// that row is deleted the reference dangles, and the copy keeps showing
/// what the option said.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionVersion {
  pub option_version_id: Uuid,
  pub version_id:        Uuid,
  pub option_id:         Uuid,
  pub text:              String,
  pub is_correct:        bool,
}

// ─── Diffs ───────────────────────────────────────────────────────────────────

/// An old/new value pair for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange<T> {
  pub from: T,
  pub to:   T,
}

impl<T: PartialEq> FieldChange<T> {
  /// `Some` only when the values actually differ.
  pub fn of(from: T, to: T) -> Option<Self> {
    (from != to).then_some(Self { from, to })
  }
}

/// Structural difference between two snapshots of the same task.
///
/// Scalar fields are `None` when unchanged. Options are compared by their
/// `(text, is_correct)` value, so an option deleted and re-added with
/// identical content does not show up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
  pub task_id:         Uuid,
  pub from_version:    i64,
  pub to_version:      i64,
  pub question:        Option<FieldChange<String>>,
  pub kind:            Option<FieldChange<TaskKind>>,
  pub chunk_id:        Option<FieldChange<Uuid>>,
  pub skill_id:        Option<FieldChange<Option<Uuid>>>,
  /// Option values present in `to` but not `from`.
  pub options_added:   Vec<OptionVersion>,
  /// Option values present in `from` but not `to`.
  pub options_removed: Vec<OptionVersion>,
}

impl VersionDiff {
  /// Compare two snapshots of the same task.
  ///
  /// Either direction is allowed; callers usually pass `from` older than
  /// `to` but nothing here requires it.
  pub fn between(from: &TaskVersion, to: &TaskVersion) -> Self {
    let value = |o: &OptionVersion| (o.text.clone(), o.is_correct);

    // Multiset comparison by option value: each `from` occurrence cancels
    // one matching `to` occurrence.
    let mut added: Vec<OptionVersion> = to.options.clone();
    let mut removed = Vec::new();
    for old in &from.options {
      match added.iter().position(|n| value(n) == value(old)) {
        Some(i) => {
          added.remove(i);
        }
        None => removed.push(old.clone()),
      }
    }

    Self {
      task_id:         from.task_id,
      from_version:    from.version,
      to_version:      to.version,
      question:        FieldChange::of(from.question.clone(), to.question.clone()),
      kind:            FieldChange::of(from.kind, to.kind),
      chunk_id:        FieldChange::of(from.chunk_id, to.chunk_id),
      skill_id:        FieldChange::of(from.skill_id, to.skill_id),
      options_added:   added,
      options_removed: removed,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.question.is_none()
      && self.kind.is_none()
      && self.chunk_id.is_none()
      && self.skill_id.is_none()
      && self.options_added.is_empty()
      && self.options_removed.is_empty()
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
