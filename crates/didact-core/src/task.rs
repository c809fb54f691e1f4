//! Task types — the unit of learning content this store exists to manage.
//!
//! A task is mutable, but never silently: every structural change is
//! preceded by an immutable snapshot (see [`crate::version`]) and recorded
//! as audit events (see [`crate::audit`]). Deletion is a soft, terminal
//! state transition; the row and its history stay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Kind ────────────────────────────────────────────────────────────────────

/// How a task is answered. The variant name doubles as the discriminant
/// string stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  MultipleChoice,
  FreeText,
}

impl TaskKind {
  /// The discriminant string stored in the `kind` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::MultipleChoice => "multiple_choice",
      Self::FreeText => "free_text",
    }
  }
}

// ─── Task ────────────────────────────────────────────────────────────────────

/// A quiz item generated from a document chunk.
///
/// Visibility is indirect: a task belongs to no repository itself but is
/// linked to units, and each unit belongs to one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  pub task_id:    Uuid,
  /// The chunk whose text this task was derived from.
  pub chunk_id:   Uuid,
  /// Optional reference into an external skill taxonomy; opaque here.
  pub skill_id:   Option<Uuid>,
  pub kind:       TaskKind,
  pub question:   String,
  /// Set exactly once, on the first structural change, never cleared.
  /// Gates the per-repository `total_modified` counter.
  pub has_been_modified: bool,
  pub created_at: DateTime<Utc>,
  /// Soft-delete stamp. A deleted task accepts no further mutations.
  pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }
}

/// One selectable answer. Mutable until deleted; once referenced by an
/// answer event or an option version, its id lives on in those records even
/// after the row is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
  pub option_id:  Uuid,
  pub task_id:    Uuid,
  pub text:       String,
  pub is_correct: bool,
  pub created_at: DateTime<Utc>,
}

/// A task bundled with its live options and unit links — the read model
/// returned by every task operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
  pub task:     Task,
  pub options:  Vec<AnswerOption>,
  pub unit_ids: Vec<Uuid>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// A desired answer option as supplied by callers. Identity for
/// reconciliation purposes is the `(text, is_correct)` pair — see
/// [`crate::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionInput {
  pub text:       String,
  pub is_correct: bool,
}

impl OptionInput {
  pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
    Self { text: text.into(), is_correct }
  }
}

/// Input to [`crate::store::TaskStore::create_task`].
///
/// `unit_ids` must name at least one existing unit: a task with no unit
/// links is reachable by nobody, so creating one is rejected outright.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
  pub chunk_id: Uuid,
  pub skill_id: Option<Uuid>,
  pub kind:     TaskKind,
  pub question: String,
  #[serde(default)]
  pub options:  Vec<OptionInput>,
  pub unit_ids: Vec<Uuid>,
}

/// Partial update for [`crate::store::TaskStore::update_task`].
///
/// `None` means "leave unchanged". `skill_id` is doubly wrapped so an
/// absent field and an explicit null stay distinguishable: `Some(None)`
/// clears the skill reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
  pub question: Option<String>,
  pub kind:     Option<TaskKind>,
  pub chunk_id: Option<Uuid>,
  #[serde(default, deserialize_with = "present_field")]
  pub skill_id: Option<Option<Uuid>>,
  /// Desired option set, reconciled by value against the live set.
  /// `None` leaves options untouched.
  pub options:  Option<Vec<OptionInput>>,
}

/// Wraps a present field (even an explicit `null`) in `Some`, keeping it
/// apart from an absent field after deserialization.
fn present_field<'de, D>(de: D) -> Result<Option<Option<Uuid>>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Option::<Uuid>::deserialize(de).map(Some)
}

impl TaskPatch {
  /// True when the patch carries nothing at all — neither scalar changes
  /// nor a desired option set.
  pub fn is_empty(&self) -> bool {
    self.question.is_none()
      && self.kind.is_none()
      && self.chunk_id.is_none()
      && self.skill_id.is_none()
      && self.options.is_none()
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn patch_keeps_absent_and_null_skill_apart() {
    let patch: TaskPatch = serde_json::from_value(json!({})).unwrap();
    assert_eq!(patch.skill_id, None);
    assert!(patch.is_empty());

    let patch: TaskPatch =
      serde_json::from_value(json!({ "skill_id": null })).unwrap();
    assert_eq!(patch.skill_id, Some(None));
    assert!(!patch.is_empty());

    let skill = Uuid::new_v4();
    let patch: TaskPatch =
      serde_json::from_value(json!({ "skill_id": skill })).unwrap();
    assert_eq!(patch.skill_id, Some(Some(skill)));
  }

  #[test]
  fn new_task_options_default_to_empty() {
    let task: NewTask = serde_json::from_value(json!({
      "chunk_id": Uuid::new_v4(),
      "kind": "free_text",
      "question": "Why?",
      "unit_ids": [Uuid::new_v4()],
    }))
    .unwrap();
    assert!(task.options.is_empty());
    assert_eq!(task.skill_id, None);
  }

  #[test]
  fn discriminants_match_serde_tags() {
    for kind in [TaskKind::MultipleChoice, TaskKind::FreeText] {
      assert_eq!(
        serde_json::to_value(kind).unwrap(),
        json!(kind.discriminant())
      );
    }
  }
}
