//! Append-only audit records: structural change events and answer events.
//!
//! Both tables only ever grow. Events reference tasks, options and
//! principals by id without demanding the referent still exists in its
//! live form, so history reads stay valid after deletions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Change events ───────────────────────────────────────────────────────────

/// What kind of structural change an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
  /// The question text was replaced.
  QuestionUpdated,
  /// A new answer option appeared.
  OptionAdded,
  /// An option's text was edited in place.
  OptionUpdated,
  /// An option was removed.
  OptionDeleted,
  /// An option's correctness flag flipped.
  CorrectnessChanged,
  /// The task crossed from pristine to modified.
  Modified,
  /// The task was soft-deleted.
  Deleted,
  /// Anything else; the concrete field lives in `metadata`.
  Other,
}

impl ChangeKind {
  /// The discriminant string stored in the `kind` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::QuestionUpdated => "question_updated",
      Self::OptionAdded => "option_added",
      Self::OptionUpdated => "option_updated",
      Self::OptionDeleted => "option_deleted",
      Self::CorrectnessChanged => "correctness_changed",
      Self::Modified => "modified",
      Self::Deleted => "deleted",
      Self::Other => "other",
    }
  }
}

/// One entry in a task's change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
  pub event_id:    Uuid,
  pub task_id:     Uuid,
  pub kind:        ChangeKind,
  /// Who performed the mutation.
  pub actor_id:    Uuid,
  /// The option concerned, for option-scoped kinds. May dangle once the
  /// option is deleted.
  pub option_id:   Option<Uuid>,
  pub old_value:   Option<String>,
  pub new_value:   Option<String>,
  /// Free-form context, e.g. `{"version": 3}` for the snapshot the change
  /// produced, or `{"field": "kind"}` for [`ChangeKind::Other`].
  pub metadata:    serde_json::Value,
  pub recorded_at: DateTime<Utc>,
}

/// Input for recording a change event directly, outside the standard
/// update flow.
#[derive(Debug, Clone)]
pub struct NewChangeEvent {
  pub task_id:   Uuid,
  pub kind:      ChangeKind,
  pub actor_id:  Uuid,
  pub option_id: Option<Uuid>,
  pub old_value: Option<String>,
  pub new_value: Option<String>,
  pub metadata:  serde_json::Value,
}

impl NewChangeEvent {
  pub fn new(task_id: Uuid, kind: ChangeKind, actor_id: Uuid) -> Self {
    Self {
      task_id,
      kind,
      actor_id,
      option_id: None,
      old_value: None,
      new_value: None,
      metadata: serde_json::Value::Null,
    }
  }
}

// ─── Answer events ───────────────────────────────────────────────────────────

/// Outcome of one answer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerResult {
  Correct,
  Incorrect,
  Partial,
}

impl AnswerResult {
  /// The discriminant string stored in the `result` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Correct => "correct",
      Self::Incorrect => "incorrect",
      Self::Partial => "partial",
    }
  }
}

/// One answer attempt by one principal.
///
/// For multiple-choice tasks `option_id` is set; for free-text tasks
/// `free_text` is. The event stores the judged result, not the raw score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEvent {
  pub answer_id:    Uuid,
  pub task_id:      Uuid,
  pub principal_id: Uuid,
  pub option_id:    Option<Uuid>,
  pub free_text:    Option<String>,
  pub result:       AnswerResult,
  pub recorded_at:  DateTime<Utc>,
}

/// A learner's raw submission, judged by the store into an
/// [`AnswerEvent`].
///
/// Exactly one of `option_id` (multiple choice) or `free_text` (free
/// text) applies, depending on the task kind. `score` must accompany
/// free-text submissions; graders run before this point.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerSubmission {
  pub option_id: Option<Uuid>,
  pub free_text: Option<String>,
  /// Grading score on the 0..=100 scale.
  pub score:     Option<i64>,
}
