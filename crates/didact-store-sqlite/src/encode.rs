//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated lowercase
//! strings, enums as their lowercase discriminants, audit metadata as compact
//! JSON. Booleans ride on SQLite INTEGER columns natively.

use chrono::{DateTime, Utc};
use didact_core::{
  access::AccessLevel,
  audit::{AnswerEvent, AnswerResult, ChangeEvent, ChangeKind},
  graph::Principal,
  task::{AnswerOption, Task, TaskKind},
  version::{OptionVersion, TaskVersion},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_uuid_opt(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_access_level(level: AccessLevel) -> &'static str {
  match level {
    AccessLevel::Read => "read",
    AccessLevel::Write => "write",
    AccessLevel::Owner => "owner",
  }
}

pub fn decode_access_level(s: &str) -> Result<AccessLevel> {
  match s {
    "read" => Ok(AccessLevel::Read),
    "write" => Ok(AccessLevel::Write),
    "owner" => Ok(AccessLevel::Owner),
    other => Err(Error::Decode(format!("unknown access level: {other:?}"))),
  }
}

pub fn decode_task_kind(s: &str) -> Result<TaskKind> {
  match s {
    "multiple_choice" => Ok(TaskKind::MultipleChoice),
    "free_text" => Ok(TaskKind::FreeText),
    other => Err(Error::Decode(format!("unknown task kind: {other:?}"))),
  }
}

pub fn decode_change_kind(s: &str) -> Result<ChangeKind> {
  match s {
    "question_updated" => Ok(ChangeKind::QuestionUpdated),
    "option_added" => Ok(ChangeKind::OptionAdded),
    "option_updated" => Ok(ChangeKind::OptionUpdated),
    "option_deleted" => Ok(ChangeKind::OptionDeleted),
    "correctness_changed" => Ok(ChangeKind::CorrectnessChanged),
    "modified" => Ok(ChangeKind::Modified),
    "deleted" => Ok(ChangeKind::Deleted),
    "other" => Ok(ChangeKind::Other),
    other => Err(Error::Decode(format!("unknown change kind: {other:?}"))),
  }
}

pub fn decode_answer_result(s: &str) -> Result<AnswerResult> {
  match s {
    "correct" => Ok(AnswerResult::Correct),
    "incorrect" => Ok(AnswerResult::Incorrect),
    "partial" => Ok(AnswerResult::Partial),
    other => Err(Error::Decode(format!("unknown answer result: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `principals` row.
pub struct RawPrincipal {
  pub principal_id:  String,
  pub name:          String,
  pub password_hash: String,
  pub created_at:    String,
}

impl RawPrincipal {
  pub fn into_principal(self) -> Result<Principal> {
    Ok(Principal {
      principal_id:  decode_uuid(&self.principal_id)?,
      name:          self.name,
      password_hash: self.password_hash,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `tasks` row.
pub struct RawTask {
  pub task_id:           String,
  pub chunk_id:          String,
  pub skill_id:          Option<String>,
  pub kind:              String,
  pub question:          String,
  pub has_been_modified: bool,
  pub created_at:        String,
  pub deleted_at:        Option<String>,
}

impl RawTask {
  pub fn into_task(self) -> Result<Task> {
    Ok(Task {
      task_id:           decode_uuid(&self.task_id)?,
      chunk_id:          decode_uuid(&self.chunk_id)?,
      skill_id:          decode_uuid_opt(self.skill_id.as_deref())?,
      kind:              decode_task_kind(&self.kind)?,
      question:          self.question,
      has_been_modified: self.has_been_modified,
      created_at:        decode_dt(&self.created_at)?,
      deleted_at:        self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw strings read directly from an `answer_options` row.
pub struct RawOption {
  pub option_id:  String,
  pub task_id:    String,
  pub text:       String,
  pub is_correct: bool,
  pub created_at: String,
}

impl RawOption {
  pub fn into_option(self) -> Result<AnswerOption> {
    Ok(AnswerOption {
      option_id:  decode_uuid(&self.option_id)?,
      task_id:    decode_uuid(&self.task_id)?,
      text:       self.text,
      is_correct: self.is_correct,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `task_versions` row; the option rows
/// are attached by the caller.
pub struct RawVersion {
  pub version_id: String,
  pub task_id:    String,
  pub version:    i64,
  pub question:   String,
  pub kind:       String,
  pub chunk_id:   String,
  pub skill_id:   Option<String>,
  pub created_at: String,
}

impl RawVersion {
  pub fn into_version(self, options: Vec<OptionVersion>) -> Result<TaskVersion> {
    Ok(TaskVersion {
      version_id: decode_uuid(&self.version_id)?,
      task_id:    decode_uuid(&self.task_id)?,
      version:    self.version,
      question:   self.question,
      kind:       decode_task_kind(&self.kind)?,
      chunk_id:   decode_uuid(&self.chunk_id)?,
      skill_id:   decode_uuid_opt(self.skill_id.as_deref())?,
      created_at: decode_dt(&self.created_at)?,
      options,
    })
  }
}

/// Raw strings read directly from an `option_versions` row.
pub struct RawOptionVersion {
  pub option_version_id: String,
  pub version_id:        String,
  pub option_id:         String,
  pub text:              String,
  pub is_correct:        bool,
}

impl RawOptionVersion {
  pub fn into_option_version(self) -> Result<OptionVersion> {
    Ok(OptionVersion {
      option_version_id: decode_uuid(&self.option_version_id)?,
      version_id:        decode_uuid(&self.version_id)?,
      option_id:         decode_uuid(&self.option_id)?,
      text:              self.text,
      is_correct:        self.is_correct,
    })
  }
}

/// Raw strings read directly from a `task_changes` row.
pub struct RawChange {
  pub event_id:    String,
  pub task_id:     String,
  pub kind:        String,
  pub actor_id:    String,
  pub option_id:   Option<String>,
  pub old_value:   Option<String>,
  pub new_value:   Option<String>,
  pub metadata:    String,
  pub recorded_at: String,
}

impl RawChange {
  pub fn into_change(self) -> Result<ChangeEvent> {
    Ok(ChangeEvent {
      event_id:    decode_uuid(&self.event_id)?,
      task_id:     decode_uuid(&self.task_id)?,
      kind:        decode_change_kind(&self.kind)?,
      actor_id:    decode_uuid(&self.actor_id)?,
      option_id:   decode_uuid_opt(self.option_id.as_deref())?,
      old_value:   self.old_value,
      new_value:   self.new_value,
      metadata:    serde_json::from_str(&self.metadata)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `task_answers` row.
pub struct RawAnswer {
  pub answer_id:    String,
  pub task_id:      String,
  pub principal_id: String,
  pub option_id:    Option<String>,
  pub free_text:    Option<String>,
  pub result:       String,
  pub recorded_at:  String,
}

impl RawAnswer {
  pub fn into_answer(self) -> Result<AnswerEvent> {
    Ok(AnswerEvent {
      answer_id:    decode_uuid(&self.answer_id)?,
      task_id:      decode_uuid(&self.task_id)?,
      principal_id: decode_uuid(&self.principal_id)?,
      option_id:    decode_uuid_opt(self.option_id.as_deref())?,
      free_text:    self.free_text,
      result:       decode_answer_result(&self.result)?,
      recorded_at:  decode_dt(&self.recorded_at)?,
    })
  }
}
