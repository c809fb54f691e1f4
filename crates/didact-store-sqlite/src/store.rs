//! [`SqliteStore`] — the SQLite implementation of [`TaskStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use serde_json::json;
use uuid::Uuid;

use didact_core::{
  access::{AccessGrant, AccessLevel, EntityRef},
  audit::{
    AnswerEvent, AnswerResult, AnswerSubmission, ChangeEvent, ChangeKind,
    NewChangeEvent,
  },
  grading::GradingPolicy,
  graph::{
    Chunk, Document, NewChunk, NewDocument, NewPrincipal, NewRepository,
    NewUnit, Principal, Repository, Unit,
  },
  reconcile::reconcile,
  stats::{RepositoryStats, TaskUserStats},
  store::TaskStore,
  task::{AnswerOption, NewTask, Task, TaskKind, TaskPatch, TaskView},
  version::{TaskVersion, VersionDiff},
  Error as CoreError,
};

use crate::{
  access,
  encode::{
    decode_uuid, encode_access_level, encode_dt, encode_uuid, RawAnswer,
    RawChange, RawOption, RawOptionVersion, RawPrincipal, RawTask, RawVersion,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Didact task store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. Every call
/// queues onto one dedicated database thread, so statements of different
/// calls never interleave.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  policy: GradingPolicy,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, policy: GradingPolicy::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, policy: GradingPolicy::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the free-text grading thresholds.
  pub fn with_policy(mut self, policy: GradingPolicy) -> Self {
    self.policy = policy;
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread, outside any transaction.
  ///
  /// The inner result carries this crate's error type, so `f` can decode
  /// rows and raise domain errors next to its queries.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside one `BEGIN IMMEDIATE` transaction.
  ///
  /// Commits only when `f` succeeds. Any error rolls the whole transaction
  /// back: no partial snapshot, option change, audit entry, or counter
  /// bump ever survives a failed mutation.
  async fn write_tx<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx);
        if out.is_ok() {
          tx.commit()?;
        }
        Ok(out)
      })
      .await?
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn row_exists(conn: &Connection, sql: &str, id_str: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(sql, rusqlite::params![id_str], |_| Ok(true))
      .optional()?
      .unwrap_or(false),
  )
}

fn load_task(conn: &Connection, task_str: &str) -> Result<Option<Task>> {
  let raw = conn
    .query_row(
      "SELECT task_id, chunk_id, skill_id, kind, question, has_been_modified,
              created_at, deleted_at
       FROM tasks WHERE task_id = ?1",
      rusqlite::params![task_str],
      |row| {
        Ok(RawTask {
          task_id:           row.get(0)?,
          chunk_id:          row.get(1)?,
          skill_id:          row.get(2)?,
          kind:              row.get(3)?,
          question:          row.get(4)?,
          has_been_modified: row.get(5)?,
          created_at:        row.get(6)?,
          deleted_at:        row.get(7)?,
        })
      },
    )
    .optional()?;
  raw.map(RawTask::into_task).transpose()
}

fn load_options(conn: &Connection, task_str: &str) -> Result<Vec<AnswerOption>> {
  let mut stmt = conn.prepare(
    "SELECT option_id, task_id, text, is_correct, created_at
     FROM answer_options WHERE task_id = ?1
     ORDER BY created_at, rowid",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![task_str], |row| {
      Ok(RawOption {
        option_id:  row.get(0)?,
        task_id:    row.get(1)?,
        text:       row.get(2)?,
        is_correct: row.get(3)?,
        created_at: row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawOption::into_option).collect()
}

fn load_unit_ids(conn: &Connection, task_str: &str) -> Result<Vec<Uuid>> {
  let mut stmt = conn
    .prepare("SELECT unit_id FROM unit_tasks WHERE task_id = ?1 ORDER BY rowid")?;
  let ids = stmt
    .query_map(rusqlite::params![task_str], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  ids.iter().map(|s| decode_uuid(s)).collect()
}

fn load_view(conn: &Connection, task_str: &str) -> Result<Option<TaskView>> {
  let Some(task) = load_task(conn, task_str)? else {
    return Ok(None);
  };
  let options = load_options(conn, task_str)?;
  let unit_ids = load_unit_ids(conn, task_str)?;
  Ok(Some(TaskView { task, options, unit_ids }))
}

/// The distinct repositories a task is currently reachable through.
fn task_repositories(conn: &Connection, task_str: &str) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT DISTINCT u.repository_id
     FROM unit_tasks ut
     JOIN units u ON u.unit_id = ut.unit_id
     WHERE ut.task_id = ?1",
  )?;
  stmt
    .query_map(rusqlite::params![task_str], |row| row.get(0))?
    .collect()
}

/// Increment one counter column, creating the row lazily.
/// `column` is always one of the three fixed counter names.
fn bump_counter(conn: &Connection, repo_str: &str, column: &str) -> rusqlite::Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO repository_stats (repository_id, {column}) VALUES (?1, 1)
       ON CONFLICT(repository_id) DO UPDATE SET {column} = {column} + 1"
    ),
    rusqlite::params![repo_str],
  )?;
  Ok(())
}

fn is_constraint(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Copy the task's current state into the next numbered snapshot and
/// return that number. Runs inside the caller's mutation transaction, so
/// number assignment and insertion are atomic; the `UNIQUE(task_id,
/// version)` backstop surfaces as `VersionConflict` if it ever fires.
fn snapshot_task(
  conn: &Connection,
  task: &Task,
  options: &[AnswerOption],
  now: DateTime<Utc>,
) -> Result<i64> {
  let task_str = encode_uuid(task.task_id);
  let next: i64 = conn.query_row(
    "SELECT COALESCE(MAX(version), 0) + 1 FROM task_versions WHERE task_id = ?1",
    rusqlite::params![task_str],
    |row| row.get(0),
  )?;

  let version_id = Uuid::new_v4();
  conn
    .execute(
      "INSERT INTO task_versions (version_id, task_id, version, question, kind,
                                  chunk_id, skill_id, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        encode_uuid(version_id),
        task_str,
        next,
        task.question,
        task.kind.discriminant(),
        encode_uuid(task.chunk_id),
        task.skill_id.map(encode_uuid),
        encode_dt(now),
      ],
    )
    .map_err(|e| {
      if is_constraint(&e) {
        Error::Core(CoreError::VersionConflict { task_id: task.task_id, version: next })
      } else {
        Error::Sql(e)
      }
    })?;

  for opt in options {
    conn.execute(
      "INSERT INTO option_versions (option_version_id, version_id, option_id,
                                    text, is_correct)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        encode_uuid(version_id),
        encode_uuid(opt.option_id),
        opt.text,
        opt.is_correct,
      ],
    )?;
  }

  Ok(next)
}

fn raw_version_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersion> {
  Ok(RawVersion {
    version_id: row.get(0)?,
    task_id:    row.get(1)?,
    version:    row.get(2)?,
    question:   row.get(3)?,
    kind:       row.get(4)?,
    chunk_id:   row.get(5)?,
    skill_id:   row.get(6)?,
    created_at: row.get(7)?,
  })
}

/// Fetch one snapshot with its option copies; `version` of `None` selects
/// the highest-numbered one.
fn load_snapshot(
  conn: &Connection,
  task_str: &str,
  version: Option<i64>,
) -> Result<Option<TaskVersion>> {
  let raw: Option<RawVersion> = match version {
    Some(v) => conn
      .query_row(
        "SELECT version_id, task_id, version, question, kind, chunk_id,
                skill_id, created_at
         FROM task_versions WHERE task_id = ?1 AND version = ?2",
        rusqlite::params![task_str, v],
        raw_version_row,
      )
      .optional()?,
    None => conn
      .query_row(
        "SELECT version_id, task_id, version, question, kind, chunk_id,
                skill_id, created_at
         FROM task_versions WHERE task_id = ?1
         ORDER BY version DESC LIMIT 1",
        rusqlite::params![task_str],
        raw_version_row,
      )
      .optional()?,
  };
  let Some(raw) = raw else {
    return Ok(None);
  };

  let mut stmt = conn.prepare(
    "SELECT option_version_id, version_id, option_id, text, is_correct
     FROM option_versions WHERE version_id = ?1 ORDER BY rowid",
  )?;
  let option_raws = stmt
    .query_map(rusqlite::params![raw.version_id], |row| {
      Ok(RawOptionVersion {
        option_version_id: row.get(0)?,
        version_id:        row.get(1)?,
        option_id:         row.get(2)?,
        text:              row.get(3)?,
        is_correct:        row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let options = option_raws
    .into_iter()
    .map(RawOptionVersion::into_option_version)
    .collect::<Result<Vec<_>>>()?;

  raw.into_version(options).map(Some)
}

/// Materialise a change event from its input, stamping id and time.
fn change_event(input: NewChangeEvent, now: DateTime<Utc>) -> ChangeEvent {
  ChangeEvent {
    event_id:    Uuid::new_v4(),
    task_id:     input.task_id,
    kind:        input.kind,
    actor_id:    input.actor_id,
    option_id:   input.option_id,
    old_value:   input.old_value,
    new_value:   input.new_value,
    metadata:    input.metadata,
    recorded_at: now,
  }
}

fn insert_change(conn: &Connection, event: &ChangeEvent) -> Result<()> {
  conn.execute(
    "INSERT INTO task_changes (event_id, task_id, kind, actor_id, option_id,
                               old_value, new_value, metadata, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      encode_uuid(event.event_id),
      encode_uuid(event.task_id),
      event.kind.discriminant(),
      encode_uuid(event.actor_id),
      event.option_id.map(encode_uuid),
      event.old_value.as_deref(),
      event.new_value.as_deref(),
      serde_json::to_string(&event.metadata)?,
      encode_dt(event.recorded_at),
    ],
  )?;
  Ok(())
}

/// The audit-value rendering of one option: its text and correctness as
/// compact JSON.
fn option_value(text: &str, is_correct: bool) -> String {
  json!({ "text": text, "is_correct": is_correct }).to_string()
}

// ─── TaskStore impl ──────────────────────────────────────────────────────────

impl TaskStore for SqliteStore {
  type Error = Error;

  // ── Principals & repositories ─────────────────────────────────────────────

  async fn create_principal(&self, input: NewPrincipal) -> Result<Principal> {
    let principal = Principal {
      principal_id:  Uuid::new_v4(),
      name:          input.name,
      password_hash: input.password_hash,
      created_at:    Utc::now(),
    };

    let id_str   = encode_uuid(principal.principal_id);
    let name     = principal.name.clone();
    let hash     = principal.password_hash.clone();
    let at_str   = encode_dt(principal.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO principals (principal_id, name, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, hash, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(principal)
  }

  async fn principal_by_name(&self, name: &str) -> Result<Option<Principal>> {
    let name = name.to_owned();

    let raw: Option<RawPrincipal> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT principal_id, name, password_hash, created_at
               FROM principals WHERE name = ?1",
              rusqlite::params![name],
              |row| {
                Ok(RawPrincipal {
                  principal_id:  row.get(0)?,
                  name:          row.get(1)?,
                  password_hash: row.get(2)?,
                  created_at:    row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPrincipal::into_principal).transpose()
  }

  async fn create_repository(&self, input: NewRepository) -> Result<Repository> {
    let repository = Repository {
      repository_id: Uuid::new_v4(),
      name:          input.name,
      owner_id:      input.owner_id,
      created_at:    Utc::now(),
    };

    let id_str    = encode_uuid(repository.repository_id);
    let name      = repository.name.clone();
    let owner_str = encode_uuid(repository.owner_id);
    let at_str    = encode_dt(repository.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO repositories (repository_id, name, owner_id, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, owner_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(repository)
  }

  async fn grant_access(
    &self,
    repository_id: Uuid,
    principal_id: Uuid,
    level: AccessLevel,
  ) -> Result<AccessGrant> {
    let grant = AccessGrant {
      repository_id,
      principal_id,
      level,
      granted_at: Utc::now(),
    };

    let repo_str      = encode_uuid(repository_id);
    let principal_str = encode_uuid(principal_id);
    let level_str     = encode_access_level(level);
    let at_str        = encode_dt(grant.granted_at);

    self
      .write_tx(move |tx| {
        if !row_exists(tx, "SELECT 1 FROM repositories WHERE repository_id = ?1", &repo_str)? {
          return Err(CoreError::RepositoryNotFound(repository_id).into());
        }
        if !row_exists(tx, "SELECT 1 FROM principals WHERE principal_id = ?1", &principal_str)? {
          return Err(CoreError::PrincipalNotFound(principal_id).into());
        }
        tx.execute(
          "INSERT INTO repository_access (repository_id, principal_id, level, granted_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(repository_id, principal_id)
           DO UPDATE SET level = excluded.level, granted_at = excluded.granted_at",
          rusqlite::params![repo_str, principal_str, level_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(grant)
  }

  async fn revoke_access(&self, repository_id: Uuid, principal_id: Uuid) -> Result<bool> {
    let repo_str      = encode_uuid(repository_id);
    let principal_str = encode_uuid(principal_id);

    self
      .write_tx(move |tx| {
        if !row_exists(tx, "SELECT 1 FROM repositories WHERE repository_id = ?1", &repo_str)? {
          return Err(CoreError::RepositoryNotFound(repository_id).into());
        }
        let removed = tx.execute(
          "DELETE FROM repository_access WHERE repository_id = ?1 AND principal_id = ?2",
          rusqlite::params![repo_str, principal_str],
        )?;
        Ok(removed > 0)
      })
      .await
  }

  // ── Content graph ─────────────────────────────────────────────────────────

  async fn create_document(&self, input: NewDocument) -> Result<Document> {
    let document = Document {
      document_id: Uuid::new_v4(),
      title:       input.title,
      created_at:  Utc::now(),
    };

    let id_str = encode_uuid(document.document_id);
    let title  = document.title.clone();
    let at_str = encode_dt(document.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (document_id, title, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, title, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(document)
  }

  async fn link_document(&self, repository_id: Uuid, document_id: Uuid) -> Result<()> {
    let repo_str     = encode_uuid(repository_id);
    let document_str = encode_uuid(document_id);

    self
      .write_tx(move |tx| {
        if !row_exists(tx, "SELECT 1 FROM repositories WHERE repository_id = ?1", &repo_str)? {
          return Err(CoreError::RepositoryNotFound(repository_id).into());
        }
        if !row_exists(tx, "SELECT 1 FROM documents WHERE document_id = ?1", &document_str)? {
          return Err(CoreError::DocumentNotFound(document_id).into());
        }
        tx.execute(
          "INSERT OR IGNORE INTO repository_documents (repository_id, document_id)
           VALUES (?1, ?2)",
          rusqlite::params![repo_str, document_str],
        )?;
        Ok(())
      })
      .await
  }

  async fn create_chunk(&self, input: NewChunk) -> Result<Chunk> {
    let chunk = Chunk {
      chunk_id:    Uuid::new_v4(),
      document_id: input.document_id,
      position:    input.position,
      content:     input.content,
    };

    let id_str       = encode_uuid(chunk.chunk_id);
    let document_str = encode_uuid(chunk.document_id);
    let position     = chunk.position;
    let content      = chunk.content.clone();

    self
      .write_tx(move |tx| {
        if !row_exists(tx, "SELECT 1 FROM documents WHERE document_id = ?1", &document_str)? {
          return Err(CoreError::DocumentNotFound(input.document_id).into());
        }
        tx.execute(
          "INSERT INTO chunks (chunk_id, document_id, position, content)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, document_str, position, content],
        )?;
        Ok(())
      })
      .await?;

    Ok(chunk)
  }

  async fn create_unit(&self, input: NewUnit) -> Result<Unit> {
    let unit = Unit {
      unit_id:       Uuid::new_v4(),
      repository_id: input.repository_id,
      title:         input.title,
      created_at:    Utc::now(),
    };

    let id_str   = encode_uuid(unit.unit_id);
    let repo_str = encode_uuid(unit.repository_id);
    let title    = unit.title.clone();
    let at_str   = encode_dt(unit.created_at);

    self
      .write_tx(move |tx| {
        if !row_exists(tx, "SELECT 1 FROM repositories WHERE repository_id = ?1", &repo_str)? {
          return Err(CoreError::RepositoryNotFound(input.repository_id).into());
        }
        tx.execute(
          "INSERT INTO units (unit_id, repository_id, title, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, repo_str, title, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(unit)
  }

  // ── Access resolution ─────────────────────────────────────────────────────

  async fn check_access(
    &self,
    principal_id: Uuid,
    entity: EntityRef,
    required: AccessLevel,
  ) -> Result<()> {
    self
      .read(move |conn| access::resolve(conn, principal_id, entity, required))
      .await
  }

  // ── Tasks ─────────────────────────────────────────────────────────────────

  async fn create_task(&self, input: NewTask, _actor_id: Uuid) -> Result<TaskView> {
    if input.unit_ids.is_empty() {
      return Err(CoreError::NoUnits.into());
    }
    match input.kind {
      TaskKind::MultipleChoice if input.options.is_empty() => {
        return Err(CoreError::OptionsRequired.into());
      }
      TaskKind::FreeText if !input.options.is_empty() => {
        return Err(CoreError::OptionsForbidden.into());
      }
      _ => {}
    }

    self
      .write_tx(move |tx| {
        let now = Utc::now();
        let task = Task {
          task_id:           Uuid::new_v4(),
          chunk_id:          input.chunk_id,
          skill_id:          input.skill_id,
          kind:              input.kind,
          question:          input.question,
          has_been_modified: false,
          created_at:        now,
          deleted_at:        None,
        };
        let task_str = encode_uuid(task.task_id);

        if !row_exists(tx, "SELECT 1 FROM chunks WHERE chunk_id = ?1", &encode_uuid(task.chunk_id))? {
          return Err(CoreError::ChunkNotFound(task.chunk_id).into());
        }

        // Distinct unit ids, payload order preserved.
        let mut unit_ids: Vec<Uuid> = Vec::new();
        for unit_id in input.unit_ids {
          if !unit_ids.contains(&unit_id) {
            unit_ids.push(unit_id);
          }
        }

        let mut repos: Vec<String> = Vec::new();
        for unit_id in &unit_ids {
          let repo: Option<String> = tx
            .query_row(
              "SELECT repository_id FROM units WHERE unit_id = ?1",
              rusqlite::params![encode_uuid(*unit_id)],
              |row| row.get(0),
            )
            .optional()?;
          match repo {
            None => return Err(CoreError::UnitNotFound(*unit_id).into()),
            Some(r) => {
              if !repos.contains(&r) {
                repos.push(r);
              }
            }
          }
        }

        tx.execute(
          "INSERT INTO tasks (task_id, chunk_id, skill_id, kind, question,
                              has_been_modified, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            task_str,
            encode_uuid(task.chunk_id),
            task.skill_id.map(encode_uuid),
            task.kind.discriminant(),
            task.question,
            false,
            encode_dt(now),
          ],
        )?;

        let mut options = Vec::with_capacity(input.options.len());
        for want in input.options {
          let option = AnswerOption {
            option_id:  Uuid::new_v4(),
            task_id:    task.task_id,
            text:       want.text,
            is_correct: want.is_correct,
            created_at: now,
          };
          tx.execute(
            "INSERT INTO answer_options (option_id, task_id, text, is_correct, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
              encode_uuid(option.option_id),
              task_str,
              option.text,
              option.is_correct,
              encode_dt(now),
            ],
          )?;
          options.push(option);
        }

        for unit_id in &unit_ids {
          tx.execute(
            "INSERT INTO unit_tasks (unit_id, task_id) VALUES (?1, ?2)",
            rusqlite::params![encode_uuid(*unit_id), task_str],
          )?;
        }

        for repo in &repos {
          bump_counter(tx, repo, "total_created")?;
        }

        Ok(TaskView { task, options, unit_ids })
      })
      .await
  }

  async fn get_task(&self, task_id: Uuid) -> Result<Option<TaskView>> {
    self
      .read(move |conn| load_view(conn, &encode_uuid(task_id)))
      .await
  }

  async fn update_task(
    &self,
    task_id: Uuid,
    patch: TaskPatch,
    actor_id: Uuid,
  ) -> Result<TaskView> {
    self
      .write_tx(move |tx| {
        let now = Utc::now();
        let task_str = encode_uuid(task_id);

        let Some(task) = load_task(tx, &task_str)? else {
          return Err(CoreError::TaskNotFound(task_id).into());
        };
        if task.is_deleted() {
          return Err(CoreError::TaskDeleted(task_id).into());
        }
        let options = load_options(tx, &task_str)?;

        // Field-level diff; an absent payload field means no change.
        let question_to = patch.question.filter(|q| *q != task.question);
        let kind_to     = patch.kind.filter(|k| *k != task.kind);
        let chunk_to    = patch.chunk_id.filter(|c| *c != task.chunk_id);
        let skill_to    = patch.skill_id.filter(|s| *s != task.skill_id);

        if let Some(chunk_id) = chunk_to {
          if !row_exists(tx, "SELECT 1 FROM chunks WHERE chunk_id = ?1", &encode_uuid(chunk_id))? {
            return Err(CoreError::ChunkNotFound(chunk_id).into());
          }
        }

        let plan = patch.options.as_deref().map(|desired| reconcile(&options, desired));

        // The outcome must stay valid for the resulting kind.
        let final_kind = kind_to.unwrap_or(task.kind);
        let remaining = plan.as_ref().map_or(options.len(), |p| p.keep.len() + p.add.len());
        match final_kind {
          TaskKind::MultipleChoice if remaining == 0 => {
            return Err(CoreError::OptionsRequired.into());
          }
          TaskKind::FreeText if remaining > 0 => {
            return Err(CoreError::OptionsForbidden.into());
          }
          _ => {}
        }

        let field_changed = question_to.is_some()
          || kind_to.is_some()
          || chunk_to.is_some()
          || skill_to.is_some();

        // Snapshot-before-write. Fires whenever a field differs or the
        // caller supplied an option set, even one that reconciles to a
        // no-op; audit events and counters below fire only for actual
        // changes.
        let version = if field_changed || plan.is_some() {
          Some(snapshot_task(tx, &task, &options, now)?)
        } else {
          None
        };
        let meta = json!({ "version": version });

        let mut updated = task.clone();
        if field_changed {
          if let Some(q) = &question_to {
            updated.question = q.clone();
          }
          if let Some(k) = kind_to {
            updated.kind = k;
          }
          if let Some(c) = chunk_to {
            updated.chunk_id = c;
          }
          if let Some(s) = skill_to {
            updated.skill_id = s;
          }
          tx.execute(
            "UPDATE tasks SET question = ?2, kind = ?3, chunk_id = ?4, skill_id = ?5
             WHERE task_id = ?1",
            rusqlite::params![
              task_str,
              updated.question,
              updated.kind.discriminant(),
              encode_uuid(updated.chunk_id),
              updated.skill_id.map(encode_uuid),
            ],
          )?;
        }

        // Apply the option plan: deletes first, NULLing answer references
        // before each row goes, then inserts.
        let mut added: Vec<AnswerOption> = Vec::new();
        if let Some(plan) = &plan {
          for gone in &plan.remove {
            let opt_str = encode_uuid(gone.option_id);
            tx.execute(
              "UPDATE task_answers SET option_id = NULL WHERE option_id = ?1",
              rusqlite::params![opt_str],
            )?;
            tx.execute(
              "DELETE FROM answer_options WHERE option_id = ?1",
              rusqlite::params![opt_str],
            )?;
          }
          for want in &plan.add {
            let option = AnswerOption {
              option_id:  Uuid::new_v4(),
              task_id,
              text:       want.text.clone(),
              is_correct: want.is_correct,
              created_at: now,
            };
            tx.execute(
              "INSERT INTO answer_options (option_id, task_id, text, is_correct, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)",
              rusqlite::params![
                encode_uuid(option.option_id),
                task_str,
                option.text,
                option.is_correct,
                encode_dt(now),
              ],
            )?;
            added.push(option);
          }
        }

        // One audit entry per observable change, each tagged with the
        // version the snapshot produced.
        if let Some(q) = &question_to {
          insert_change(tx, &change_event(NewChangeEvent {
            task_id,
            kind: ChangeKind::QuestionUpdated,
            actor_id,
            option_id: None,
            old_value: Some(task.question.clone()),
            new_value: Some(q.clone()),
            metadata: meta.clone(),
          }, now))?;
        }
        if let Some(k) = kind_to {
          insert_change(tx, &change_event(NewChangeEvent {
            task_id,
            kind: ChangeKind::Other,
            actor_id,
            option_id: None,
            old_value: Some(task.kind.discriminant().to_owned()),
            new_value: Some(k.discriminant().to_owned()),
            metadata: json!({ "field": "kind", "version": version }),
          }, now))?;
        }
        if let Some(c) = chunk_to {
          insert_change(tx, &change_event(NewChangeEvent {
            task_id,
            kind: ChangeKind::Other,
            actor_id,
            option_id: None,
            old_value: Some(encode_uuid(task.chunk_id)),
            new_value: Some(encode_uuid(c)),
            metadata: json!({ "field": "chunk_id", "version": version }),
          }, now))?;
        }
        if let Some(s) = skill_to {
          insert_change(tx, &change_event(NewChangeEvent {
            task_id,
            kind: ChangeKind::Other,
            actor_id,
            option_id: None,
            old_value: task.skill_id.map(encode_uuid),
            new_value: s.map(encode_uuid),
            metadata: json!({ "field": "skill_id", "version": version }),
          }, now))?;
        }
        if let Some(plan) = &plan {
          for option in &added {
            insert_change(tx, &change_event(NewChangeEvent {
              task_id,
              kind: ChangeKind::OptionAdded,
              actor_id,
              option_id: Some(option.option_id),
              old_value: None,
              new_value: Some(option_value(&option.text, option.is_correct)),
              metadata: meta.clone(),
            }, now))?;
          }
          for gone in &plan.remove {
            insert_change(tx, &change_event(NewChangeEvent {
              task_id,
              kind: ChangeKind::OptionDeleted,
              actor_id,
              option_id: Some(gone.option_id),
              old_value: Some(option_value(&gone.text, gone.is_correct)),
              new_value: None,
              metadata: meta.clone(),
            }, now))?;
          }
        }

        // The first structural modification flips the flag, writes one
        // Modified event, and counts once per reachable repository.
        let structurally_changed =
          field_changed || plan.as_ref().is_some_and(|p| !p.is_noop());
        if structurally_changed && !task.has_been_modified {
          tx.execute(
            "UPDATE tasks SET has_been_modified = 1 WHERE task_id = ?1",
            rusqlite::params![task_str],
          )?;
          updated.has_been_modified = true;
          insert_change(tx, &change_event(NewChangeEvent {
            task_id,
            kind: ChangeKind::Modified,
            actor_id,
            option_id: None,
            old_value: None,
            new_value: None,
            metadata: meta.clone(),
          }, now))?;
          for repo in task_repositories(tx, &task_str)? {
            bump_counter(tx, &repo, "total_modified")?;
          }
        }

        let options = load_options(tx, &task_str)?;
        let unit_ids = load_unit_ids(tx, &task_str)?;
        Ok(TaskView { task: updated, options, unit_ids })
      })
      .await
  }

  async fn soft_delete_task(&self, task_id: Uuid, actor_id: Uuid) -> Result<TaskView> {
    self
      .write_tx(move |tx| {
        let now = Utc::now();
        let task_str = encode_uuid(task_id);

        let Some(mut task) = load_task(tx, &task_str)? else {
          return Err(CoreError::TaskNotFound(task_id).into());
        };
        let options = load_options(tx, &task_str)?;
        let unit_ids = load_unit_ids(tx, &task_str)?;

        // Idempotent: deleting again writes nothing at all.
        if task.is_deleted() {
          return Ok(TaskView { task, options, unit_ids });
        }

        let version = snapshot_task(tx, &task, &options, now)?;
        tx.execute(
          "UPDATE tasks SET deleted_at = ?2 WHERE task_id = ?1",
          rusqlite::params![task_str, encode_dt(now)],
        )?;
        insert_change(tx, &change_event(NewChangeEvent {
          task_id,
          kind: ChangeKind::Deleted,
          actor_id,
          option_id: None,
          old_value: None,
          new_value: None,
          metadata: json!({ "version": version }),
        }, now))?;
        for repo in task_repositories(tx, &task_str)? {
          bump_counter(tx, &repo, "total_deleted")?;
        }

        task.deleted_at = Some(now);
        Ok(TaskView { task, options, unit_ids })
      })
      .await
  }

  async fn link_task_unit(&self, task_id: Uuid, unit_id: Uuid) -> Result<TaskView> {
    self
      .write_tx(move |tx| {
        let task_str = encode_uuid(task_id);
        if !row_exists(tx, "SELECT 1 FROM tasks WHERE task_id = ?1", &task_str)? {
          return Err(CoreError::TaskNotFound(task_id).into());
        }
        if !row_exists(tx, "SELECT 1 FROM units WHERE unit_id = ?1", &encode_uuid(unit_id))? {
          return Err(CoreError::UnitNotFound(unit_id).into());
        }
        tx.execute(
          "INSERT OR IGNORE INTO unit_tasks (unit_id, task_id) VALUES (?1, ?2)",
          rusqlite::params![encode_uuid(unit_id), task_str],
        )?;
        match load_view(tx, &task_str)? {
          Some(view) => Ok(view),
          None => Err(CoreError::TaskNotFound(task_id).into()),
        }
      })
      .await
  }

  async fn unlink_task_unit(&self, task_id: Uuid, unit_id: Uuid) -> Result<TaskView> {
    self
      .write_tx(move |tx| {
        let task_str = encode_uuid(task_id);
        if !row_exists(tx, "SELECT 1 FROM tasks WHERE task_id = ?1", &task_str)? {
          return Err(CoreError::TaskNotFound(task_id).into());
        }
        if !row_exists(tx, "SELECT 1 FROM units WHERE unit_id = ?1", &encode_uuid(unit_id))? {
          return Err(CoreError::UnitNotFound(unit_id).into());
        }
        tx.execute(
          "DELETE FROM unit_tasks WHERE unit_id = ?1 AND task_id = ?2",
          rusqlite::params![encode_uuid(unit_id), task_str],
        )?;
        match load_view(tx, &task_str)? {
          Some(view) => Ok(view),
          None => Err(CoreError::TaskNotFound(task_id).into()),
        }
      })
      .await
  }

  // ── Answers ───────────────────────────────────────────────────────────────

  async fn submit_answer(
    &self,
    task_id: Uuid,
    principal_id: Uuid,
    submission: AnswerSubmission,
  ) -> Result<AnswerEvent> {
    let policy = self.policy;

    self
      .write_tx(move |tx| {
        let now = Utc::now();
        let task_str = encode_uuid(task_id);

        let Some(task) = load_task(tx, &task_str)? else {
          return Err(CoreError::TaskNotFound(task_id).into());
        };
        if task.is_deleted() {
          return Err(CoreError::TaskDeleted(task_id).into());
        }

        let (option_id, free_text, result) = match task.kind {
          TaskKind::MultipleChoice => {
            let Some(option_id) = submission.option_id else {
              return Err(CoreError::MissingOption.into());
            };
            let is_correct: Option<bool> = tx
              .query_row(
                "SELECT is_correct FROM answer_options
                 WHERE option_id = ?1 AND task_id = ?2",
                rusqlite::params![encode_uuid(option_id), task_str],
                |row| row.get(0),
              )
              .optional()?;
            let Some(is_correct) = is_correct else {
              return Err(CoreError::OptionNotOnTask { option_id, task_id }.into());
            };
            let result = if is_correct {
              AnswerResult::Correct
            } else {
              AnswerResult::Incorrect
            };
            (Some(option_id), None, result)
          }
          TaskKind::FreeText => {
            let Some(free_text) = submission.free_text else {
              return Err(CoreError::MissingFreeText.into());
            };
            let Some(score) = submission.score else {
              return Err(CoreError::MissingScore.into());
            };
            if !(0..=100).contains(&score) {
              return Err(CoreError::ScoreOutOfRange(score).into());
            }
            (None, Some(free_text), policy.judge(score))
          }
        };

        let event = AnswerEvent {
          answer_id: Uuid::new_v4(),
          task_id,
          principal_id,
          option_id,
          free_text,
          result,
          recorded_at: now,
        };
        tx.execute(
          "INSERT INTO task_answers (answer_id, task_id, principal_id, option_id,
                                     free_text, result, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            encode_uuid(event.answer_id),
            task_str,
            encode_uuid(principal_id),
            event.option_id.map(encode_uuid),
            event.free_text.as_deref(),
            event.result.discriminant(),
            encode_dt(now),
          ],
        )?;

        let column = match result {
          AnswerResult::Correct => "times_correct",
          AnswerResult::Incorrect => "times_incorrect",
          AnswerResult::Partial => "times_partial",
        };
        tx.execute(
          &format!(
            "INSERT INTO task_user_stats (task_id, principal_id, {column})
             VALUES (?1, ?2, 1)
             ON CONFLICT(task_id, principal_id)
             DO UPDATE SET {column} = {column} + 1"
          ),
          rusqlite::params![task_str, encode_uuid(principal_id)],
        )?;

        Ok(event)
      })
      .await
  }

  // ── History & audit ───────────────────────────────────────────────────────

  async fn snapshot(&self, task_id: Uuid, version: i64) -> Result<Option<TaskVersion>> {
    self
      .read(move |conn| load_snapshot(conn, &encode_uuid(task_id), Some(version)))
      .await
  }

  async fn latest_snapshot(&self, task_id: Uuid) -> Result<Option<TaskVersion>> {
    self
      .read(move |conn| load_snapshot(conn, &encode_uuid(task_id), None))
      .await
  }

  async fn compare_versions(
    &self,
    task_id: Uuid,
    from: i64,
    to: i64,
  ) -> Result<VersionDiff> {
    self
      .read(move |conn| {
        let task_str = encode_uuid(task_id);
        let from_snap = load_snapshot(conn, &task_str, Some(from))?
          .ok_or(CoreError::VersionNotFound { task_id, version: from })?;
        let to_snap = load_snapshot(conn, &task_str, Some(to))?
          .ok_or(CoreError::VersionNotFound { task_id, version: to })?;
        Ok(VersionDiff::between(&from_snap, &to_snap))
      })
      .await
  }

  async fn record_change(&self, input: NewChangeEvent) -> Result<ChangeEvent> {
    let event = change_event(input, Utc::now());
    let stored = event.clone();

    self
      .write_tx(move |tx| {
        insert_change(tx, &stored)?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn change_events(&self, task_id: Uuid) -> Result<Vec<ChangeEvent>> {
    let task_str = encode_uuid(task_id);

    let raws: Vec<RawChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, task_id, kind, actor_id, option_id, old_value,
                  new_value, metadata, recorded_at
           FROM task_changes WHERE task_id = ?1
           ORDER BY recorded_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![task_str], |row| {
            Ok(RawChange {
              event_id:    row.get(0)?,
              task_id:     row.get(1)?,
              kind:        row.get(2)?,
              actor_id:    row.get(3)?,
              option_id:   row.get(4)?,
              old_value:   row.get(5)?,
              new_value:   row.get(6)?,
              metadata:    row.get(7)?,
              recorded_at: row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChange::into_change).collect()
  }

  async fn answer_events(&self, task_id: Uuid) -> Result<Vec<AnswerEvent>> {
    let task_str = encode_uuid(task_id);

    let raws: Vec<RawAnswer> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT answer_id, task_id, principal_id, option_id, free_text,
                  result, recorded_at
           FROM task_answers WHERE task_id = ?1
           ORDER BY recorded_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![task_str], |row| {
            Ok(RawAnswer {
              answer_id:    row.get(0)?,
              task_id:      row.get(1)?,
              principal_id: row.get(2)?,
              option_id:    row.get(3)?,
              free_text:    row.get(4)?,
              result:       row.get(5)?,
              recorded_at:  row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAnswer::into_answer).collect()
  }

  // ── Counters ──────────────────────────────────────────────────────────────

  async fn repository_stats(&self, repository_id: Uuid) -> Result<RepositoryStats> {
    self
      .read(move |conn| {
        let repo_str = encode_uuid(repository_id);
        if !row_exists(conn, "SELECT 1 FROM repositories WHERE repository_id = ?1", &repo_str)? {
          return Err(CoreError::RepositoryNotFound(repository_id).into());
        }
        let row: Option<(i64, i64, i64)> = conn
          .query_row(
            "SELECT total_created, total_modified, total_deleted
             FROM repository_stats WHERE repository_id = ?1",
            rusqlite::params![repo_str],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;
        Ok(match row {
          Some((created, modified, deleted)) => RepositoryStats {
            repository_id,
            total_created:  created,
            total_modified: modified,
            total_deleted:  deleted,
          },
          None => RepositoryStats::empty(repository_id),
        })
      })
      .await
  }

  async fn task_user_stats(
    &self,
    task_id: Uuid,
    principal_id: Uuid,
  ) -> Result<Option<TaskUserStats>> {
    self
      .read(move |conn| {
        let row: Option<(i64, i64, i64)> = conn
          .query_row(
            "SELECT times_correct, times_incorrect, times_partial
             FROM task_user_stats WHERE task_id = ?1 AND principal_id = ?2",
            rusqlite::params![encode_uuid(task_id), encode_uuid(principal_id)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;
        Ok(row.map(|(correct, incorrect, partial)| TaskUserStats {
          task_id,
          principal_id,
          times_correct:   correct,
          times_incorrect: incorrect,
          times_partial:   partial,
        }))
      })
      .await
  }
}
