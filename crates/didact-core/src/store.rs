//! The `TaskStore` trait — the seam between domain logic and storage.
//!
//! The trait is implemented by storage backends (e.g. `didact-store-sqlite`).
//! Higher layers (`didact-api`, `didact-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  access::{AccessGrant, AccessLevel, EntityRef},
  audit::{AnswerEvent, AnswerSubmission, ChangeEvent, NewChangeEvent},
  graph::{
    Chunk, Document, NewChunk, NewDocument, NewPrincipal, NewRepository,
    NewUnit, Principal, Repository, Unit,
  },
  stats::{RepositoryStats, TaskUserStats},
  task::{NewTask, TaskPatch, TaskView},
  version::{TaskVersion, VersionDiff},
};

/// Abstraction over a Didact task store backend.
///
/// Mutating task operations run as single transactions in the backend:
/// snapshotting, field writes, audit events and counter updates of one call
/// land atomically or not at all. Access checks are plain reads; callers
/// gate with [`TaskStore::check_access`] before invoking a mutation.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait TaskStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Principals & repositories ─────────────────────────────────────────

  /// Create a principal. `name` is unique store-wide; the password hash is
  /// stored opaquely.
  fn create_principal(
    &self,
    input: NewPrincipal,
  ) -> impl Future<Output = Result<Principal, Self::Error>> + Send + '_;

  /// Look up a principal by its unique name. Returns `None` if not found.
  fn principal_by_name<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + 'a;

  /// Create a repository. The owner needs no grant row: ownership itself
  /// resolves to [`AccessLevel::Owner`].
  fn create_repository(
    &self,
    input: NewRepository,
  ) -> impl Future<Output = Result<Repository, Self::Error>> + Send + '_;

  /// Grant `principal_id` access to a repository, or change the level of
  /// an existing grant.
  fn grant_access(
    &self,
    repository_id: Uuid,
    principal_id: Uuid,
    level: AccessLevel,
  ) -> impl Future<Output = Result<AccessGrant, Self::Error>> + Send + '_;

  /// Remove a principal's grant. Returns `false` if there was none.
  fn revoke_access(
    &self,
    repository_id: Uuid,
    principal_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Content graph ─────────────────────────────────────────────────────

  /// Create a document. Documents are standalone; visibility comes from
  /// [`TaskStore::link_document`].
  fn create_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  /// Put a document into a repository. Linking twice is a no-op.
  fn link_document(
    &self,
    repository_id: Uuid,
    document_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append a chunk to a document.
  fn create_chunk(
    &self,
    input: NewChunk,
  ) -> impl Future<Output = Result<Chunk, Self::Error>> + Send + '_;

  /// Create a unit inside a repository.
  fn create_unit(
    &self,
    input: NewUnit,
  ) -> impl Future<Output = Result<Unit, Self::Error>> + Send + '_;

  // ── Access resolution ─────────────────────────────────────────────────

  /// Resolve whether `principal_id` holds at least `required` on `entity`.
  ///
  /// Fails with the entity's not-found error when the entity is missing,
  /// with `NotLinked` when the entity reaches no repository at all, and
  /// with `AccessDenied` when the principal's effective level over every
  /// reachable repository falls short.
  fn check_access(
    &self,
    principal_id: Uuid,
    entity: EntityRef,
    required: AccessLevel,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Tasks ─────────────────────────────────────────────────────────────

  /// Create a task with its options and unit links. Increments the
  /// created-counter of each distinct repository the named units belong
  /// to. Writes no snapshot and no change event.
  fn create_task(
    &self,
    input: NewTask,
    actor_id: Uuid,
  ) -> impl Future<Output = Result<TaskView, Self::Error>> + Send + '_;

  /// Fetch a task with its live options and unit links. Returns `None` if
  /// the id is unknown; soft-deleted tasks are still returned.
  fn get_task(
    &self,
    task_id: Uuid,
  ) -> impl Future<Output = Result<Option<TaskView>, Self::Error>> + Send + '_;

  /// Apply a partial update: snapshot the prior state, write the changed
  /// fields, reconcile options, record audit events, and flip the
  /// modified flag on first change.
  fn update_task(
    &self,
    task_id: Uuid,
    patch: TaskPatch,
    actor_id: Uuid,
  ) -> impl Future<Output = Result<TaskView, Self::Error>> + Send + '_;

  /// Soft-delete a task: snapshot, stamp `deleted_at`, record a `Deleted`
  /// event, bump the deleted-counters. Deleting an already-deleted task
  /// returns it unchanged and writes nothing.
  fn soft_delete_task(
    &self,
    task_id: Uuid,
    actor_id: Uuid,
  ) -> impl Future<Output = Result<TaskView, Self::Error>> + Send + '_;

  /// Link a task into a unit. Linking an existing pair is a no-op.
  fn link_task_unit(
    &self,
    task_id: Uuid,
    unit_id: Uuid,
  ) -> impl Future<Output = Result<TaskView, Self::Error>> + Send + '_;

  /// Remove a task–unit link. Unlinking the last unit is allowed; the
  /// task then resolves to no repository and nobody can reach it.
  fn unlink_task_unit(
    &self,
    task_id: Uuid,
    unit_id: Uuid,
  ) -> impl Future<Output = Result<TaskView, Self::Error>> + Send + '_;

  // ── Answers ───────────────────────────────────────────────────────────

  /// Judge and record one answer attempt, updating the per-(task,
  /// principal) tallies in the same transaction.
  ///
  /// Multiple choice requires `option_id` naming an option of this task;
  /// free text requires `free_text` plus a 0..=100 `score` (graded before
  /// this call).
  fn submit_answer(
    &self,
    task_id: Uuid,
    principal_id: Uuid,
    submission: AnswerSubmission,
  ) -> impl Future<Output = Result<AnswerEvent, Self::Error>> + Send + '_;

  // ── History & audit ───────────────────────────────────────────────────

  /// Fetch one snapshot by its per-task version number. Returns `None` if
  /// that version was never recorded.
  fn snapshot(
    &self,
    task_id: Uuid,
    version: i64,
  ) -> impl Future<Output = Result<Option<TaskVersion>, Self::Error>> + Send + '_;

  /// Fetch the highest-numbered snapshot. Returns `None` for a task that
  /// has never been mutated.
  fn latest_snapshot(
    &self,
    task_id: Uuid,
  ) -> impl Future<Output = Result<Option<TaskVersion>, Self::Error>> + Send + '_;

  /// Compute the structural difference between two recorded snapshots.
  /// Fails with `VersionNotFound` naming whichever endpoint is missing.
  fn compare_versions(
    &self,
    task_id: Uuid,
    from: i64,
    to: i64,
  ) -> impl Future<Output = Result<VersionDiff, Self::Error>> + Send + '_;

  /// Append a change event directly, outside the update orchestration.
  /// Pure append: no validation beyond storage itself, and the event's
  /// content is the caller's claim.
  fn record_change(
    &self,
    input: NewChangeEvent,
  ) -> impl Future<Output = Result<ChangeEvent, Self::Error>> + Send + '_;

  /// A task's change log, oldest first.
  fn change_events(
    &self,
    task_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ChangeEvent>, Self::Error>> + Send + '_;

  /// A task's answer attempts, oldest first.
  fn answer_events(
    &self,
    task_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AnswerEvent>, Self::Error>> + Send + '_;

  // ── Counters ──────────────────────────────────────────────────────────

  /// A repository's lifetime counters. Repositories nothing has touched
  /// report zeros.
  fn repository_stats(
    &self,
    repository_id: Uuid,
  ) -> impl Future<Output = Result<RepositoryStats, Self::Error>> + Send + '_;

  /// One principal's answer tallies for one task. Returns `None` if the
  /// principal has never answered it.
  fn task_user_stats(
    &self,
    task_id: Uuid,
    principal_id: Uuid,
  ) -> impl Future<Output = Result<Option<TaskUserStats>, Self::Error>> + Send + '_;
}
