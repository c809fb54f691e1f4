//! Integration tests for `SqliteStore` against an in-memory database.

use didact_core::{
  access::{AccessLevel, EntityRef},
  audit::{AnswerResult, AnswerSubmission, ChangeKind, NewChangeEvent},
  grading::GradingPolicy,
  graph::{
    Chunk, Document, NewChunk, NewDocument, NewPrincipal, NewRepository,
    NewUnit, Principal, Repository, Unit,
  },
  store::TaskStore,
  task::{NewTask, OptionInput, TaskKind, TaskPatch},
  Error as CoreError,
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// One principal owning one repository, with a linked document, one chunk
/// of it, and one unit.
struct World {
  owner:      Principal,
  repository: Repository,
  document:   Document,
  chunk:      Chunk,
  unit:       Unit,
}

async fn world(s: &SqliteStore) -> World {
  let owner = s
    .create_principal(NewPrincipal {
      name:          "alice".into(),
      password_hash: "hash-alice".into(),
    })
    .await
    .unwrap();
  let repository = s
    .create_repository(NewRepository {
      name:     "biology".into(),
      owner_id: owner.principal_id,
    })
    .await
    .unwrap();
  let document = s
    .create_document(NewDocument { title: "cells".into() })
    .await
    .unwrap();
  s.link_document(repository.repository_id, document.document_id)
    .await
    .unwrap();
  let chunk = s
    .create_chunk(NewChunk {
      document_id: document.document_id,
      position:    0,
      content:     "The mitochondrion produces most of the cell's ATP.".into(),
    })
    .await
    .unwrap();
  let unit = s
    .create_unit(NewUnit {
      repository_id: repository.repository_id,
      title:         "organelles".into(),
    })
    .await
    .unwrap();
  World { owner, repository, document, chunk, unit }
}

async fn principal(s: &SqliteStore, name: &str) -> Principal {
  s.create_principal(NewPrincipal {
    name:          name.into(),
    password_hash: format!("hash-{name}"),
  })
  .await
  .unwrap()
}

fn mc_task(chunk_id: Uuid, unit_id: Uuid) -> NewTask {
  NewTask {
    chunk_id,
    skill_id: None,
    kind: TaskKind::MultipleChoice,
    question: "Which organelle produces ATP?".into(),
    options: vec![
      OptionInput::new("Mitochondrion", true),
      OptionInput::new("Ribosome", false),
    ],
    unit_ids: vec![unit_id],
  }
}

fn ft_task(chunk_id: Uuid, unit_id: Uuid) -> NewTask {
  NewTask {
    chunk_id,
    skill_id: None,
    kind: TaskKind::FreeText,
    question: "Describe what the mitochondrion does.".into(),
    options: vec![],
    unit_ids: vec![unit_id],
  }
}

// ─── Principals & grants ─────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_find_principal() {
  let s = store().await;
  let p = principal(&s, "alice").await;

  let found = s.principal_by_name("alice").await.unwrap().unwrap();
  assert_eq!(found.principal_id, p.principal_id);
  assert_eq!(found.password_hash, "hash-alice");

  assert!(s.principal_by_name("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_principal_name_is_a_constraint_violation() {
  let s = store().await;
  principal(&s, "alice").await;

  let err = s
    .create_principal(NewPrincipal {
      name:          "alice".into(),
      password_hash: "other".into(),
    })
    .await
    .unwrap_err();
  assert!(err.is_constraint_violation());
}

#[tokio::test]
async fn revoke_reports_whether_a_grant_existed() {
  let s = store().await;
  let w = world(&s).await;
  let bob = principal(&s, "bob").await;

  s.grant_access(w.repository.repository_id, bob.principal_id, AccessLevel::Read)
    .await
    .unwrap();
  assert!(s
    .revoke_access(w.repository.repository_id, bob.principal_id)
    .await
    .unwrap());
  assert!(!s
    .revoke_access(w.repository.repository_id, bob.principal_id)
    .await
    .unwrap());

  let err = s
    .revoke_access(Uuid::new_v4(), bob.principal_id)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::RepositoryNotFound(_))
  ));
}

// ─── Access resolution ───────────────────────────────────────────────────────

#[tokio::test]
async fn owner_holds_owner_access_with_no_grant_row() {
  let s = store().await;
  let w = world(&s).await;

  s.check_access(
    w.owner.principal_id,
    EntityRef::Repository(w.repository.repository_id),
    AccessLevel::Owner,
  )
  .await
  .unwrap();
  s.check_access(
    w.owner.principal_id,
    EntityRef::Unit(w.unit.unit_id),
    AccessLevel::Write,
  )
  .await
  .unwrap();
}

#[tokio::test]
async fn grants_resolve_by_level() {
  let s = store().await;
  let w = world(&s).await;
  let bob = principal(&s, "bob").await;

  let err = s
    .check_access(
      bob.principal_id,
      EntityRef::Repository(w.repository.repository_id),
      AccessLevel::Read,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::AccessDenied { .. })));

  s.grant_access(w.repository.repository_id, bob.principal_id, AccessLevel::Read)
    .await
    .unwrap();
  s.check_access(
    bob.principal_id,
    EntityRef::Repository(w.repository.repository_id),
    AccessLevel::Read,
  )
  .await
  .unwrap();

  let err = s
    .check_access(
      bob.principal_id,
      EntityRef::Repository(w.repository.repository_id),
      AccessLevel::Write,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::AccessDenied { .. })));
}

#[tokio::test]
async fn grant_upsert_replaces_level() {
  let s = store().await;
  let w = world(&s).await;
  let bob = principal(&s, "bob").await;

  s.grant_access(w.repository.repository_id, bob.principal_id, AccessLevel::Read)
    .await
    .unwrap();
  s.grant_access(w.repository.repository_id, bob.principal_id, AccessLevel::Write)
    .await
    .unwrap();

  s.check_access(
    bob.principal_id,
    EntityRef::Repository(w.repository.repository_id),
    AccessLevel::Write,
  )
  .await
  .unwrap();
  let err = s
    .check_access(
      bob.principal_id,
      EntityRef::Repository(w.repository.repository_id),
      AccessLevel::Owner,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::AccessDenied { .. })));
}

#[tokio::test]
async fn access_check_on_missing_entities_is_not_found() {
  let s = store().await;
  let w = world(&s).await;

  let err = s
    .check_access(
      w.owner.principal_id,
      EntityRef::Repository(Uuid::new_v4()),
      AccessLevel::Read,
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::RepositoryNotFound(_))
  ));

  let err = s
    .check_access(
      w.owner.principal_id,
      EntityRef::Task(Uuid::new_v4()),
      AccessLevel::Read,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::TaskNotFound(_))));
}

#[tokio::test]
async fn unlinked_document_has_no_access_path() {
  let s = store().await;
  let w = world(&s).await;

  let orphan = s
    .create_document(NewDocument { title: "orphan".into() })
    .await
    .unwrap();
  let err = s
    .check_access(
      w.owner.principal_id,
      EntityRef::Document(orphan.document_id),
      AccessLevel::Read,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::NotLinked { .. })));
}

#[tokio::test]
async fn document_and_chunk_follow_repository_links() {
  let s = store().await;
  let w = world(&s).await;
  let bob = principal(&s, "bob").await;
  s.grant_access(w.repository.repository_id, bob.principal_id, AccessLevel::Read)
    .await
    .unwrap();

  s.check_access(
    bob.principal_id,
    EntityRef::Document(w.document.document_id),
    AccessLevel::Read,
  )
  .await
  .unwrap();
  s.check_access(
    bob.principal_id,
    EntityRef::Chunk(w.chunk.chunk_id),
    AccessLevel::Read,
  )
  .await
  .unwrap();

  let err = s
    .check_access(
      bob.principal_id,
      EntityRef::Chunk(w.chunk.chunk_id),
      AccessLevel::Write,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::AccessDenied { .. })));
}

#[tokio::test]
async fn task_access_is_the_union_of_unit_paths() {
  let s = store().await;
  let w = world(&s).await;

  let repo2 = s
    .create_repository(NewRepository {
      name:     "chemistry".into(),
      owner_id: w.owner.principal_id,
    })
    .await
    .unwrap();
  let unit2 = s
    .create_unit(NewUnit {
      repository_id: repo2.repository_id,
      title:         "atoms".into(),
    })
    .await
    .unwrap();

  let task = s
    .create_task(
      NewTask {
        unit_ids: vec![w.unit.unit_id, unit2.unit_id],
        ..mc_task(w.chunk.chunk_id, w.unit.unit_id)
      },
      w.owner.principal_id,
    )
    .await
    .unwrap();

  // Write access through the second repository alone is enough.
  let bob = principal(&s, "bob").await;
  s.grant_access(repo2.repository_id, bob.principal_id, AccessLevel::Write)
    .await
    .unwrap();
  s.check_access(
    bob.principal_id,
    EntityRef::Task(task.task.task_id),
    AccessLevel::Write,
  )
  .await
  .unwrap();

  let carol = principal(&s, "carol").await;
  let err = s
    .check_access(
      carol.principal_id,
      EntityRef::Task(task.task.task_id),
      AccessLevel::Read,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::AccessDenied { .. })));
}

#[tokio::test]
async fn unlinking_last_unit_leaves_task_unreachable() {
  let s = store().await;
  let w = world(&s).await;
  let task = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();

  let view = s
    .unlink_task_unit(task.task.task_id, w.unit.unit_id)
    .await
    .unwrap();
  assert!(view.unit_ids.is_empty());

  // Even the repository owner has no path to it now.
  let err = s
    .check_access(
      w.owner.principal_id,
      EntityRef::Task(task.task.task_id),
      AccessLevel::Read,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::NotLinked { .. })));

  // Relinking restores the path.
  s.link_task_unit(task.task.task_id, w.unit.unit_id)
    .await
    .unwrap();
  s.check_access(
    w.owner.principal_id,
    EntityRef::Task(task.task.task_id),
    AccessLevel::Owner,
  )
  .await
  .unwrap();
}

// ─── Task creation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_task_returns_full_view() {
  let s = store().await;
  let w = world(&s).await;

  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  assert_eq!(view.task.kind, TaskKind::MultipleChoice);
  assert_eq!(view.task.question, "Which organelle produces ATP?");
  assert!(!view.task.has_been_modified);
  assert!(view.task.deleted_at.is_none());
  assert_eq!(view.options.len(), 2);
  assert_eq!(view.options[0].text, "Mitochondrion");
  assert!(view.options[0].is_correct);
  assert_eq!(view.unit_ids, vec![w.unit.unit_id]);

  let fetched = s.get_task(view.task.task_id).await.unwrap().unwrap();
  assert_eq!(fetched.task.task_id, view.task.task_id);
  assert_eq!(fetched.options.len(), 2);
  assert_eq!(fetched.options[0].option_id, view.options[0].option_id);
  assert_eq!(fetched.unit_ids, vec![w.unit.unit_id]);

  // Creation produces no audit entry and no snapshot.
  assert!(s.change_events(view.task.task_id).await.unwrap().is_empty());
  assert!(s.latest_snapshot(view.task.task_id).await.unwrap().is_none());
}

#[tokio::test]
async fn create_task_requires_a_unit() {
  let s = store().await;
  let w = world(&s).await;

  let err = s
    .create_task(
      NewTask {
        unit_ids: vec![],
        ..mc_task(w.chunk.chunk_id, w.unit.unit_id)
      },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::NoUnits)));
}

#[tokio::test]
async fn multiple_choice_requires_options() {
  let s = store().await;
  let w = world(&s).await;

  let err = s
    .create_task(
      NewTask {
        options: vec![],
        ..mc_task(w.chunk.chunk_id, w.unit.unit_id)
      },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::OptionsRequired)));
}

#[tokio::test]
async fn free_text_forbids_options() {
  let s = store().await;
  let w = world(&s).await;

  let err = s
    .create_task(
      NewTask {
        options: vec![OptionInput::new("stray", true)],
        ..ft_task(w.chunk.chunk_id, w.unit.unit_id)
      },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::OptionsForbidden)));
}

#[tokio::test]
async fn create_task_with_unknown_unit_fails() {
  let s = store().await;
  let w = world(&s).await;

  let err = s
    .create_task(
      NewTask {
        unit_ids: vec![Uuid::new_v4()],
        ..mc_task(w.chunk.chunk_id, w.unit.unit_id)
      },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::UnitNotFound(_))));
}

#[tokio::test]
async fn creation_counts_once_per_repository() {
  let s = store().await;
  let w = world(&s).await;

  // Untouched repositories report zeros.
  let stats = s.repository_stats(w.repository.repository_id).await.unwrap();
  assert_eq!(stats.total_created, 0);

  // Two units of the same repository still count a creation once.
  let unit_b = s
    .create_unit(NewUnit {
      repository_id: w.repository.repository_id,
      title:         "membranes".into(),
    })
    .await
    .unwrap();
  s.create_task(
    NewTask {
      unit_ids: vec![w.unit.unit_id, unit_b.unit_id],
      ..mc_task(w.chunk.chunk_id, w.unit.unit_id)
    },
    w.owner.principal_id,
  )
  .await
  .unwrap();
  let stats = s.repository_stats(w.repository.repository_id).await.unwrap();
  assert_eq!(stats.total_created, 1);

  // Units of two repositories count once for each.
  let repo2 = s
    .create_repository(NewRepository {
      name:     "chemistry".into(),
      owner_id: w.owner.principal_id,
    })
    .await
    .unwrap();
  let unit_c = s
    .create_unit(NewUnit {
      repository_id: repo2.repository_id,
      title:         "atoms".into(),
    })
    .await
    .unwrap();
  s.create_task(
    NewTask {
      unit_ids: vec![w.unit.unit_id, unit_c.unit_id],
      ..mc_task(w.chunk.chunk_id, w.unit.unit_id)
    },
    w.owner.principal_id,
  )
  .await
  .unwrap();

  assert_eq!(
    s.repository_stats(w.repository.repository_id)
      .await
      .unwrap()
      .total_created,
    2
  );
  assert_eq!(
    s.repository_stats(repo2.repository_id).await.unwrap().total_created,
    1
  );
}

// ─── Updates & versions ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_update_snapshots_the_original() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  let updated = s
    .update_task(
      task_id,
      TaskPatch {
        question: Some("Which organelle makes ATP?".into()),
        ..Default::default()
      },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  assert_eq!(updated.task.question, "Which organelle makes ATP?");
  assert!(updated.task.has_been_modified);

  // The snapshot holds the pre-update state, options included.
  let snap = s.latest_snapshot(task_id).await.unwrap().unwrap();
  assert_eq!(snap.version, 1);
  assert_eq!(snap.question, "Which organelle produces ATP?");
  assert_eq!(snap.options.len(), 2);

  let events = s.change_events(task_id).await.unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].kind, ChangeKind::QuestionUpdated);
  assert_eq!(
    events[0].old_value.as_deref(),
    Some("Which organelle produces ATP?")
  );
  assert_eq!(
    events[0].new_value.as_deref(),
    Some("Which organelle makes ATP?")
  );
  assert_eq!(events[0].metadata, json!({ "version": 1 }));
  assert_eq!(events[1].kind, ChangeKind::Modified);
}

#[tokio::test]
async fn version_numbers_increment_per_task() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  for question in ["Q1", "Q2", "Q3"] {
    s.update_task(
      task_id,
      TaskPatch { question: Some(question.into()), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  }

  let snap1 = s.snapshot(task_id, 1).await.unwrap().unwrap();
  assert_eq!(snap1.question, "Which organelle produces ATP?");
  let snap2 = s.snapshot(task_id, 2).await.unwrap().unwrap();
  assert_eq!(snap2.question, "Q1");
  let snap3 = s.snapshot(task_id, 3).await.unwrap().unwrap();
  assert_eq!(snap3.question, "Q2");

  assert_eq!(s.latest_snapshot(task_id).await.unwrap().unwrap().version, 3);
  assert!(s.snapshot(task_id, 4).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_updates_assign_distinct_versions() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  let editor = w.owner.principal_id;

  // Every racer rewrites the question to its own wording, so each update
  // is a real change no matter which order they land in.
  let mut handles = Vec::new();
  for i in 0..8 {
    let s = s.clone();
    handles.push(tokio::spawn(async move {
      s.update_task(
        task_id,
        TaskPatch { question: Some(format!("wording {i}")), ..Default::default() },
        editor,
      )
      .await
      .unwrap();
    }));
  }
  for handle in handles {
    handle.await.unwrap();
  }

  // Eight racing edits got versions 1..=8, no gaps, no repeats.
  assert_eq!(s.latest_snapshot(task_id).await.unwrap().unwrap().version, 8);
  for version in 1..=8 {
    let snap = s.snapshot(task_id, version).await.unwrap().unwrap();
    assert_eq!(snap.version, version);
  }
  assert!(s.snapshot(task_id, 9).await.unwrap().is_none());

  let stats = s.repository_stats(w.repository.repository_id).await.unwrap();
  assert_eq!(stats.total_modified, 1);
}

#[tokio::test]
async fn empty_patch_changes_nothing() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  let after = s
    .update_task(task_id, TaskPatch::default(), w.owner.principal_id)
    .await
    .unwrap();
  assert!(!after.task.has_been_modified);
  assert_eq!(after.task.question, view.task.question);
  assert!(s.latest_snapshot(task_id).await.unwrap().is_none());
  assert!(s.change_events(task_id).await.unwrap().is_empty());

  // A field set to its current value is not a change either.
  s.update_task(
    task_id,
    TaskPatch {
      question: Some(view.task.question.clone()),
      ..Default::default()
    },
    w.owner.principal_id,
  )
  .await
  .unwrap();
  assert!(s.latest_snapshot(task_id).await.unwrap().is_none());
  assert!(s.change_events(task_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn identical_option_set_snapshots_without_events() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  // Same options, different order: a snapshot is cut, nothing else moves.
  let after = s
    .update_task(
      task_id,
      TaskPatch {
        options: Some(vec![
          OptionInput::new("Ribosome", false),
          OptionInput::new("Mitochondrion", true),
        ]),
        ..Default::default()
      },
      w.owner.principal_id,
    )
    .await
    .unwrap();

  assert!(!after.task.has_been_modified);
  assert_eq!(after.options[0].option_id, view.options[0].option_id);
  assert_eq!(after.options[1].option_id, view.options[1].option_id);

  let snap = s.latest_snapshot(task_id).await.unwrap().unwrap();
  assert_eq!(snap.version, 1);
  assert!(s.change_events(task_id).await.unwrap().is_empty());
  assert_eq!(
    s.repository_stats(w.repository.repository_id)
      .await
      .unwrap()
      .total_modified,
    0
  );
}

#[tokio::test]
async fn kept_options_retain_their_ids() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  let kept_id = view.options[0].option_id;
  let removed_id = view.options[1].option_id;

  let after = s
    .update_task(
      task_id,
      TaskPatch {
        options: Some(vec![
          OptionInput::new("Mitochondrion", true),
          OptionInput::new("Chloroplast", false),
        ]),
        ..Default::default()
      },
      w.owner.principal_id,
    )
    .await
    .unwrap();

  assert_eq!(after.options.len(), 2);
  let kept = after
    .options
    .iter()
    .find(|o| o.text == "Mitochondrion")
    .unwrap();
  assert_eq!(kept.option_id, kept_id);
  assert!(after.options.iter().all(|o| o.option_id != removed_id));

  let events = s.change_events(task_id).await.unwrap();
  let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
  assert_eq!(
    kinds,
    vec![ChangeKind::OptionAdded, ChangeKind::OptionDeleted, ChangeKind::Modified]
  );
  assert!(events[0].new_value.as_deref().unwrap().contains("Chloroplast"));
  assert!(events[1].old_value.as_deref().unwrap().contains("Ribosome"));
  assert_eq!(events[1].option_id, Some(removed_id));
}

#[tokio::test]
async fn correctness_flip_replaces_the_option() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  let flipped_id = view.options[0].option_id;
  let untouched_id = view.options[1].option_id;

  let after = s
    .update_task(
      task_id,
      TaskPatch {
        options: Some(vec![
          OptionInput::new("Mitochondrion", false),
          OptionInput::new("Ribosome", false),
        ]),
        ..Default::default()
      },
      w.owner.principal_id,
    )
    .await
    .unwrap();

  let flipped = after
    .options
    .iter()
    .find(|o| o.text == "Mitochondrion")
    .unwrap();
  assert!(!flipped.is_correct);
  assert_ne!(flipped.option_id, flipped_id);

  let untouched = after.options.iter().find(|o| o.text == "Ribosome").unwrap();
  assert_eq!(untouched.option_id, untouched_id);
}

#[tokio::test]
async fn kind_change_must_leave_a_valid_shape() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  // Turning multiple-choice into free-text without dropping the options
  // is rejected, and the failed attempt leaves no snapshot behind.
  let err = s
    .update_task(
      task_id,
      TaskPatch { kind: Some(TaskKind::FreeText), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::OptionsForbidden)));
  assert!(s.latest_snapshot(task_id).await.unwrap().is_none());

  // Dropping them in the same patch goes through.
  let after = s
    .update_task(
      task_id,
      TaskPatch {
        kind:    Some(TaskKind::FreeText),
        options: Some(vec![]),
        ..Default::default()
      },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  assert_eq!(after.task.kind, TaskKind::FreeText);
  assert!(after.options.is_empty());

  // And back to multiple-choice needs options again.
  let err = s
    .update_task(
      task_id,
      TaskPatch {
        kind: Some(TaskKind::MultipleChoice),
        ..Default::default()
      },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::OptionsRequired)));
}

#[tokio::test]
async fn modified_flag_and_counter_fire_once() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  for question in ["first revision", "second revision"] {
    s.update_task(
      task_id,
      TaskPatch { question: Some(question.into()), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  }

  let events = s.change_events(task_id).await.unwrap();
  let modified = events
    .iter()
    .filter(|e| e.kind == ChangeKind::Modified)
    .count();
  assert_eq!(modified, 1);
  assert_eq!(
    s.repository_stats(w.repository.repository_id)
      .await
      .unwrap()
      .total_modified,
    1
  );
}

#[tokio::test]
async fn scalar_field_updates_validate_and_audit() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  // skill_id is set, then cleared; both transitions are audited.
  let skill = Uuid::new_v4();
  let after = s
    .update_task(
      task_id,
      TaskPatch { skill_id: Some(Some(skill)), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  assert_eq!(after.task.skill_id, Some(skill));

  let after = s
    .update_task(
      task_id,
      TaskPatch { skill_id: Some(None), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  assert_eq!(after.task.skill_id, None);

  let events = s.change_events(task_id).await.unwrap();
  assert_eq!(events[0].kind, ChangeKind::Other);
  assert_eq!(events[0].metadata["field"], "skill_id");
  assert_eq!(events[0].old_value, None);
  assert_eq!(events[0].new_value.as_deref(), Some(skill.to_string().as_str()));
  let cleared = events
    .iter()
    .rfind(|e| e.kind == ChangeKind::Other)
    .unwrap();
  assert_eq!(cleared.new_value, None);

  // Moving to another chunk checks the target exists.
  let chunk2 = s
    .create_chunk(NewChunk {
      document_id: w.document.document_id,
      position:    1,
      content:     "Ribosomes translate mRNA into protein.".into(),
    })
    .await
    .unwrap();
  let after = s
    .update_task(
      task_id,
      TaskPatch { chunk_id: Some(chunk2.chunk_id), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  assert_eq!(after.task.chunk_id, chunk2.chunk_id);

  let err = s
    .update_task(
      task_id,
      TaskPatch { chunk_id: Some(Uuid::new_v4()), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::ChunkNotFound(_))));
}

#[tokio::test]
async fn updating_a_deleted_task_conflicts() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  s.soft_delete_task(task_id, w.owner.principal_id).await.unwrap();

  let err = s
    .update_task(
      task_id,
      TaskPatch { question: Some("too late".into()), ..Default::default() },
      w.owner.principal_id,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::TaskDeleted(_))));

  let err = s
    .submit_answer(
      task_id,
      w.owner.principal_id,
      AnswerSubmission {
        option_id: Some(view.options[0].option_id),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::TaskDeleted(_))));
}

// ─── Soft delete ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_snapshots_final_state_and_counts() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  s.update_task(
    task_id,
    TaskPatch { question: Some("final wording".into()), ..Default::default() },
    w.owner.principal_id,
  )
  .await
  .unwrap();

  let deleted = s.soft_delete_task(task_id, w.owner.principal_id).await.unwrap();
  assert!(deleted.task.deleted_at.is_some());

  // Version 2 captures the state the task died in.
  let snap = s.latest_snapshot(task_id).await.unwrap().unwrap();
  assert_eq!(snap.version, 2);
  assert_eq!(snap.question, "final wording");

  let events = s.change_events(task_id).await.unwrap();
  let last = events.last().unwrap();
  assert_eq!(last.kind, ChangeKind::Deleted);
  assert_eq!(last.metadata, json!({ "version": 2 }));

  assert_eq!(
    s.repository_stats(w.repository.repository_id)
      .await
      .unwrap()
      .total_deleted,
    1
  );
}

#[tokio::test]
async fn delete_is_idempotent() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  let first = s.soft_delete_task(task_id, w.owner.principal_id).await.unwrap();
  let second = s.soft_delete_task(task_id, w.owner.principal_id).await.unwrap();
  assert_eq!(second.task.deleted_at, first.task.deleted_at);

  assert_eq!(s.latest_snapshot(task_id).await.unwrap().unwrap().version, 1);
  let events = s.change_events(task_id).await.unwrap();
  let deletes = events
    .iter()
    .filter(|e| e.kind == ChangeKind::Deleted)
    .count();
  assert_eq!(deletes, 1);
  assert_eq!(
    s.repository_stats(w.repository.repository_id)
      .await
      .unwrap()
      .total_deleted,
    1
  );
}

#[tokio::test]
async fn deleted_task_remains_readable() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  s.soft_delete_task(task_id, w.owner.principal_id).await.unwrap();

  let fetched = s.get_task(task_id).await.unwrap().unwrap();
  assert!(fetched.task.is_deleted());
  assert_eq!(fetched.options.len(), 2);
  assert!(!s.change_events(task_id).await.unwrap().is_empty());
  assert!(s.snapshot(task_id, 1).await.unwrap().is_some());
}

// ─── Answers & grading ───────────────────────────────────────────────────────

#[tokio::test]
async fn multiple_choice_answers_grade_by_option() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  let correct = view.options.iter().find(|o| o.is_correct).unwrap();
  let wrong = view.options.iter().find(|o| !o.is_correct).unwrap();
  let bob = principal(&s, "bob").await;

  assert!(s
    .task_user_stats(task_id, bob.principal_id)
    .await
    .unwrap()
    .is_none());

  let e1 = s
    .submit_answer(
      task_id,
      bob.principal_id,
      AnswerSubmission {
        option_id: Some(correct.option_id),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(e1.result, AnswerResult::Correct);
  assert_eq!(e1.option_id, Some(correct.option_id));
  assert_eq!(e1.free_text, None);

  let e2 = s
    .submit_answer(
      task_id,
      bob.principal_id,
      AnswerSubmission {
        option_id: Some(wrong.option_id),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(e2.result, AnswerResult::Incorrect);

  let stats = s
    .task_user_stats(task_id, bob.principal_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(
    (stats.times_correct, stats.times_incorrect, stats.times_partial),
    (1, 1, 0)
  );
  assert_eq!(stats.attempts(), 2);

  let events = s.answer_events(task_id).await.unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].answer_id, e1.answer_id);

  let err = s
    .submit_answer(
      task_id,
      bob.principal_id,
      AnswerSubmission { option_id: Some(Uuid::new_v4()), ..Default::default() },
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::OptionNotOnTask { .. })
  ));
}

#[tokio::test]
async fn free_text_answers_grade_by_thresholds() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(ft_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  let bob = principal(&s, "bob").await;

  let submit = |score: i64| AnswerSubmission {
    free_text: Some("It produces ATP through respiration.".into()),
    score:     Some(score),
    ..Default::default()
  };

  let e = s.submit_answer(task_id, bob.principal_id, submit(95)).await.unwrap();
  assert_eq!(e.result, AnswerResult::Correct);
  assert!(e.free_text.is_some());
  assert_eq!(e.option_id, None);

  let e = s.submit_answer(task_id, bob.principal_id, submit(60)).await.unwrap();
  assert_eq!(e.result, AnswerResult::Partial);

  let e = s.submit_answer(task_id, bob.principal_id, submit(10)).await.unwrap();
  assert_eq!(e.result, AnswerResult::Incorrect);

  let stats = s
    .task_user_stats(task_id, bob.principal_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(
    (stats.times_correct, stats.times_incorrect, stats.times_partial),
    (1, 1, 1)
  );
}

#[tokio::test]
async fn custom_grading_policy_shifts_thresholds() {
  let s = store()
    .await
    .with_policy(GradingPolicy { correct_min: 80, partial_min: 40 });
  let w = world(&s).await;
  let view = s
    .create_task(ft_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  let submit = |score: i64| AnswerSubmission {
    free_text: Some("answer".into()),
    score:     Some(score),
    ..Default::default()
  };

  let e = s
    .submit_answer(task_id, w.owner.principal_id, submit(85))
    .await
    .unwrap();
  assert_eq!(e.result, AnswerResult::Correct);
  let e = s
    .submit_answer(task_id, w.owner.principal_id, submit(45))
    .await
    .unwrap();
  assert_eq!(e.result, AnswerResult::Partial);
  let e = s
    .submit_answer(task_id, w.owner.principal_id, submit(39))
    .await
    .unwrap();
  assert_eq!(e.result, AnswerResult::Incorrect);
}

#[tokio::test]
async fn answer_validation_errors() {
  let s = store().await;
  let w = world(&s).await;
  let mc = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let ft = s
    .create_task(ft_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();

  let err = s
    .submit_answer(mc.task.task_id, w.owner.principal_id, AnswerSubmission::default())
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::MissingOption)));

  let err = s
    .submit_answer(
      ft.task.task_id,
      w.owner.principal_id,
      AnswerSubmission { score: Some(80), ..Default::default() },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::MissingFreeText)));

  let err = s
    .submit_answer(
      ft.task.task_id,
      w.owner.principal_id,
      AnswerSubmission { free_text: Some("answer".into()), ..Default::default() },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::MissingScore)));

  let err = s
    .submit_answer(
      ft.task.task_id,
      w.owner.principal_id,
      AnswerSubmission {
        free_text: Some("answer".into()),
        score:     Some(101),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::ScoreOutOfRange(101))
  ));

  let err = s
    .submit_answer(Uuid::new_v4(), w.owner.principal_id, AnswerSubmission::default())
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::TaskNotFound(_))));
}

#[tokio::test]
async fn answers_survive_option_removal() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  let correct = view.options.iter().find(|o| o.is_correct).unwrap();
  let bob = principal(&s, "bob").await;

  s.submit_answer(
    task_id,
    bob.principal_id,
    AnswerSubmission { option_id: Some(correct.option_id), ..Default::default() },
  )
  .await
  .unwrap();

  // Replace the answered option entirely.
  s.update_task(
    task_id,
    TaskPatch {
      options: Some(vec![
        OptionInput::new("Chloroplast", true),
        OptionInput::new("Ribosome", false),
      ]),
      ..Default::default()
    },
    w.owner.principal_id,
  )
  .await
  .unwrap();

  // The answer row survives with its verdict; only the option reference
  // is cleared.
  let events = s.answer_events(task_id).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].option_id, None);
  assert_eq!(events[0].result, AnswerResult::Correct);

  // The removed option's text lives on in the pre-change snapshot.
  let snap = s.snapshot(task_id, 1).await.unwrap().unwrap();
  assert!(snap.options.iter().any(|o| o.text == "Mitochondrion"));
}

// ─── History & raw audit ─────────────────────────────────────────────────────

#[tokio::test]
async fn compare_versions_reports_field_and_option_changes() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  s.update_task(
    task_id,
    TaskPatch {
      question: Some("Which organelle makes ATP?".into()),
      options:  Some(vec![
        OptionInput::new("Mitochondrion", true),
        OptionInput::new("Chloroplast", false),
      ]),
      ..Default::default()
    },
    w.owner.principal_id,
  )
  .await
  .unwrap();
  s.update_task(
    task_id,
    TaskPatch { question: Some("third wording".into()), ..Default::default() },
    w.owner.principal_id,
  )
  .await
  .unwrap();

  // Versions 1 and 2 bracket the first update.
  let diff = s.compare_versions(task_id, 1, 2).await.unwrap();
  assert_eq!(diff.from_version, 1);
  assert_eq!(diff.to_version, 2);
  let q = diff.question.unwrap();
  assert_eq!(q.from, "Which organelle produces ATP?");
  assert_eq!(q.to, "Which organelle makes ATP?");
  assert!(diff.kind.is_none());
  assert_eq!(diff.options_added.len(), 1);
  assert_eq!(diff.options_added[0].text, "Chloroplast");
  assert_eq!(diff.options_removed.len(), 1);
  assert_eq!(diff.options_removed[0].text, "Ribosome");
}

#[tokio::test]
async fn compare_unknown_version_is_not_found() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;
  s.update_task(
    task_id,
    TaskPatch { question: Some("revised".into()), ..Default::default() },
    w.owner.principal_id,
  )
  .await
  .unwrap();

  let err = s.compare_versions(task_id, 1, 2).await.unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(CoreError::VersionNotFound { version: 2, .. })
  ));
}

#[tokio::test]
async fn record_change_appends_verbatim() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(mc_task(w.chunk.chunk_id, w.unit.unit_id), w.owner.principal_id)
    .await
    .unwrap();
  let task_id = view.task.task_id;

  let mut input =
    NewChangeEvent::new(task_id, ChangeKind::OptionUpdated, w.owner.principal_id);
  input.option_id = Some(view.options[0].option_id);
  input.old_value = Some("Mitochondrion".into());
  input.new_value = Some("Mitochondria".into());
  input.metadata = json!({ "source": "bulk-import" });

  let event = s.record_change(input).await.unwrap();
  assert_eq!(event.kind, ChangeKind::OptionUpdated);

  let events = s.change_events(task_id).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].event_id, event.event_id);
  assert_eq!(events[0].old_value.as_deref(), Some("Mitochondrion"));
  assert_eq!(events[0].new_value.as_deref(), Some("Mitochondria"));
  assert_eq!(events[0].metadata, json!({ "source": "bulk-import" }));

  // A raw append is pure history: no snapshot, no modified flag.
  assert!(!s.get_task(task_id).await.unwrap().unwrap().task.has_been_modified);
  assert!(s.latest_snapshot(task_id).await.unwrap().is_none());
}

#[tokio::test]
async fn record_change_for_unknown_task_is_a_storage_error() {
  let s = store().await;
  let w = world(&s).await;

  let err = s
    .record_change(NewChangeEvent::new(
      Uuid::new_v4(),
      ChangeKind::Other,
      w.owner.principal_id,
    ))
    .await
    .unwrap_err();
  assert!(err.is_constraint_violation());
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn upgraded_grant_unlocks_editing_and_history_records_it() {
  let s = store().await;
  let w = world(&s).await;
  let view = s
    .create_task(
      NewTask {
        question: "Q1".into(),
        options: vec![OptionInput::new("A", true), OptionInput::new("B", false)],
        ..mc_task(w.chunk.chunk_id, w.unit.unit_id)
      },
      w.owner.principal_id,
    )
    .await
    .unwrap();
  let task_id = view.task.task_id;
  let pat = principal(&s, "pat").await;

  // A read grant reaches the task but does not let pat edit it.
  s.grant_access(w.repository.repository_id, pat.principal_id, AccessLevel::Read)
    .await
    .unwrap();
  s.check_access(pat.principal_id, EntityRef::Task(task_id), AccessLevel::Read)
    .await
    .unwrap();
  let err = s
    .check_access(pat.principal_id, EntityRef::Task(task_id), AccessLevel::Write)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Core(CoreError::AccessDenied { .. })));

  s.grant_access(w.repository.repository_id, pat.principal_id, AccessLevel::Write)
    .await
    .unwrap();
  s.check_access(pat.principal_id, EntityRef::Task(task_id), AccessLevel::Write)
    .await
    .unwrap();

  let updated = s
    .update_task(
      task_id,
      TaskPatch { question: Some("Q2".into()), ..Default::default() },
      pat.principal_id,
    )
    .await
    .unwrap();
  assert_eq!(updated.task.question, "Q2");

  // Version 1 froze the original wording; the live row moved on.
  let latest = s.latest_snapshot(task_id).await.unwrap().unwrap();
  assert_eq!(latest.version, 1);
  assert_eq!(latest.question, "Q1");
  assert_eq!(s.get_task(task_id).await.unwrap().unwrap().task.question, "Q2");

  // The audit trail credits the grantee who edited, not the owner.
  let events = s.change_events(task_id).await.unwrap();
  assert_eq!(events[0].actor_id, pat.principal_id);
}
