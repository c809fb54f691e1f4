//! Aggregate counters, maintained transactionally with the events that
//! drive them rather than recomputed from history.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifetime task counters for one repository.
///
/// `total_created` and `total_deleted` move at most once per task;
/// `total_modified` moves only when a task first becomes modified, so a
/// task edited fifty times still counts once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
  pub repository_id:  Uuid,
  pub total_created:  i64,
  pub total_modified: i64,
  pub total_deleted:  i64,
}

impl RepositoryStats {
  /// The all-zero row reported for repositories nothing has touched yet.
  pub fn empty(repository_id: Uuid) -> Self {
    Self { repository_id, total_created: 0, total_modified: 0, total_deleted: 0 }
  }
}

/// Per-(task, principal) answer tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUserStats {
  pub task_id:         Uuid,
  pub principal_id:    Uuid,
  pub times_correct:   i64,
  pub times_incorrect: i64,
  pub times_partial:   i64,
}

impl TaskUserStats {
  pub fn attempts(&self) -> i64 {
    self.times_correct + self.times_incorrect + self.times_partial
  }
}
