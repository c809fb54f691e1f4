//! Free-text grading: the score scale, the result thresholds, and the
//! pluggable grader seam.

use async_trait::async_trait;

use crate::{audit::AnswerResult, task::Task};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Maps a 0..=100 grader score onto an [`AnswerResult`].
///
/// Scores at or above `correct_min` are correct, at or above
/// `partial_min` are partial, anything below is incorrect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradingPolicy {
  pub correct_min: i64,
  pub partial_min: i64,
}

impl Default for GradingPolicy {
  fn default() -> Self { Self { correct_min: 90, partial_min: 50 } }
}

impl GradingPolicy {
  /// Classify a score already validated to lie in 0..=100.
  pub fn judge(&self, score: i64) -> AnswerResult {
    if score >= self.correct_min {
      AnswerResult::Correct
    } else if score >= self.partial_min {
      AnswerResult::Partial
    } else {
      AnswerResult::Incorrect
    }
  }
}

// ─── Grader ──────────────────────────────────────────────────────────────────

/// A grader's verdict on one free-text answer.
#[derive(Debug, Clone)]
pub struct GradeOutcome {
  /// Score on the 0..=100 scale.
  pub score:    i64,
  /// Optional prose for the learner.
  pub feedback: Option<String>,
}

/// Scores free-text answers against a task's question.
///
/// Implementations typically call out to an external service, so grading
/// happens before the answer transaction opens, never inside it.
#[async_trait]
pub trait Grader: Send + Sync {
  /// Grade `answer` as a response to `task`'s question.
  async fn grade(&self, task: &Task, answer: &str) -> Result<GradeOutcome, GraderError>;
}

/// Failure surface for graders. Callers report it; nothing branches on
/// its contents.
#[derive(Debug, thiserror::Error)]
#[error("grader failed: {0}")]
pub struct GraderError(pub String);

// ─── Tests ───────────────────────────────────────────────────────────────────
