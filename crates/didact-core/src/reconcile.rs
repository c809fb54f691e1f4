//! Option reconciliation: turn a desired option list into a minimal plan
//! against the live set.
//!
//! Options are matched by value, the `(text, is_correct)` pair, never by
//! id. A desired option matching a live one keeps that live row and its
//! id; anything unmatched on the desired side is an insert, anything
//! unmatched on the live side is a delete. Submitting the current set
//! verbatim therefore produces an empty plan, and a changed text or a
//! flipped correctness flag produces one delete plus one insert.

use std::collections::{HashMap, VecDeque};

use crate::task::{AnswerOption, OptionInput};

/// The computed difference between live and desired option sets.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
  /// Live options matched by a desired entry; these survive unchanged.
  pub keep:   Vec<AnswerOption>,
  /// Desired entries with no live counterpart; to be inserted.
  pub add:    Vec<OptionInput>,
  /// Live options no desired entry matched; to be deleted.
  pub remove: Vec<AnswerOption>,
}

impl ReconcilePlan {
  /// True when applying the plan would change nothing.
  pub fn is_noop(&self) -> bool { self.add.is_empty() && self.remove.is_empty() }
}

/// Match `desired` against `existing` by `(text, is_correct)`.
///
/// Duplicate values pair off one to one, oldest live row first, so two
/// identical desired entries against one live row keep the row and add
/// one copy. `existing` is expected in creation order; the plan's `keep`
/// and `remove` preserve that order, `add` preserves the desired order.
pub fn reconcile(existing: &[AnswerOption], desired: &[OptionInput]) -> ReconcilePlan {
  let mut pool: HashMap<(&str, bool), VecDeque<&AnswerOption>> = HashMap::new();
  for opt in existing {
    pool.entry((opt.text.as_str(), opt.is_correct)).or_default().push_back(opt);
  }

  let mut plan = ReconcilePlan::default();
  for want in desired {
    match pool
      .get_mut(&(want.text.as_str(), want.is_correct))
      .and_then(VecDeque::pop_front)
    {
      Some(matched) => plan.keep.push(matched.clone()),
      None => plan.add.push(want.clone()),
    }
  }

  // Whatever is left in the pool was not asked for.
  plan.remove = existing
    .iter()
    .filter(|opt| {
      pool
        .get(&(opt.text.as_str(), opt.is_correct))
        .is_some_and(|q| q.iter().any(|left| left.option_id == opt.option_id))
    })
    .cloned()
    .collect();

  // Keep `keep` in creation order too, not desired order.
  plan.keep.sort_by_key(|opt| opt.created_at);

  plan
}

// ─── Tests ───────────────────────────────────────────────────────────────────
