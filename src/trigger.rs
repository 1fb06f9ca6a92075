//! Trigger phrases and the index that owns them.
//!
//! A [`Trigger`] is one user's subscribed phrase plus its compiled
//! matcher. The [`TriggerIndex`] owns every trigger in the engine,
//! grouped by owner, and maintains a flattened view of all triggers for
//! single-pass scanning of inbound messages.
//!
//! The flattened view is a cache. Every structural mutation goes
//! through the index's own methods, which mark it dirty; the next read
//! rebuilds it lazily, so callers never observe a stale view.

use crate::message::UserId;
use crate::store::StoreError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Maximum number of triggers one owner may hold.
pub const MAX_TRIGGERS: usize = 10;

/// Minimum phrase length, in characters.
pub const MIN_PHRASE_LEN: usize = 2;

/// Phrases at or beyond this length are rejected.
pub const MAX_PHRASE_LEN: usize = 99;

/// Errors from trigger lifecycle operations.
///
/// Validation variants are user-correctable and surfaced verbatim;
/// store failures propagate from the persistence layer.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Phrase shorter than [`MIN_PHRASE_LEN`]
    #[error("trigger phrases must contain at least {MIN_PHRASE_LEN} characters")]
    TooShort,

    /// Phrase at or beyond [`MAX_PHRASE_LEN`]
    #[error("trigger phrases cannot be {MAX_PHRASE_LEN} characters or longer")]
    TooLong,

    /// Owner already holds [`MAX_TRIGGERS`] triggers
    #[error("all {MAX_TRIGGERS} trigger slots are in use")]
    QuotaExceeded,

    /// Owner already has a trigger with this exact phrase
    #[error("a trigger with this phrase already exists")]
    Duplicate,

    /// A removal selector pointed outside the owner's list
    #[error("one or more of the provided indices is invalid")]
    IndexOutOfRange,

    /// Persistence failed; in-memory state was left untouched
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Selects which of an owner's triggers to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveSelector {
    /// Remove every trigger the owner holds
    All,
    /// Remove by 1-based position in the owner's current list
    Indices(Vec<usize>),
}

/// One user's subscribed phrase and its compiled matcher.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// The subscribing user
    pub owner_id: UserId,
    /// The raw phrase as the user entered it
    pub phrase: String,
    pattern: Regex,
}

impl Trigger {
    /// Compile a trigger for the given owner and phrase.
    ///
    /// Validates phrase length; quota and duplicate checks belong to
    /// the index, which can see the owner's other triggers.
    pub fn new(owner_id: UserId, phrase: impl Into<String>) -> Result<Self, TriggerError> {
        let phrase = phrase.into();
        let len = phrase.chars().count();
        if len < MIN_PHRASE_LEN {
            return Err(TriggerError::TooShort);
        }
        if len >= MAX_PHRASE_LEN {
            return Err(TriggerError::TooLong);
        }

        Ok(Self {
            pattern: compile_pattern(&phrase),
            owner_id,
            phrase,
        })
    }

    /// True iff the phrase occurs in `text` as a whole word,
    /// case-insensitively.
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Build the case-insensitive whole-word matcher for a phrase.
///
/// The phrase is escaped before interpolation. `\b` only asserts at a
/// word/non-word transition, so it is applied per edge: a phrase that
/// starts or ends in a symbol (`"c++"`) gets no boundary on that edge
/// and stays matchable.
fn compile_pattern(phrase: &str) -> Regex {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if phrase.chars().next().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    let trail = if phrase.chars().last().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    Regex::new(&format!("(?i){lead}{}{trail}", regex::escape(phrase)))
        .expect("escaped phrase is always a valid pattern")
}

/// A validated removal, resolved against a pre-removal snapshot.
///
/// Produced by [`TriggerIndex::plan_removal`]; the caller persists the
/// deletions and then applies the plan, so the in-memory list is only
/// touched after persistence succeeds.
#[derive(Debug)]
pub struct RemovalPlan {
    owner_id: UserId,
    /// Indices to pop, 0-based, sorted descending so earlier
    /// unremoved positions never shift
    indices_desc: Vec<usize>,
    /// Phrases being removed, for the persistence delete
    pub phrases: Vec<String>,
}

/// Owns all triggers, grouped by owner, with a flattened scan view.
#[derive(Debug, Default)]
pub struct TriggerIndex {
    by_owner: HashMap<UserId, Vec<Arc<Trigger>>>,
    flat: Vec<Arc<Trigger>>,
    dirty: bool,
}

impl TriggerIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// An owner's triggers in insertion (display) order.
    pub fn triggers(&self, owner_id: UserId) -> &[Arc<Trigger>] {
        self.by_owner.get(&owner_id).map_or(&[], Vec::as_slice)
    }

    /// True when the owner holds at least one trigger.
    pub fn owns_any(&self, owner_id: UserId) -> bool {
        self.by_owner.get(&owner_id).is_some_and(|l| !l.is_empty())
    }

    /// Total triggers across all owners.
    pub fn len(&self) -> usize {
        self.by_owner.values().map(Vec::len).sum()
    }

    /// True when no owner holds any trigger.
    pub fn is_empty(&self) -> bool {
        self.by_owner.values().all(Vec::is_empty)
    }

    /// Validate that `phrase` could be added for `owner_id` right now.
    ///
    /// Checks quota and duplicates; length is checked by
    /// [`Trigger::new`]. Call before persisting so a rejected add
    /// never reaches the store.
    pub fn validate_add(&self, owner_id: UserId, phrase: &str) -> Result<(), TriggerError> {
        let existing = self.triggers(owner_id);
        if existing.len() >= MAX_TRIGGERS {
            return Err(TriggerError::QuotaExceeded);
        }
        if existing.iter().any(|t| t.phrase == phrase) {
            return Err(TriggerError::Duplicate);
        }
        Ok(())
    }

    /// Append an already-persisted trigger, invalidating the flattened
    /// view.
    pub fn insert(&mut self, trigger: Trigger) -> Arc<Trigger> {
        let trigger = Arc::new(trigger);
        self.by_owner
            .entry(trigger.owner_id)
            .or_default()
            .push(trigger.clone());
        self.dirty = true;
        debug!(owner = %trigger.owner_id, phrase = %trigger.phrase, "Trigger added to index");
        trigger
    }

    /// Resolve a removal selector against the owner's current list.
    ///
    /// Indices are 1-based and validated against a snapshot taken
    /// before any removal; duplicates collapse. `All` on an owner with
    /// no triggers resolves to an empty plan (idempotent).
    pub fn plan_removal(
        &self,
        owner_id: UserId,
        selector: &RemoveSelector,
    ) -> Result<RemovalPlan, TriggerError> {
        let current = self.triggers(owner_id);

        let mut indices_desc: Vec<usize> = match selector {
            RemoveSelector::All => (0..current.len()).collect(),
            RemoveSelector::Indices(raw) => {
                let mut resolved = Vec::with_capacity(raw.len());
                for &index in raw {
                    if index == 0 || index > current.len() {
                        return Err(TriggerError::IndexOutOfRange);
                    }
                    resolved.push(index - 1);
                }
                resolved
            }
        };
        indices_desc.sort_unstable_by(|a, b| b.cmp(a));
        indices_desc.dedup();

        let phrases = indices_desc
            .iter()
            .map(|&i| current[i].phrase.clone())
            .collect();

        Ok(RemovalPlan {
            owner_id,
            indices_desc,
            phrases,
        })
    }

    /// Apply a removal plan, returning the removed triggers.
    ///
    /// Call only after the corresponding deletions have been
    /// persisted. Invalidates the flattened view.
    pub fn apply_removal(&mut self, plan: RemovalPlan) -> Vec<Arc<Trigger>> {
        let mut removed = Vec::with_capacity(plan.indices_desc.len());
        if let Some(list) = self.by_owner.get_mut(&plan.owner_id) {
            for index in plan.indices_desc {
                removed.push(list.remove(index));
            }
            if list.is_empty() {
                self.by_owner.remove(&plan.owner_id);
            }
        }
        if !removed.is_empty() {
            self.dirty = true;
        }
        debug!(owner = %plan.owner_id, removed = removed.len(), "Triggers removed from index");
        removed
    }

    /// Drop every trigger an owner holds (profile deletion).
    pub fn remove_owner(&mut self, owner_id: UserId) {
        if self.by_owner.remove(&owner_id).is_some() {
            self.dirty = true;
            debug!(owner = %owner_id, "Owner removed from index");
        }
    }

    /// The flattened view of all triggers across all owners, rebuilt
    /// lazily after any structural mutation.
    pub fn flattened(&mut self) -> &[Arc<Trigger>] {
        if self.dirty {
            self.flat = self.by_owner.values().flatten().cloned().collect();
            self.dirty = false;
        }
        &self.flat
    }
}
