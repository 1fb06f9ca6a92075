//! Grace-period tracking: who is already active where.
//!
//! A user who just spoke in a channel is present in the conversation
//! and should not be re-notified there for a window derived from their
//! own timeout setting. [`TimedSet`] holds channel ids with independent
//! per-member expiry; [`GracePeriodTracker`] keeps one set per owner.
//!
//! Expiry uses a min-heap of deadlines purged lazily on access and from
//! the dispatcher's tick, so high message volume never piles up timer
//! tasks.

use crate::message::{ChannelId, UserId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// A set whose members expire independently, `decay` after insertion.
///
/// Re-inserting a member that is still present is a no-op: the original
/// deadline stands. Re-inserting after expiry starts a fresh window.
#[derive(Debug)]
pub struct TimedSet<T> {
    decay: Duration,
    deadlines: HashMap<T, Instant>,
    expiries: BinaryHeap<Reverse<(Instant, T)>>,
}

impl<T> TimedSet<T>
where
    T: Copy + Eq + Hash + Ord,
{
    /// Create an empty set whose members live for `decay`.
    pub fn new(decay: Duration) -> Self {
        Self {
            decay,
            deadlines: HashMap::new(),
            expiries: BinaryHeap::new(),
        }
    }

    /// The per-member lifetime.
    pub fn decay(&self) -> Duration {
        self.decay
    }

    /// Insert a member, starting its expiry window.
    ///
    /// Returns `false` without touching the existing deadline when the
    /// member is already present and unexpired.
    pub fn insert(&mut self, member: T) -> bool {
        self.purge();
        if self.contains(member) {
            return false;
        }
        let deadline = Instant::now() + self.decay;
        self.deadlines.insert(member, deadline);
        self.expiries.push(Reverse((deadline, member)));
        true
    }

    /// O(1) membership test; expired members are absent.
    pub fn contains(&self, member: T) -> bool {
        self.deadlines
            .get(&member)
            .is_some_and(|deadline| *deadline > Instant::now())
    }

    /// Drop every member whose deadline has passed.
    pub fn purge(&mut self) {
        let now = Instant::now();
        while let Some(Reverse((deadline, member))) = self.expiries.peek().copied() {
            if deadline > now {
                break;
            }
            self.expiries.pop();
            // Only remove when the map still holds this exact deadline;
            // a newer window after expiry owns its own heap entry.
            if self.deadlines.get(&member) == Some(&deadline) {
                self.deadlines.remove(&member);
            }
        }
    }

    /// Number of live members.
    pub fn len(&mut self) -> usize {
        self.purge();
        self.deadlines.len()
    }

    /// True when no live members remain.
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

/// One [`TimedSet`] of recently-active channels per owner.
#[derive(Debug, Default)]
pub struct GracePeriodTracker {
    sets: HashMap<UserId, TimedSet<ChannelId>>,
}

impl GracePeriodTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a set for `owner` if none exists yet.
    pub fn ensure(&mut self, owner: UserId, decay: Duration) {
        self.sets.entry(owner).or_insert_with(|| TimedSet::new(decay));
    }

    /// Replace `owner`'s set with a fresh one using the new decay.
    ///
    /// All pending expiries are cancelled; the new duration applies
    /// only to future insertions.
    pub fn reset(&mut self, owner: UserId, decay: Duration) {
        self.sets.insert(owner, TimedSet::new(decay));
    }

    /// Drop `owner`'s set entirely (profile deletion).
    pub fn remove(&mut self, owner: UserId) {
        self.sets.remove(&owner);
    }

    /// The decay currently configured for `owner`, if tracked.
    pub fn decay_of(&self, owner: UserId) -> Option<Duration> {
        self.sets.get(&owner).map(TimedSet::decay)
    }

    /// Record that `owner` just posted in `channel`.
    ///
    /// No-op for untracked owners and for channels already in grace
    /// (the existing window is never extended).
    pub fn mark_active(&mut self, owner: UserId, channel: ChannelId) {
        if let Some(set) = self.sets.get_mut(&owner) {
            set.insert(channel);
        }
    }

    /// True when `owner` is currently in grace for `channel`.
    pub fn in_grace(&self, owner: UserId, channel: ChannelId) -> bool {
        self.sets.get(&owner).is_some_and(|set| set.contains(channel))
    }

    /// Purge expired members from every owner's set.
    pub fn purge_expired(&mut self) {
        for set in self.sets.values_mut() {
            set.purge();
        }
    }
}
