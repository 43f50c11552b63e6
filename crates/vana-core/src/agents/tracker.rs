//! Delegation/Transfer Tracker
//!
//! Keeps one append-only transfer log per conversation and guards it
//! against runaway chains: a hop ceiling on the chain length and a repeat
//! ceiling on transfers between the same two agents (ping-pong loops).
//!
//! The guard check and the append happen under the conversation's entry
//! lock, so two concurrent delegations in one conversation cannot both
//! pass the guard. Different conversations never contend on the same log.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::types::{ConversationId, HaltReason, RoutingState, TaskId, TaskRequest};
use crate::config::CoordinatorConfig;
use crate::{Error, Result};

/// Ceilings enforced on every guarded append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    /// Maximum delegations along one conversation's chain
    pub max_hops: u32,
    /// Maximum transfers between one unordered pair of agents
    pub max_repeat_transfers: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self::from(&CoordinatorConfig::default())
    }
}

impl From<&CoordinatorConfig> for TransferLimits {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            max_hops: config.max_hops,
            max_repeat_transfers: config.max_repeat_transfers,
        }
    }
}

/// One transfer in a conversation's log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEntry {
    pub task_id: TaskId,
    pub from_agent: String,
    pub to_agent: String,
    /// Hop count of the task produced by this transfer
    pub hop_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl TransferEntry {
    /// Whether this transfer ran between `a` and `b`, in either direction
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from_agent == a && self.to_agent == b) || (self.from_agent == b && self.to_agent == a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
enum Halt {
    HopLimit { hop_count: u32, max_hops: u32 },
    Loop { from: String, to: String, transfers: usize },
}

impl Halt {
    fn reason(&self) -> HaltReason {
        match self {
            Self::HopLimit { .. } => HaltReason::HopLimitExceeded,
            Self::Loop { .. } => HaltReason::LoopDetected,
        }
    }

    fn to_error(&self, conversation_id: &ConversationId) -> Error {
        match self {
            Self::HopLimit {
                hop_count,
                max_hops,
            } => Error::HopLimitExceeded {
                conversation_id: conversation_id.to_string(),
                hop_count: *hop_count,
                max_hops: *max_hops,
            },
            Self::Loop {
                from,
                to,
                transfers,
            } => Error::LoopDetected {
                conversation_id: conversation_id.to_string(),
                from: from.clone(),
                to: to.clone(),
                transfers: *transfers,
            },
        }
    }
}

/// Append-only transfer log of one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub conversation_id: ConversationId,
    entries: Vec<TransferEntry>,
    halted: Option<Halt>,
    pub created_at: DateTime<Utc>,
}

impl DelegationRecord {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            entries: Vec::new(),
            halted: None,
            created_at: Utc::now(),
        }
    }

    pub fn entries(&self) -> &[TransferEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TransferEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delegations recorded so far
    pub fn hop_count(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    /// Transfers between the unordered pair `{a, b}`
    pub fn repeat_count(&self, a: &str, b: &str) -> usize {
        self.entries.iter().filter(|e| e.connects(a, b)).count()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halted.as_ref().map(Halt::reason)
    }

    pub fn state(&self) -> RoutingState {
        match self.halt_reason() {
            Some(HaltReason::HopLimitExceeded) => RoutingState::HopLimitReached,
            Some(HaltReason::LoopDetected) => RoutingState::LoopBroken,
            _ if self.entries.is_empty() => RoutingState::Routing,
            _ => RoutingState::Delegated,
        }
    }

    fn push(&mut self, task_id: TaskId, from: &str, to: &str, hop_count: u32) {
        self.entries.push(TransferEntry {
            task_id,
            from_agent: from.to_string(),
            to_agent: to.to_string(),
            hop_count,
            timestamp: Utc::now(),
        });
    }

    /// Hop count a task is treated as having in this conversation.
    ///
    /// Fails, and latches the conversation as halted, once the ceiling is
    /// reached; a halted conversation keeps failing until reset. A task at
    /// or past the ceiling always reports the hop limit, even
    /// in a conversation already halted by the loop guard.
    fn open(&mut self, task_hop: u32, max_hops: u32) -> Result<u32> {
        let hop_count = task_hop.max(self.hop_count());
        if hop_count >= max_hops {
            let halt = Halt::HopLimit {
                hop_count,
                max_hops,
            };
            let err = halt.to_error(&self.conversation_id);
            self.halted.get_or_insert(halt);
            return Err(err);
        }

        if let Some(halt) = &self.halted {
            return Err(halt.to_error(&self.conversation_id));
        }

        Ok(hop_count)
    }
}

/// Per-conversation delegation logs
pub struct DelegationTracker {
    logs: DashMap<ConversationId, DelegationRecord>,
}

impl DelegationTracker {
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
        }
    }

    /// Append a transfer unconditionally, creating the log on first use
    pub fn record(&self, conversation_id: &ConversationId, task_id: TaskId, from: &str, to: &str) {
        let mut log = self
            .logs
            .entry(conversation_id.clone())
            .or_insert_with(|| DelegationRecord::new(conversation_id.clone()));
        let hop_count = log.hop_count().saturating_add(1);
        log.push(task_id, from, to, hop_count);
    }

    /// Transfers between the unordered pair `{a, b}` in a conversation
    pub fn repeat_count(&self, conversation_id: &ConversationId, a: &str, b: &str) -> usize {
        self.logs
            .get(conversation_id)
            .map(|log| log.repeat_count(a, b))
            .unwrap_or(0)
    }

    /// Check that `task` may still be delegated and return its effective
    /// hop count.
    ///
    /// Returns `HopLimitExceeded` or `LoopDetected` for conversations that
    /// have reached a terminal state.
    ///
    /// A conversation without a log stays without one unless the task is
    /// already at the ceiling, which latches the halt.
    pub fn check_open(&self, task: &TaskRequest, max_hops: u32) -> Result<u32> {
        let conversation_id = task.conversation_id();
        if let Some(mut log) = self.logs.get_mut(conversation_id) {
            return log.open(task.hop_count(), max_hops);
        }
        if task.hop_count() < max_hops {
            return Ok(task.hop_count());
        }

        let mut log = self
            .logs
            .entry(conversation_id.clone())
            .or_insert_with(|| DelegationRecord::new(conversation_id.clone()));
        log.open(task.hop_count(), max_hops)
    }

    /// Guarded append of `task.requester -> to`.
    ///
    /// Checks the hop and repeat ceilings and appends as one step. Returns
    /// the hop count of the follow-up task.
    pub fn try_record(&self, task: &TaskRequest, to: &str, limits: TransferLimits) -> Result<u32> {
        let conversation_id = task.conversation_id();
        let from = task.requester();

        let mut log = self
            .logs
            .entry(conversation_id.clone())
            .or_insert_with(|| DelegationRecord::new(conversation_id.clone()));

        let hop_count = log.open(task.hop_count(), limits.max_hops)?;

        let transfers = log.repeat_count(from, to);
        if transfers >= limits.max_repeat_transfers {
            warn!(
                conversation = %conversation_id,
                from, to, transfers, "Transfer loop detected"
            );
            let halt = Halt::Loop {
                from: from.to_string(),
                to: to.to_string(),
                transfers,
            };
            let err = halt.to_error(conversation_id);
            log.halted = Some(halt);
            return Err(err);
        }

        let next_hop = hop_count + 1;
        log.push(task.task_id().clone(), from, to, next_hop);
        debug!(
            conversation = %conversation_id,
            from, to, hop = next_hop, "Transfer recorded"
        );
        Ok(next_hop)
    }

    /// Clear a conversation's log. Returns whether one existed.
    pub fn reset(&self, conversation_id: &ConversationId) -> bool {
        let removed = self.logs.remove(conversation_id).is_some();
        if removed {
            info!("Delegation log cleared for conversation: {}", conversation_id);
        }
        removed
    }

    /// Copy of a conversation's log
    pub fn get(&self, conversation_id: &ConversationId) -> Option<DelegationRecord> {
        self.logs.get(conversation_id).map(|log| log.clone())
    }

    pub fn state(&self, conversation_id: &ConversationId) -> RoutingState {
        self.logs
            .get(conversation_id)
            .map(|log| log.state())
            .unwrap_or(RoutingState::Routing)
    }

    /// Number of conversations holding a log
    pub fn active_conversations(&self) -> usize {
        self.logs.len()
    }
}

impl Default for DelegationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn task_from(conversation: &ConversationId, requester: &str, hop: u32) -> TaskRequest {
        TaskRequest::builder("peer transfer")
            .conversation(conversation.clone())
            .requester(requester)
            .hop_count(hop)
            .build()
    }

    #[test]
    fn test_record_creates_log() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");

        tracker.record(&conv, TaskId::new("t1"), "root", "rhea");
        tracker.record(&conv, TaskId::new("t2"), "rhea", "sage");

        let log = tracker.get(&conv).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].to_agent, "rhea");
        assert_eq!(log.entries()[1].hop_count, 2);
        assert_eq!(tracker.active_conversations(), 1);
    }

    #[test]
    fn test_repeat_count_is_unordered() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");

        tracker.record(&conv, TaskId::default(), "a", "b");
        tracker.record(&conv, TaskId::default(), "b", "a");
        tracker.record(&conv, TaskId::default(), "a", "c");

        assert_eq!(tracker.repeat_count(&conv, "a", "b"), 2);
        assert_eq!(tracker.repeat_count(&conv, "b", "a"), 2);
        assert_eq!(tracker.repeat_count(&conv, "c", "a"), 1);
        assert_eq!(tracker.repeat_count(&conv, "b", "c"), 0);
        assert_eq!(tracker.repeat_count(&ConversationId::new("other"), "a", "b"), 0);
    }

    #[test]
    fn test_reset_clears_log() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");
        tracker.record(&conv, TaskId::default(), "a", "b");

        assert!(tracker.reset(&conv));
        assert!(tracker.get(&conv).is_none());
        assert!(!tracker.reset(&conv));
        assert_eq!(tracker.active_conversations(), 0);
    }

    #[test]
    fn test_try_record_ping_pong_guard() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");
        let limits = TransferLimits {
            max_hops: 6,
            max_repeat_transfers: 2,
        };

        assert_eq!(tracker.try_record(&task_from(&conv, "a", 0), "b", limits).unwrap(), 1);
        assert_eq!(tracker.try_record(&task_from(&conv, "b", 1), "a", limits).unwrap(), 2);

        let err = tracker
            .try_record(&task_from(&conv, "a", 2), "b", limits)
            .unwrap_err();
        assert!(matches!(err, Error::LoopDetected { transfers: 2, .. }));
        assert_eq!(tracker.state(&conv), RoutingState::LoopBroken);
        // the rejected transfer was not appended
        assert_eq!(tracker.get(&conv).unwrap().len(), 2);
    }

    #[test]
    fn test_try_record_hop_ceiling_is_sticky() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");
        let limits = TransferLimits {
            max_hops: 2,
            max_repeat_transfers: 10,
        };

        tracker.try_record(&task_from(&conv, "root", 0), "a", limits).unwrap();
        tracker.try_record(&task_from(&conv, "a", 1), "b", limits).unwrap();

        let err = tracker
            .try_record(&task_from(&conv, "b", 2), "c", limits)
            .unwrap_err();
        assert!(matches!(err, Error::HopLimitExceeded { hop_count: 2, max_hops: 2, .. }));

        // a fresh task claiming hop 0 is still refused
        let err = tracker.check_open(&task_from(&conv, "root", 0), 2).unwrap_err();
        assert!(matches!(err, Error::HopLimitExceeded { .. }));
        assert_eq!(tracker.state(&conv), RoutingState::HopLimitReached);

        tracker.reset(&conv);
        assert_eq!(tracker.check_open(&task_from(&conv, "root", 0), 2).unwrap(), 0);
    }

    #[test]
    fn test_check_open_leaves_unknown_conversation_untouched() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");

        assert_eq!(tracker.check_open(&task_from(&conv, "root", 3), 6).unwrap(), 3);
        assert!(tracker.get(&conv).is_none());
        assert_eq!(tracker.active_conversations(), 0);

        // a task arriving at the ceiling still latches the halt
        assert!(tracker.check_open(&task_from(&conv, "root", 6), 6).is_err());
        assert_eq!(tracker.state(&conv), RoutingState::HopLimitReached);
    }

    #[test]
    fn test_hop_ceiling_reported_after_loop_halt() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");
        let limits = TransferLimits::default();

        tracker.try_record(&task_from(&conv, "a", 0), "b", limits).unwrap();
        tracker.try_record(&task_from(&conv, "b", 1), "a", limits).unwrap();
        assert!(tracker.try_record(&task_from(&conv, "a", 2), "b", limits).is_err());

        let err = tracker.check_open(&task_from(&conv, "root", 6), 6).unwrap_err();
        assert!(matches!(err, Error::HopLimitExceeded { hop_count: 6, max_hops: 6, .. }));
        // lower hops keep reporting the loop
        let err = tracker.check_open(&task_from(&conv, "root", 1), 6).unwrap_err();
        assert!(matches!(err, Error::LoopDetected { .. }));
        assert_eq!(tracker.state(&conv), RoutingState::LoopBroken);
    }

    #[test]
    fn test_state_transitions() {
        let tracker = DelegationTracker::new();
        let conv = ConversationId::new("c1");
        assert_eq!(tracker.state(&conv), RoutingState::Routing);

        tracker
            .try_record(&task_from(&conv, "root", 0), "a", TransferLimits::default())
            .unwrap();
        assert_eq!(tracker.state(&conv), RoutingState::Delegated);
    }

    #[test]
    fn test_concurrent_transfers_pass_guard_once_per_slot() {
        let tracker = Arc::new(DelegationTracker::new());
        let conv = ConversationId::new("shared");
        let limits = TransferLimits {
            max_hops: 100,
            max_repeat_transfers: 2,
        };

        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let tracker = Arc::clone(&tracker);
                    let task = task_from(&conv, "a", 0);
                    scope.spawn(move || tracker.try_record(&task, "b", limits).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(accepted, 2);
        assert_eq!(tracker.repeat_count(&conv, "a", "b"), 2);
    }

    #[test]
    fn test_conversations_are_independent() {
        let tracker = DelegationTracker::new();
        let limits = TransferLimits {
            max_hops: 6,
            max_repeat_transfers: 1,
        };
        let c1 = ConversationId::new("c1");
        let c2 = ConversationId::new("c2");

        tracker.try_record(&task_from(&c1, "a", 0), "b", limits).unwrap();
        assert!(tracker.try_record(&task_from(&c1, "b", 1), "a", limits).is_err());
        // c1 being halted does not affect c2
        assert!(tracker.try_record(&task_from(&c2, "a", 0), "b", limits).is_ok());
    }
}
