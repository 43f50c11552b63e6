//! Task Router / Coordinator
//!
//! Decides where a task goes next. Each call runs the same steps:
//!
//! ```text
//! TaskRequest
//!     │
//!     ▼
//! hop ceiling ──exceeded──► HandleDirectly (hop limit exceeded)
//!     │
//!     ▼
//! CapabilityMatcher over available agents
//!     │ top match, else fallback agent
//!     ▼
//! DelegationTracker guarded append ──repeat ceiling──► HandleDirectly (loop detected)
//!     │
//!     ▼
//! Delegate { target, rationale, follow-up task }
//! ```
//!
//! Halted decisions hand the task back to the root agent. Once a
//! conversation halts it stays halted until `end_conversation`.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::matcher::CapabilityMatcher;
use super::registry::AgentRegistry;
use super::tracker::{DelegationRecord, DelegationTracker, TransferLimits};
use super::types::{
    AgentDescriptor, ConversationId, DelegationDecision, HaltReason, MatchResult, Rationale,
    RoutingState, TaskRequest,
};
use crate::config::CoordinatorConfig;
use crate::{Error, Result};

/// Routes tasks among registered specialist agents
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    matcher: CapabilityMatcher,
    tracker: DelegationTracker,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(registry: Arc<AgentRegistry>, config: CoordinatorConfig) -> Self {
        Self {
            registry,
            matcher: CapabilityMatcher::default(),
            tracker: DelegationTracker::new(),
            config,
        }
    }

    /// Create with default limits
    pub fn with_defaults(registry: Arc<AgentRegistry>) -> Self {
        Self::new(registry, CoordinatorConfig::default())
    }

    /// Replace the capability matcher
    pub fn with_matcher(mut self, matcher: CapabilityMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Pick the best specialist for `task` and record the delegation.
    ///
    /// Only an unknown fallback agent makes this fail; hop and loop
    /// ceilings come back as `HandleDirectly` decisions.
    pub fn route(&self, task: &TaskRequest) -> Result<DelegationDecision> {
        if let Some(halted) = self.check_open(task)? {
            return Ok(halted);
        }

        let ranking = self.rank(task);
        let (target, rationale) = match ranking.top() {
            Some(best) => (
                best.agent.clone(),
                Rationale::CapabilityMatch { score: best.score },
            ),
            None => {
                let fallback = self.registry.get(&self.config.fallback_agent)?;
                if !fallback.is_available() {
                    warn!(
                        "Fallback agent {} is {}, routing to it anyway",
                        fallback.name, fallback.status
                    );
                }
                (fallback.name, Rationale::Fallback)
            }
        };

        if target == task.requester() {
            return Ok(self.halt(task, HaltReason::NoEligibleAgent));
        }

        self.commit(task, target, rationale)
    }

    /// Peer transfer to a named agent, under the same hop and loop ceilings
    pub fn transfer(&self, task: &TaskRequest, target: &str) -> Result<DelegationDecision> {
        let agent = self.registry.get(target)?;

        if let Some(halted) = self.check_open(task)? {
            return Ok(halted);
        }

        if agent.name == task.requester() {
            return Ok(self.halt(task, HaltReason::NoEligibleAgent));
        }
        if !agent.is_available() {
            warn!("Transferring to {} while it is {}", agent.name, agent.status);
        }

        self.commit(task, agent.name, Rationale::Explicit)
    }

    /// Rank available agents for `task` without recording anything
    pub fn rank(&self, task: &TaskRequest) -> MatchResult {
        let candidates: Vec<AgentDescriptor> = self
            .registry
            .list_available()
            .into_iter()
            .filter(|a| !(self.config.exclude_requester && a.name == task.requester()))
            .collect();

        let ranking = self.matcher.match_task(task, &candidates);
        debug!(
            task = %task.task_id(),
            candidates = candidates.len(),
            matches = ranking.len(),
            "Ranked candidates"
        );
        ranking
    }

    /// Every registered agent with its current status
    pub fn discover(&self) -> Vec<AgentDescriptor> {
        self.registry.list()
    }

    /// Copy of a conversation's delegation log
    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<DelegationRecord> {
        self.tracker.get(conversation_id)
    }

    pub fn conversation_state(&self, conversation_id: &ConversationId) -> RoutingState {
        self.tracker.state(conversation_id)
    }

    /// Drop a finished conversation's state
    pub fn end_conversation(&self, conversation_id: &ConversationId) -> bool {
        self.tracker.reset(conversation_id)
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &DelegationTracker {
        &self.tracker
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn limits(&self) -> TransferLimits {
        TransferLimits::from(&self.config)
    }

    /// `Some(decision)` when the conversation may not delegate any further
    fn check_open(&self, task: &TaskRequest) -> Result<Option<DelegationDecision>> {
        match self.tracker.check_open(task, self.config.max_hops) {
            Ok(_) => Ok(None),
            Err(e) => self.halt_on(task, e).map(Some),
        }
    }

    fn commit(
        &self,
        task: &TaskRequest,
        target: String,
        rationale: Rationale,
    ) -> Result<DelegationDecision> {
        match self.tracker.try_record(task, &target, self.limits()) {
            Ok(hop_count) => {
                info!(
                    conversation = %task.conversation_id(),
                    from = task.requester(),
                    to = %target,
                    hop = hop_count,
                    "Delegating task: {}",
                    rationale
                );
                let next = task.delegate_at(target.clone(), hop_count);
                Ok(DelegationDecision::Delegate {
                    target,
                    rationale,
                    task: next,
                })
            }
            Err(e) => self.halt_on(task, e),
        }
    }

    fn halt_on(&self, task: &TaskRequest, err: Error) -> Result<DelegationDecision> {
        match err {
            Error::HopLimitExceeded { .. } => {
                warn!("{}", err);
                Ok(self.halt(task, HaltReason::HopLimitExceeded))
            }
            Error::LoopDetected { .. } => {
                warn!("{}", err);
                Ok(self.halt(task, HaltReason::LoopDetected))
            }
            other => Err(other),
        }
    }

    fn halt(&self, task: &TaskRequest, reason: HaltReason) -> DelegationDecision {
        debug!(
            conversation = %task.conversation_id(),
            task = %task.task_id(),
            %reason,
            "Returning task to {}",
            self.config.root_agent
        );
        DelegationDecision::HandleDirectly {
            agent: self.config.root_agent.clone(),
            reason,
        }
    }
}
