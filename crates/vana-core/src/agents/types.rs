//! Coordination types
//!
//! Defines the values that flow through the coordinator:
//! - AgentDescriptor: a specialist agent and its capability tags
//! - TaskRequest: an immutable unit of work entering the coordinator
//! - MatchResult: ranked capability matches for one task
//! - DelegationDecision: the closed set of routing outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Requester name used for tasks submitted by the orchestrator itself
pub const ROOT_REQUESTER: &str = "root";

/// Unique identifier for a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier grouping a chain of related delegations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reachability of a specialist agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Available,
    Busy,
    Unreachable,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// A named specialist agent with its declared capability tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique agent name
    pub name: String,
    /// Capability tags, lowercased
    pub capabilities: BTreeSet<String>,
    /// Last known reachability
    #[serde(default)]
    pub status: AgentStatus,
    /// Optional liveness endpoint used by the HTTP probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
}

impl AgentDescriptor {
    pub fn new<I, S>(name: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            capabilities: capabilities
                .into_iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
            status: AgentStatus::Available,
            health_url: None,
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Available
    }
}

/// A unit of work entering the coordinator.
///
/// Immutable once built: delegating produces a new request through
/// [`TaskRequest::delegate`] instead of mutating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    task_id: TaskId,
    description: String,
    requester: String,
    conversation_id: ConversationId,
    hop_count: u32,
    created_at: DateTime<Utc>,
}

impl TaskRequest {
    /// Create a root task in a fresh conversation
    pub fn new(description: impl Into<String>) -> Self {
        Self::builder(description).build()
    }

    pub fn builder(description: impl Into<String>) -> TaskRequestBuilder {
        TaskRequestBuilder::new(description)
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn hop_count(&self) -> u32 {
        self.hop_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The follow-up task handed to `to`, one hop further down the chain
    pub fn delegate(&self, to: impl Into<String>) -> Self {
        self.delegate_at(to, self.hop_count.saturating_add(1))
    }

    pub(crate) fn delegate_at(&self, to: impl Into<String>, hop_count: u32) -> Self {
        Self {
            task_id: TaskId::default(),
            description: self.description.clone(),
            requester: to.into(),
            conversation_id: self.conversation_id.clone(),
            hop_count,
            created_at: Utc::now(),
        }
    }
}

/// Builder for TaskRequest
pub struct TaskRequestBuilder {
    description: String,
    requester: String,
    conversation_id: Option<ConversationId>,
    hop_count: u32,
}

impl TaskRequestBuilder {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            requester: ROOT_REQUESTER.to_string(),
            conversation_id: None,
            hop_count: 0,
        }
    }

    pub fn requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = requester.into();
        self
    }

    pub fn conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn hop_count(mut self, hop_count: u32) -> Self {
        self.hop_count = hop_count;
        self
    }

    pub fn build(self) -> TaskRequest {
        TaskRequest {
            task_id: TaskId::default(),
            description: self.description,
            requester: self.requester,
            conversation_id: self.conversation_id.unwrap_or_default(),
            hop_count: self.hop_count,
            created_at: Utc::now(),
        }
    }
}

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEntry {
    pub agent: String,
    pub score: f64,
}

/// Candidates ranked by capability overlap, best first.
/// Agents with a zero score never appear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub entries: Vec<MatchEntry>,
}

impl MatchResult {
    pub fn top(&self) -> Option<&MatchEntry> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchEntry> {
        self.entries.iter()
    }

    pub fn score_of(&self, agent: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.agent == agent)
            .map(|e| e.score)
    }
}

/// Why a target was chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rationale {
    /// Best capability overlap among available agents
    CapabilityMatch { score: f64 },
    /// No specialist matched; the configured fallback agent was used
    Fallback,
    /// The requester named the target explicitly
    Explicit,
}

impl fmt::Display for Rationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapabilityMatch { score } => write!(f, "capability match (score {:.2})", score),
            Self::Fallback => f.write_str("fallback: no specialist matched"),
            Self::Explicit => f.write_str("explicit transfer"),
        }
    }
}

/// Why delegation stopped and the task went back for direct handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    HopLimitExceeded,
    LoopDetected,
    NoEligibleAgent,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HopLimitExceeded => "hop limit exceeded",
            Self::LoopDetected => "loop detected",
            Self::NoEligibleAgent => "no eligible agent",
        };
        f.write_str(s)
    }
}

/// Per-conversation routing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingState {
    Routing,
    Delegated,
    LoopBroken,
    HopLimitReached,
}

impl RoutingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoopBroken | Self::HopLimitReached)
    }
}

/// Outcome of a routing call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DelegationDecision {
    /// Hand `task` to `target`
    Delegate {
        target: String,
        rationale: Rationale,
        task: TaskRequest,
    },
    /// Stop delegating; `agent` answers directly
    HandleDirectly { agent: String, reason: HaltReason },
}

impl DelegationDecision {
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Delegate { .. })
    }

    pub fn target_agent(&self) -> &str {
        match self {
            Self::Delegate { target, .. } => target,
            Self::HandleDirectly { agent, .. } => agent,
        }
    }

    pub fn rationale(&self) -> String {
        match self {
            Self::Delegate { rationale, .. } => rationale.to_string(),
            Self::HandleDirectly { reason, .. } => reason.to_string(),
        }
    }

    /// The follow-up task for the target, when accepted
    pub fn next_task(&self) -> Option<&TaskRequest> {
        match self {
            Self::Delegate { task, .. } => Some(task),
            Self::HandleDirectly { .. } => None,
        }
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        match self {
            Self::Delegate { .. } => None,
            Self::HandleDirectly { reason, .. } => Some(*reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_default() {
        let id1 = TaskId::default();
        let id2 = TaskId::default();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_descriptor_lowercases_capabilities() {
        let agent = AgentDescriptor::new("Rhea", ["Data_Analysis", " statistics ", ""]);
        assert_eq!(agent.capabilities.len(), 2);
        assert!(agent.capabilities.contains("data_analysis"));
        assert!(agent.capabilities.contains("statistics"));
        assert!(agent.is_available());
    }

    #[test]
    fn test_task_builder_defaults() {
        let task = TaskRequest::new("analyze this dataset");
        assert_eq!(task.requester(), ROOT_REQUESTER);
        assert_eq!(task.hop_count(), 0);
        assert!(!task.conversation_id().as_str().is_empty());
    }

    #[test]
    fn test_delegate_produces_new_task() {
        let conversation = ConversationId::new("conv-1");
        let task = TaskRequest::builder("write the report")
            .requester("sage")
            .conversation(conversation.clone())
            .hop_count(2)
            .build();

        let next = task.delegate("rhea");

        assert_ne!(next.task_id(), task.task_id());
        assert_eq!(next.requester(), "rhea");
        assert_eq!(next.hop_count(), 3);
        assert_eq!(next.conversation_id(), &conversation);
        assert_eq!(next.description(), task.description());
        // the original is untouched
        assert_eq!(task.hop_count(), 2);
        assert_eq!(task.requester(), "sage");
    }

    #[test]
    fn test_delegate_saturates_hop_count() {
        let task = TaskRequest::builder("x").hop_count(u32::MAX).build();
        assert_eq!(task.delegate("rhea").hop_count(), u32::MAX);
    }

    #[test]
    fn test_decision_accessors() {
        let task = TaskRequest::new("x");
        let delegate = DelegationDecision::Delegate {
            target: "rhea".into(),
            rationale: Rationale::Fallback,
            task: task.delegate("rhea"),
        };
        assert!(delegate.accepted());
        assert_eq!(delegate.target_agent(), "rhea");
        assert!(delegate.rationale().contains("fallback"));
        assert!(delegate.next_task().is_some());

        let halted = DelegationDecision::HandleDirectly {
            agent: "root".into(),
            reason: HaltReason::LoopDetected,
        };
        assert!(!halted.accepted());
        assert_eq!(halted.rationale(), "loop detected");
        assert_eq!(halted.halt_reason(), Some(HaltReason::LoopDetected));
    }

    #[test]
    fn test_decision_serializes_with_outcome_tag() {
        let halted = DelegationDecision::HandleDirectly {
            agent: "root".into(),
            reason: HaltReason::HopLimitExceeded,
        };
        let json = serde_json::to_value(&halted).unwrap();
        assert_eq!(json["outcome"], "handle_directly");
        assert_eq!(json["reason"], "hop_limit_exceeded");
    }

    #[test]
    fn test_routing_state_terminal() {
        assert!(RoutingState::LoopBroken.is_terminal());
        assert!(RoutingState::HopLimitReached.is_terminal());
        assert!(!RoutingState::Routing.is_terminal());
        assert!(!RoutingState::Delegated.is_terminal());
    }
}
