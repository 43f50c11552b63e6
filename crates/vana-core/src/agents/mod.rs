//! Multi-Agent Coordination
//!
//! Capability-based routing of tasks among named specialist agents, with
//! per-conversation loop and depth guards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Coordinator                          │
//! │  - route(): best specialist or fallback                     │
//! │  - transfer(): explicit peer transfer                       │
//! └──────┬──────────────────┬──────────────────────┬────────────┘
//!        │                  │                      │
//!        ▼                  ▼                      ▼
//! ┌──────────────┐  ┌─────────────────┐  ┌───────────────────────┐
//! │AgentRegistry │  │CapabilityMatcher│  │  DelegationTracker    │
//! │ names, tags, │  │ overlap score,  │  │ per-conversation log, │
//! │ status       │  │ stable ranking  │  │ hop + repeat ceilings │
//! └──────▲───────┘  └─────────────────┘  └───────────────────────┘
//!        │
//! ┌──────┴───────┐
//! │StatusReporter│ ◄── ReachabilityCheck (HTTP, static)
//! └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vana_core::agents::{AgentDescriptor, AgentRegistry, Coordinator, TaskRequest};
//!
//! let registry = Arc::new(AgentRegistry::from_agents([
//!     AgentDescriptor::new("rhea", ["data_analysis"]),
//!     AgentDescriptor::new("vana", ["general"]),
//! ])?);
//! let coordinator = Coordinator::with_defaults(registry);
//!
//! let decision = coordinator.route(&TaskRequest::new("analyze this dataset"))?;
//! assert_eq!(decision.target_agent(), "rhea");
//! ```

pub mod coordinator;
pub mod health;
pub mod matcher;
pub mod registry;
pub mod tracker;
pub mod types;

// Re-exports
pub use coordinator::Coordinator;
pub use health::{HttpReachability, ReachabilityCheck, StaticReachability, StatusReporter};
pub use matcher::{CapabilityMatcher, tokenize};
pub use registry::AgentRegistry;
pub use tracker::{DelegationRecord, DelegationTracker, TransferEntry, TransferLimits};
pub use types::{
    AgentDescriptor, AgentStatus, ConversationId, DelegationDecision, HaltReason, MatchEntry,
    MatchResult, ROOT_REQUESTER, Rationale, RoutingState, TaskId, TaskRequest,
    TaskRequestBuilder,
};
