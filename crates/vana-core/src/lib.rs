//! vana-core: VANA coordination core
//!
//! Agent registry, capability matching, task routing with loop and hop
//! guards, and agent health reporting for the VANA multi-agent assistant.

pub mod agents;
pub mod config;
pub mod error;

pub use agents::{
    AgentDescriptor, AgentRegistry, AgentStatus, ConversationId, Coordinator, DelegationDecision,
    StatusReporter, TaskRequest,
};
pub use config::{AgentConfig, Config, CoordinatorConfig, HealthConfig};
pub use error::{Error, Result};
