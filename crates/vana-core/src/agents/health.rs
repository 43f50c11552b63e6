//! Status/Health Reporter
//!
//! Probes agents through a pluggable [`ReachabilityCheck`] and records the
//! result in the registry. Routing only ever reads the recorded status, so
//! a reading may be one probe interval stale.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::registry::AgentRegistry;
use super::types::{AgentDescriptor, AgentStatus};
use crate::Result;

/// Liveness check for one agent
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check(&self, agent: &AgentDescriptor) -> Result<AgentStatus>;
}

/// Fixed statuses, for tests and offline runs
#[derive(Debug, Clone, Default)]
pub struct StaticReachability {
    statuses: HashMap<String, AgentStatus>,
    default: AgentStatus,
}

impl StaticReachability {
    /// Every agent reports `Available`
    pub fn new() -> Self {
        Self::default()
    }

    /// Status reported for agents without an explicit entry
    pub fn with_default(mut self, status: AgentStatus) -> Self {
        self.default = status;
        self
    }

    pub fn with_status(mut self, name: impl Into<String>, status: AgentStatus) -> Self {
        self.statuses.insert(name.into(), status);
        self
    }
}

#[async_trait]
impl ReachabilityCheck for StaticReachability {
    async fn check(&self, agent: &AgentDescriptor) -> Result<AgentStatus> {
        Ok(self
            .statuses
            .get(&agent.name)
            .copied()
            .unwrap_or(self.default))
    }
}

/// GETs each agent's `health_url`
pub struct HttpReachability {
    client: reqwest::Client,
}

impl HttpReachability {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Map a health endpoint's response status to an agent status
    pub fn classify(status: StatusCode) -> AgentStatus {
        if status.is_success() {
            AgentStatus::Available
        } else if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::SERVICE_UNAVAILABLE
        {
            AgentStatus::Busy
        } else {
            AgentStatus::Unreachable
        }
    }
}

#[async_trait]
impl ReachabilityCheck for HttpReachability {
    async fn check(&self, agent: &AgentDescriptor) -> Result<AgentStatus> {
        let Some(url) = &agent.health_url else {
            // nothing to probe; keep what the registry already has
            return Ok(agent.status);
        };

        match self.client.get(url).send().await {
            Ok(response) => Ok(Self::classify(response.status())),
            Err(e) => {
                warn!("Health check for {} failed: {}", agent.name, e);
                Ok(AgentStatus::Unreachable)
            }
        }
    }
}

/// Probes agents and reports their statuses
pub struct StatusReporter {
    registry: Arc<AgentRegistry>,
    check: Arc<dyn ReachabilityCheck>,
}

impl StatusReporter {
    pub fn new(registry: Arc<AgentRegistry>, check: Arc<dyn ReachabilityCheck>) -> Self {
        Self { registry, check }
    }

    /// Probe one agent and record its status.
    ///
    /// A failing check marks the agent unreachable rather than failing the
    /// call; only an unknown name is an error.
    pub async fn probe(&self, name: &str) -> Result<AgentStatus> {
        let agent = self.registry.get(name)?;

        let status = match self.check.check(&agent).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Probe of {} failed: {}", name, e);
                AgentStatus::Unreachable
            }
        };

        self.registry.set_status(name, status)?;
        Ok(status)
    }

    /// Probe every registered agent concurrently
    pub async fn probe_all(&self) -> Result<BTreeMap<String, AgentStatus>> {
        let names = self.registry.names();
        let results = join_all(names.iter().map(|name| self.probe(name))).await;

        names
            .into_iter()
            .zip(results)
            .map(|(name, status)| status.map(|s| (name, s)))
            .collect()
    }

    /// Read-only name to status view
    pub fn snapshot(&self) -> BTreeMap<String, AgentStatus> {
        self.registry.snapshot()
    }
}
