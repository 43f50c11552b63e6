//! Capability Matcher
//!
//! Scores a task description against each candidate's capability tags.
//! A tag counts as matched when the description mentions it, either
//! verbatim or through one of its words (`data_analysis` is matched by
//! "analyze this dataset"). The score is the fraction of an agent's tags
//! that matched, so narrow specialists are not penalized against broad
//! generalists.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

use super::types::{AgentDescriptor, MatchEntry, MatchResult, TaskRequest};

/// Shortest word allowed to match by shared prefix rather than equality
const MIN_STEM_LEN: usize = 4;
/// Shared prefix length that makes two longer words count as the same term
const STEM_PREFIX_LEN: usize = 5;

/// Ranks candidate agents for a task
#[derive(Debug, Clone)]
pub struct CapabilityMatcher {
    min_stem_len: usize,
    stem_prefix_len: usize,
}

impl CapabilityMatcher {
    pub fn new() -> Self {
        Self {
            min_stem_len: MIN_STEM_LEN,
            stem_prefix_len: STEM_PREFIX_LEN,
        }
    }

    /// Only exact word matches, no shared-prefix matching
    pub fn exact() -> Self {
        Self {
            min_stem_len: usize::MAX,
            stem_prefix_len: usize::MAX,
        }
    }

    /// Rank `candidates` for `task`, best first.
    ///
    /// Candidates are expected in registration order; equal scores keep
    /// that order. Agents scoring zero are left out entirely.
    pub fn match_task(&self, task: &TaskRequest, candidates: &[AgentDescriptor]) -> MatchResult {
        let terms = tokenize(task.description());

        let mut entries: Vec<MatchEntry> = candidates
            .iter()
            .filter_map(|agent| {
                let score = self.score(&terms, agent);
                debug!(agent = %agent.name, score, "capability score");
                (score > 0.0).then(|| MatchEntry {
                    agent: agent.name.clone(),
                    score,
                })
            })
            .collect();

        // stable sort keeps registration order among equal scores
        entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        MatchResult { entries }
    }

    /// Fraction of the agent's tags that the terms cover
    pub fn score(&self, terms: &BTreeSet<String>, agent: &AgentDescriptor) -> f64 {
        if agent.capabilities.is_empty() {
            return 0.0;
        }

        let matched = agent
            .capabilities
            .iter()
            .filter(|tag| self.tag_matches(tag, terms))
            .count();

        matched as f64 / agent.capabilities.len() as f64
    }

    fn tag_matches(&self, tag: &str, terms: &BTreeSet<String>) -> bool {
        if terms.contains(tag) {
            return true;
        }

        split_words(tag).any(|word| terms.iter().any(|term| self.words_match(word, term)))
    }

    fn words_match(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }

        let shorter = a.chars().count().min(b.chars().count());
        if shorter < self.min_stem_len {
            return false;
        }

        let shared = a
            .chars()
            .zip(b.chars())
            .take_while(|(x, y)| x == y)
            .count();
        shared >= self.stem_prefix_len.min(shorter)
    }
}

impl Default for CapabilityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase term set of a description.
///
/// Words are split on anything that is not alphanumeric or `_`; snake_case
/// words contribute both themselves and their parts.
pub fn tokenize(description: &str) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();

    for token in description
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
    {
        if token.contains('_') {
            terms.extend(split_words(token).map(str::to_string));
        }
        terms.insert(token.to_string());
    }

    terms.retain(|t| !t.trim_matches('_').is_empty());
    terms
}

fn split_words(tag: &str) -> impl Iterator<Item = &str> {
    tag.split(['_', '-']).filter(|w| !w.is_empty())
}
