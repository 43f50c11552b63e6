//! Error types for vana-core

use thiserror::Error;

/// Main error type for vana-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Hop limit exceeded in conversation {conversation_id}: hop {hop_count} of {max_hops}")]
    HopLimitExceeded {
        conversation_id: String,
        hop_count: u32,
        max_hops: u32,
    },

    #[error("Loop detected in conversation {conversation_id}: {from} <-> {to} already transferred {transfers} times")]
    LoopDetected {
        conversation_id: String,
        from: String,
        to: String,
        transfers: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for vana-core
pub type Result<T> = std::result::Result<T, Error>;
