//! Commit-reveal voting arbitrator for flowsplit registry challenges.
//!
//! The curation layer escalates recipient admission/removal challenges here.
//! Token holders commit hashed votes during the voting window, reveal them in
//! the reveal window, and anyone may execute the ruling after the appeal
//! window closes. All phase transitions are lazy clock comparisons; a dispute
//! nobody executes simply stays queryable in a terminal-eligible state.

use thiserror::Error;

pub mod arbitrator;
pub mod dispute;

pub use arbitrator::{Arbitrable, Arbitrator, ArbitratorConfig, VotingPowerSnapshot};
pub use dispute::{Dispute, DisputeState, Ruling, VoteReceipt};

/// Unified error type for arbitration operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArbitrationError {
    #[error("dispute {id} not found")]
    DisputeNotFound { id: u64 },

    #[error("voting window is not open")]
    VotingClosed,

    #[error("reveal window is not open")]
    RevealClosed,

    #[error("voter already committed in this dispute")]
    AlreadyCommitted,

    #[error("no commitment found for voter")]
    CommitNotFound,

    #[error("revealed vote does not match the stored commitment")]
    CommitMismatch,

    #[error("voter already revealed")]
    AlreadyRevealed,

    #[error("invalid choice {choice}: dispute has {choices} choices")]
    InvalidChoice { choice: u64, choices: u64 },

    #[error("voter held no voting power at the dispute snapshot")]
    NoVotingPower,

    #[error("ruling is not executable yet (reveal or appeal window open)")]
    RulingNotReady,

    #[error("dispute already executed")]
    AlreadyExecuted,

    #[error("quorum not reached: {revealed} revealed of {required} required")]
    QuorumNotReached { revealed: u128, required: u128 },

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}

pub type Result<T> = std::result::Result<T, ArbitrationError>;
