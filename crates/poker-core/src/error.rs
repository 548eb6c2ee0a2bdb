//! Error types for the poker core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PokerError {
    #[error("Issue tracker error: {0}")]
    Tracker(String),

    #[error("Invalid cycle reference: {0}")]
    InvalidCycle(String),
}
