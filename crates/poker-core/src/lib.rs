//! Core session state for planning poker: participants, rounds, the issue
//! queue and the suggestion handshake.

mod consensus;
mod error;
mod join;
mod outbox;
mod queue;
mod registry;
mod round;
mod session;
mod suggestion;
mod tracker;

pub use consensus::{SCALE, consensus, snap};
pub use error::PokerError;
pub use join::{
    JoinRejection, MAX_USERNAME_LEN, MIN_USERNAME_LEN, UsernameError, check_admission,
    validate_username,
};
pub use outbox::{Delivery, Outbox, Recipient};
pub use queue::{IssueQueue, ItemChanges, QueueError};
pub use registry::{ConnectionId, ConnectionRegistry, Participant};
pub use round::{Phase, Round};
pub use session::{AUTO_ADVANCE_NOTICE, Session};
pub use suggestion::{
    ConfirmationRecord, DESCRIPTION_LIMIT, NO_MORE_ISSUES, no_more_issues, suggest,
    truncate_description,
};
pub use tracker::{
    EstimateAssignment, IssueTracker, ResultsReport, assignment_error_message,
    format_results_comment,
};

/// Result type for poker operations.
pub type Result<T> = std::result::Result<T, PokerError>;
