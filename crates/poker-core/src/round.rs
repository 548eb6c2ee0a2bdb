//! The live voting round.

use poker_types::{CurrentIssuePayload, TrackerIssue};

/// Round lifecycle. Transitions are not gated: a reveal or reset is accepted
/// in any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No issue loaded.
    #[default]
    Idle,
    /// Issue loaded, votes accumulating.
    Active,
    /// Votes shown.
    Revealed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Round {
    label: String,
    issue: Option<TrackerIssue>,
    phase: Phase,
}

impl Round {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn issue(&self) -> Option<&TrackerIssue> {
        self.issue.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while a label is set.
    pub fn has_issue(&self) -> bool {
        !self.label.is_empty()
    }

    /// Load free text with no tracker reference.
    pub fn load_text(&mut self, text: impl Into<String>) {
        self.label = text.into();
        self.issue = None;
        self.phase = if self.label.is_empty() {
            Phase::Idle
        } else {
            Phase::Active
        };
    }

    /// Load a tracker issue. The label becomes `IDENT: title`.
    pub fn load_tracker(&mut self, issue: TrackerIssue) {
        self.label = issue.label();
        self.issue = Some(issue);
        self.phase = Phase::Active;
    }

    pub fn reveal(&mut self) {
        self.phase = Phase::Revealed;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Snapshot sent as `currentIssue`.
    pub fn current_issue(&self) -> CurrentIssuePayload {
        CurrentIssuePayload {
            text: self.label.clone(),
            tracker_issue: self.issue.clone(),
        }
    }
}
