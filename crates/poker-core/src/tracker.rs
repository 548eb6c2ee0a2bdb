//! External issue tracker interface and the payloads the session hands to it.

use async_trait::async_trait;
use poker_types::TrackerIssue;
use std::fmt::Write as _;

use crate::Result;

/// Source of issues and sink for results.
///
/// Calls may be slow and may fail. Callers log failures and carry on.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Unestimated issues in the referenced cycle.
    async fn fetch_issues_for_cycle(&self, cycle: &str) -> Result<Vec<TrackerIssue>>;

    /// Post a markdown comment on an issue.
    async fn post_result_comment(&self, issue_id: &str, body: &str) -> Result<()>;

    /// Set the estimate field of an issue.
    async fn update_estimate_field(&self, issue_id: &str, value: u32) -> Result<()>;
}

/// Voting results for the tracker issue of the round being reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsReport {
    pub issue: TrackerIssue,
    pub body: String,
}

/// A consensus ready to be written to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateAssignment {
    pub issue_id: String,
    pub identifier: String,
    pub value: u32,
}

impl EstimateAssignment {
    pub fn success_message(&self) -> String {
        format!("Estimate {} assigned to {}", self.value, self.identifier)
    }
}

pub fn assignment_error_message(reason: &str) -> String {
    format!("Failed to assign estimate: {reason}")
}

/// Markdown comment listing every non-zero vote and the consensus.
pub fn format_results_comment<'a, I>(votes: I, average: u32) -> String
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let mut body = String::from("## Planning Poker Results\n\n");
    for (name, vote) in votes {
        if vote != 0 {
            let _ = writeln!(body, "- {name}: {vote}");
        }
    }
    let _ = write!(body, "\n**Average:** {average} points");
    body
}
