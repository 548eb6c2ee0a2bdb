//! Suggestion payloads and the record of processed confirmations.

use poker_types::{IssueSuggestedPayload, SUGGESTION_VERSION, SuggestionSource, TrackerIssue};
use std::collections::HashSet;

/// Maximum description length in a suggestion, in bytes.
pub const DESCRIPTION_LIMIT: usize = 3000;

/// Title of the notice sent when the tracker list is exhausted.
pub const NO_MORE_ISSUES: &str = "No more issues in queue";

/// Cut `text` to at most [`DESCRIPTION_LIMIT`] bytes on a character boundary.
///
/// Returns the (possibly shortened) text and whether anything was cut. A
/// shortened text ends in `"..."`.
pub fn truncate_description(text: &str) -> (String, bool) {
    if text.len() <= DESCRIPTION_LIMIT {
        return (text.to_string(), false);
    }

    let mut end = DESCRIPTION_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (format!("{}...", &text[..end]), true)
}

/// Suggest the tracker issue at `index`.
pub fn suggest(issue: &TrackerIssue, index: usize) -> IssueSuggestedPayload {
    let (description, has_more) = truncate_description(&issue.description);
    IssueSuggestedPayload {
        version: SUGGESTION_VERSION,
        source: SuggestionSource::Tracker,
        identifier: issue.identifier.clone(),
        title: issue.title.clone(),
        description: Some(description).filter(|d| !d.is_empty()),
        url: Some(issue.url.clone()).filter(|u| !u.is_empty()),
        queue_index: index as i64,
        has_more,
    }
}

/// Notice that the tracker list has no further issues.
pub fn no_more_issues() -> IssueSuggestedPayload {
    IssueSuggestedPayload {
        version: SUGGESTION_VERSION,
        source: SuggestionSource::System,
        identifier: String::new(),
        title: NO_MORE_ISSUES.to_string(),
        description: None,
        url: None,
        queue_index: -1,
        has_more: false,
    }
}

/// Request IDs of confirmations already applied.
#[derive(Debug, Default)]
pub struct ConfirmationRecord {
    processed: HashSet<String>,
}

impl ConfirmationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, request_id: &str) -> bool {
        self.processed.contains(request_id)
    }

    /// Returns `false` if the ID was already recorded.
    pub fn mark(&mut self, request_id: &str) -> bool {
        self.processed.insert(request_id.to_string())
    }
}
