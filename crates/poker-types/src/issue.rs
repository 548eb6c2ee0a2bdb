//! Issue records: tracker issues and queue items.

use serde::{Deserialize, Serialize};

/// An issue fetched from the external tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerIssue {
    /// Tracker-internal ID, used when posting results back.
    pub id: String,
    /// Human-facing key, e.g. `CDP-42`.
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

impl TrackerIssue {
    /// Round label for this issue (`IDENTIFIER: Title`).
    pub fn label(&self) -> String {
        format!("{}: {}", self.identifier, self.title)
    }
}

/// Where a queue item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueSource {
    /// Loaded from the external tracker.
    Tracker,
    /// Entered by the host.
    Custom,
}

/// An entry in the upcoming-issue queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub source: QueueSource,
    pub identifier: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Back-reference to [`TrackerIssue::id`] for tracker-sourced items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_id: Option<String>,
    /// 0-based position; always equal to the item's index in the queue.
    pub index: usize,
}

impl QueueItem {
    /// Build a tracker-sourced item at `index`.
    pub fn from_tracker(issue: &TrackerIssue, index: usize) -> Self {
        Self {
            id: issue.id.clone(),
            source: QueueSource::Tracker,
            identifier: issue.identifier.clone(),
            title: issue.title.clone(),
            description: non_empty(&issue.description),
            url: non_empty(&issue.url),
            tracker_id: Some(issue.id.clone()),
            index,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.source == QueueSource::Custom
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
