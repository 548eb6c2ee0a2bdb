//! Ordered queue of upcoming issues.
//!
//! Every structural change renumbers the items so that `item.index` always
//! equals the item's position.

use chrono::Utc;
use poker_types::{QueueItem, QueueSource, TrackerIssue};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue item not found: {0}")]
    NotFound(String),

    #[error("queue item {0} is not a custom item")]
    NotCustom(String),
}

/// Field changes for a custom item. Empty or missing fields leave the value as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemChanges {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct IssueQueue {
    items: Vec<QueueItem>,
    /// Counter for custom item IDs. Reset by [`IssueQueue::load_tracker`].
    custom_counter: u64,
}

impl IssueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue with tracker-sourced items.
    pub fn load_tracker(&mut self, issues: &[TrackerIssue]) {
        self.items = issues
            .iter()
            .enumerate()
            .map(|(i, issue)| QueueItem::from_tracker(issue, i))
            .collect();
        self.custom_counter = 0;
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    /// Insert a custom item. Positions outside `0..len` append.
    pub fn add(
        &mut self,
        identifier: String,
        title: String,
        description: Option<String>,
        position: Option<i64>,
    ) -> &QueueItem {
        self.custom_counter += 1;
        let item = QueueItem {
            id: format!("custom-{}-{}", Utc::now().timestamp(), self.custom_counter),
            source: QueueSource::Custom,
            identifier,
            title,
            description: description.filter(|d| !d.is_empty()),
            url: None,
            tracker_id: None,
            index: 0,
        };

        let at = match position {
            Some(p) if p >= 0 && (p as usize) < self.items.len() => p as usize,
            _ => self.items.len(),
        };
        self.items.insert(at, item);
        self.renumber();
        &self.items[at]
    }

    /// Update a custom item in place.
    pub fn update(&mut self, id: &str, changes: ItemChanges) -> Result<&QueueItem, QueueError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if !item.is_custom() {
            return Err(QueueError::NotCustom(id.to_string()));
        }

        if let Some(identifier) = changes.identifier.filter(|s| !s.is_empty()) {
            item.identifier = identifier;
        }
        if let Some(title) = changes.title.filter(|s| !s.is_empty()) {
            item.title = title;
        }
        if let Some(description) = changes.description.filter(|s| !s.is_empty()) {
            item.description = Some(description);
        }
        Ok(item)
    }

    /// Remove an item by ID.
    pub fn delete(&mut self, id: &str) -> Result<QueueItem, QueueError> {
        let pos = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        let removed = self.items.remove(pos);
        self.renumber();
        Ok(removed)
    }

    /// Rebuild the order from `ids`. Unknown and repeated IDs are skipped;
    /// items not mentioned keep their relative order at the end.
    pub fn reorder(&mut self, ids: &[String]) {
        let mut remaining: Vec<Option<QueueItem>> = self.items.drain(..).map(Some).collect();
        let mut ordered = Vec::with_capacity(remaining.len());

        for id in ids {
            if let Some(slot) = remaining
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|item| &item.id == id))
            {
                ordered.extend(slot.take());
            }
        }
        ordered.extend(remaining.into_iter().flatten());

        self.items = ordered;
        self.renumber();
    }

    /// Find an item by identifier and source.
    pub fn find(&self, identifier: &str, source: QueueSource) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.identifier == identifier && item.source == source)
    }

    /// Remove the custom item with this identifier, if any.
    pub fn remove_custom(&mut self, identifier: &str) -> Option<QueueItem> {
        self.remove_where(|item| item.is_custom() && item.identifier == identifier)
    }

    /// Remove the tracker item backed by this tracker issue ID, if any.
    pub fn remove_tracker(&mut self, tracker_id: &str) -> Option<QueueItem> {
        self.remove_where(|item| {
            item.source == QueueSource::Tracker && item.tracker_id.as_deref() == Some(tracker_id)
        })
    }

    fn remove_where<P>(&mut self, predicate: P) -> Option<QueueItem>
    where
        P: Fn(&QueueItem) -> bool,
    {
        let pos = self.items.iter().position(predicate)?;
        let removed = self.items.remove(pos);
        self.renumber();
        Some(removed)
    }

    fn renumber(&mut self) {
        for (i, item) in self.items.iter_mut().enumerate() {
            item.index = i;
        }
    }
}
