//! The voting session: participants, round, queue and suggestion state.
//!
//! A `Session` is meant to live behind a single lock. Every operation is
//! synchronous and returns an [`Outbox`] that must be delivered before the
//! lock is released, so per-connection delivery order follows mutation order.

use poker_types::{
    IssueConfirmPayload, IssueLoadedPayload, IssueSuggestedPayload, JoinRequest, QueueAddPayload,
    QueueDeletePayload, QueueReorderPayload, QueueSource, QueueSyncPayload, QueueUpdatePayload,
    RevealPayload, STALE_NOTICE, ServerMessage, TrackerIssue, VoteStatusPayload,
};
use tracing::{debug, info, warn};

use crate::consensus::consensus;
use crate::join::check_admission;
use crate::outbox::Outbox;
use crate::queue::{IssueQueue, ItemChanges};
use crate::registry::{ConnectionId, ConnectionRegistry, Participant};
use crate::round::Round;
use crate::suggestion::{self, ConfirmationRecord};
use crate::tracker::{
    EstimateAssignment, ResultsReport, assignment_error_message, format_results_comment,
};

/// Broadcast before the round of an auto-advanced confirmation.
pub const AUTO_ADVANCE_NOTICE: &str = "Advancing to next issue in queue...";

#[derive(Debug, Default)]
pub struct Session {
    registry: ConnectionRegistry,
    round: Round,
    queue: IssueQueue,
    /// Issues from the last bulk load, in tracker order.
    tracker_issues: Vec<TrackerIssue>,
    /// Index into `tracker_issues` offered to the host.
    pending: Option<usize>,
    /// Index of the most recently loaded tracker issue. Survives reset.
    tracker_cursor: Option<usize>,
    confirmations: ConfirmationRecord,
    /// Set by a successful estimate assignment, consumed by the next confirmation.
    just_assigned: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn participant_count(&self) -> usize {
        self.registry.count()
    }

    pub fn is_admitted(&self, id: ConnectionId) -> bool {
        self.registry.contains(id)
    }

    pub fn is_host(&self, id: ConnectionId) -> bool {
        self.registry.is_host(id)
    }

    pub fn participant(&self, id: ConnectionId) -> Option<&Participant> {
        self.registry.get(id)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn queue(&self) -> &IssueQueue {
        &self.queue
    }

    pub fn tracker_issues(&self) -> &[TrackerIssue] {
        &self.tracker_issues
    }

    pub fn pending_index(&self) -> Option<usize> {
        self.pending
    }

    pub fn tracker_cursor(&self) -> Option<usize> {
        self.tracker_cursor
    }

    /// True once a non-empty tracker list has been loaded.
    pub fn tracker_mode(&self) -> bool {
        !self.tracker_issues.is_empty()
    }

    /// Consensus over the current votes.
    pub fn consensus(&self) -> u32 {
        consensus(self.registry.votes())
    }

    /// The current suggestion, if the pending index points at a tracker issue.
    pub fn pending_suggestion(&self) -> Option<IssueSuggestedPayload> {
        let index = self.pending?;
        let issue = self.tracker_issues.get(index)?;
        Some(suggestion::suggest(issue, index))
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Validate and admit a participant.
    ///
    /// Every check and the admission happen within this call, so two callers
    /// serialized by the session lock can never both claim the same name or
    /// the host seat.
    pub fn join(&mut self, id: ConnectionId, request: &JoinRequest) -> Outbox {
        let mut out = Outbox::new();

        if self.registry.contains(id) {
            warn!(target: "poker::join", "Ignoring repeat join from {}", id);
            return out;
        }

        let name = match check_admission(&self.registry, &request.username, request.is_host) {
            Ok(name) => name,
            Err(rejection) => {
                info!(
                    target: "poker::join",
                    "Rejected join from {} ({:?}): {}",
                    id, request.username, rejection
                );
                out.to(id, ServerMessage::JoinError(rejection.to_string()));
                out.close(id);
                return out;
            }
        };

        self.registry
            .add(id, Participant::new(name.clone(), request.is_host));
        info!(
            target: "poker::join",
            "{} joined as {}{}",
            id,
            name,
            if request.is_host { " (host)" } else { "" }
        );

        out.to(id, ServerMessage::CurrentIssue(self.round.current_issue()));
        out.to(id, ServerMessage::CurrentEstimate(self.consensus().to_string()));
        out.extend(self.count_update());
        out.everyone(self.vote_status());
        out.everyone(self.queue_sync());

        if request.is_host {
            if let Some(loaded) = self.auto_load_head() {
                out.extend(loaded);
            } else if let Some(payload) = self.pending_suggestion() {
                out.to(id, ServerMessage::IssueSuggested(payload));
            }
        }

        out
    }

    /// Remove a participant. Only the first removal of an admitted
    /// participant produces a count update.
    pub fn leave(&mut self, id: ConnectionId) -> Outbox {
        match self.registry.remove(id) {
            Some(participant) => {
                info!(target: "poker::join", "{} ({}) left", participant.name, id);
                self.count_update()
            }
            None => Outbox::new(),
        }
    }

    /// Current participant count for everyone.
    pub fn count_update(&self) -> Outbox {
        let mut out = Outbox::new();
        out.everyone(ServerMessage::ParticipantCount(
            self.registry.count().to_string(),
        ));
        out
    }

    /// Load the queue head into an idle round when a host arrives.
    fn auto_load_head(&mut self) -> Option<Outbox> {
        if !self.tracker_mode() || self.round.has_issue() {
            return None;
        }
        let head = self.queue.head()?;
        if head.source != QueueSource::Tracker {
            return None;
        }
        let tracker_id = head.tracker_id.clone()?;
        let index = self
            .tracker_issues
            .iter()
            .position(|issue| issue.id == tracker_id)?;
        let issue = self.tracker_issues[index].clone();

        info!(target: "poker::suggest", "Auto-loading {} for arriving host", issue.identifier);
        let identifier = issue.identifier.clone();
        self.round.load_tracker(issue);
        self.tracker_cursor = Some(index);
        self.pending = None;
        self.queue.remove_tracker(&tracker_id);

        let mut out = Outbox::new();
        out.everyone(ServerMessage::IssueLoaded(IssueLoadedPayload {
            identifier,
            title: self.round.label().to_string(),
            queue_index: 0,
        }));
        out.everyone(ServerMessage::CurrentIssue(self.round.current_issue()));
        out.everyone(self.queue_sync());
        Some(out)
    }

    // ========================================================================
    // Round
    // ========================================================================

    /// Set the round issue. While a tracker issue is active, that issue is
    /// reloaded and `text` is ignored.
    pub fn new_issue(&mut self, id: ConnectionId, text: &str) -> Outbox {
        let active = self
            .tracker_cursor
            .and_then(|index| self.tracker_issues.get(index).cloned());

        match active {
            Some(issue) => self.round.load_tracker(issue),
            None => self.round.load_text(text),
        }
        info!(target: "poker::round", "{} set issue: {}", id, self.round.label());

        let mut out = Outbox::new();
        out.everyone(ServerMessage::CurrentIssue(self.round.current_issue()));
        out
    }

    /// Record a vote. Anything other than a positive integer is ignored.
    pub fn estimate(&mut self, id: ConnectionId, raw: &str) -> Outbox {
        let mut out = Outbox::new();

        let value = match raw.trim().parse::<u32>() {
            Ok(v) if v > 0 => v,
            _ => {
                warn!(target: "poker::round", "Ignoring invalid estimate {:?} from {}", raw, id);
                return out;
            }
        };

        let Some(participant) = self.registry.get_mut(id) else {
            return out;
        };
        participant.vote = value;
        debug!(target: "poker::round", "{} voted", participant.name);

        out.everyone(self.vote_status());
        out
    }

    /// Show every vote and the consensus. Votes are kept.
    pub fn reveal(&mut self, id: ConnectionId) -> Outbox {
        self.round.reveal();
        let point_avg = self.consensus();
        info!(target: "poker::round", "{} revealed votes, consensus {}", id, point_avg);

        let mut out = Outbox::new();
        out.everyone(ServerMessage::RevealData(RevealPayload {
            estimates: self.registry.estimates(),
            point_avg: point_avg.to_string(),
        }));
        out
    }

    /// Results comment for the tracker issue in the round, if there is one.
    ///
    /// Taken before [`Session::reset`], which clears votes and round.
    pub fn results_report(&self) -> Option<ResultsReport> {
        let issue = self.round.issue()?.clone();
        let body = format_results_comment(
            self.registry.iter().map(|(_, p)| (p.name.as_str(), p.vote)),
            self.consensus(),
        );
        Some(ResultsReport { issue, body })
    }

    /// Clear votes and the round, then offer the next tracker issue to hosts.
    pub fn reset(&mut self, id: ConnectionId) -> Outbox {
        let mut out = Outbox::new();

        self.registry.clear_votes();
        out.everyone(ServerMessage::ClearBoard);
        out.everyone(self.vote_status());
        self.round.clear();
        info!(target: "poker::round", "{} reset the round", id);

        if self.tracker_mode() {
            let next = self.tracker_cursor.map_or(0, |index| index + 1);
            if next < self.tracker_issues.len() {
                self.pending = Some(next);
                info!(
                    target: "poker::suggest",
                    "Next issue available: {}",
                    self.tracker_issues[next].identifier
                );
                out.hosts(ServerMessage::IssueSuggested(suggestion::suggest(
                    &self.tracker_issues[next],
                    next,
                )));
            } else {
                self.pending = None;
                info!(target: "poker::suggest", "All tracker issues have been estimated");
                out.hosts(ServerMessage::IssueSuggested(suggestion::no_more_issues()));
            }
        }

        out
    }

    // ========================================================================
    // Suggestion / confirmation
    // ========================================================================

    /// Apply a host confirmation of the suggested (or a directly picked) issue.
    pub fn confirm_issue(&mut self, id: ConnectionId, payload: &IssueConfirmPayload) -> Outbox {
        let mut out = Outbox::new();

        if self.confirmations.is_processed(&payload.request_id) {
            debug!(
                target: "poker::suggest",
                "Confirmation {} already processed",
                payload.request_id
            );
            return out;
        }

        if payload.queue_index == -1 {
            let source = if payload.is_custom {
                QueueSource::Custom
            } else {
                QueueSource::Tracker
            };
            if self.queue.find(&payload.identifier, source).is_none() {
                warn!(
                    target: "poker::suggest",
                    "{} not found in queue ({} items)",
                    payload.identifier,
                    self.queue.len()
                );
                if !payload.is_custom {
                    if let Some(current) = self.pending_suggestion() {
                        out.to(id, ServerMessage::IssueSuggested(current));
                    }
                }
                return out;
            }
            if !payload.is_custom {
                if let Some(index) = self
                    .tracker_issues
                    .iter()
                    .position(|issue| issue.identifier == payload.identifier)
                {
                    self.pending = Some(index);
                }
            }
        } else {
            let expected = self.pending.map_or(-1, |index| index as i64);
            if payload.queue_index != expected {
                info!(
                    target: "poker::suggest",
                    "Stale confirmation from {}: expected index {}, got {}",
                    id, expected, payload.queue_index
                );
                out.to(id, ServerMessage::IssueStale(STALE_NOTICE.to_string()));
                if let Some(current) = self.pending_suggestion() {
                    out.to(id, ServerMessage::IssueSuggested(current));
                }
                return out;
            }
        }

        if payload.is_custom {
            let label = self
                .queue
                .find(&payload.identifier, QueueSource::Custom)
                .map(|item| format!("{}: {}", item.identifier, item.title))
                .unwrap_or_else(|| payload.identifier.clone());
            self.confirmations.mark(&payload.request_id);
            self.round.load_text(label);
            self.queue.remove_custom(&payload.identifier);
        } else {
            let Some(index) = self.pending.filter(|i| *i < self.tracker_issues.len()) else {
                warn!(
                    target: "poker::suggest",
                    "No pending tracker issue for confirmation of {}",
                    payload.identifier
                );
                return out;
            };
            let issue = self.tracker_issues[index].clone();
            self.confirmations.mark(&payload.request_id);
            self.queue.remove_tracker(&issue.id);
            self.round.load_tracker(issue);
            self.tracker_cursor = Some(index);
        }
        self.pending = None;
        info!(target: "poker::suggest", "Confirmed {}", self.round.label());

        if self.just_assigned {
            self.just_assigned = false;
            out.everyone(ServerMessage::AutoAdvance(AUTO_ADVANCE_NOTICE.to_string()));
        }
        out.everyone(ServerMessage::IssueLoaded(IssueLoadedPayload {
            identifier: payload.identifier.clone(),
            title: self.round.label().to_string(),
            queue_index: payload.queue_index,
        }));
        out.everyone(ServerMessage::CurrentIssue(self.round.current_issue()));
        out.everyone(self.queue_sync());
        out
    }

    // ========================================================================
    // Queue (host only)
    // ========================================================================

    fn require_host(&self, id: ConnectionId, action: &str) -> bool {
        if self.registry.is_host(id) {
            return true;
        }
        warn!(target: "poker::queue", "Non-host {} attempted to {}", id, action);
        false
    }

    pub fn queue_add(&mut self, id: ConnectionId, payload: QueueAddPayload) -> Outbox {
        let mut out = Outbox::new();
        if !self.require_host(id, "add a queue item") {
            return out;
        }
        let item = self.queue.add(
            payload.identifier,
            payload.title,
            payload.description,
            payload.index,
        );
        info!(target: "poker::queue", "Added {} at {}", item.identifier, item.index);
        out.everyone(self.queue_sync());
        out
    }

    pub fn queue_update(&mut self, id: ConnectionId, payload: QueueUpdatePayload) -> Outbox {
        let mut out = Outbox::new();
        if !self.require_host(id, "update a queue item") {
            return out;
        }
        let changes = ItemChanges {
            identifier: payload.identifier,
            title: payload.title,
            description: payload.description,
        };
        match self.queue.update(&payload.id, changes) {
            Ok(item) => {
                info!(target: "poker::queue", "Updated {}", item.id);
                out.everyone(self.queue_sync());
            }
            Err(e) => warn!(target: "poker::queue", "Update rejected: {}", e),
        }
        out
    }

    pub fn queue_delete(&mut self, id: ConnectionId, payload: QueueDeletePayload) -> Outbox {
        let mut out = Outbox::new();
        if !self.require_host(id, "delete a queue item") {
            return out;
        }
        match self.queue.delete(&payload.id) {
            Ok(item) => {
                info!(target: "poker::queue", "Deleted {}", item.identifier);
                out.everyone(self.queue_sync());
            }
            Err(e) => info!(target: "poker::queue", "Delete skipped: {}", e),
        }
        out
    }

    pub fn queue_reorder(&mut self, id: ConnectionId, payload: QueueReorderPayload) -> Outbox {
        let mut out = Outbox::new();
        if !self.require_host(id, "reorder the queue") {
            return out;
        }
        self.queue.reorder(&payload.item_ids);
        info!(target: "poker::queue", "Reordered queue, {} items", self.queue.len());
        out.everyone(self.queue_sync());
        out
    }

    // ========================================================================
    // Tracker integration
    // ========================================================================

    /// Replace the tracker issue list and rebuild the queue from it.
    pub fn load_tracker_issues(&mut self, issues: Vec<TrackerIssue>) -> Outbox {
        self.queue.load_tracker(&issues);
        self.pending = if issues.is_empty() { None } else { Some(0) };
        self.tracker_cursor = None;
        self.tracker_issues = issues;
        info!(
            target: "poker::tracker",
            "Loaded {} tracker issues into the queue",
            self.tracker_issues.len()
        );

        let mut out = Outbox::new();
        if !self.registry.is_empty() {
            out.everyone(self.queue_sync());
        }
        out
    }

    /// What to write to the tracker for `assignEstimate`, if anything.
    pub fn prepare_assignment(&self, id: ConnectionId) -> Option<EstimateAssignment> {
        if !self.registry.is_host(id) {
            warn!(target: "poker::tracker", "Non-host {} attempted to assign an estimate", id);
            return None;
        }
        let Some(issue) = self.round.issue() else {
            info!(target: "poker::tracker", "No tracker issue in the current round");
            return None;
        };
        let value = self.consensus();
        if value == 0 {
            info!(target: "poker::tracker", "No estimates to assign to {}", issue.identifier);
            return None;
        }
        Some(EstimateAssignment {
            issue_id: issue.id.clone(),
            identifier: issue.identifier.clone(),
            value,
        })
    }

    /// Report the outcome of an estimate assignment to the requesting host.
    pub fn finish_assignment(
        &mut self,
        id: ConnectionId,
        assignment: &EstimateAssignment,
        outcome: Result<(), String>,
    ) -> Outbox {
        let mut out = Outbox::new();
        match outcome {
            Ok(()) => {
                info!(
                    target: "poker::tracker",
                    "Assigned estimate {} to {}",
                    assignment.value, assignment.identifier
                );
                self.just_assigned = true;
                out.to(
                    id,
                    ServerMessage::EstimateAssignmentSuccess(assignment.success_message()),
                );
            }
            Err(reason) => {
                warn!(
                    target: "poker::tracker",
                    "Failed to assign estimate to {}: {}",
                    assignment.identifier, reason
                );
                out.to(
                    id,
                    ServerMessage::EstimateAssignmentError(assignment_error_message(&reason)),
                );
            }
        }
        out
    }

    /// Drop every participant and all round, queue and confirmation state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    fn vote_status(&self) -> ServerMessage {
        ServerMessage::VoteStatus(VoteStatusPayload {
            voters: self.registry.vote_status(),
        })
    }

    fn queue_sync(&self) -> ServerMessage {
        ServerMessage::QueueSync(QueueSyncPayload {
            items: self.queue.items().to_vec(),
        })
    }
}
