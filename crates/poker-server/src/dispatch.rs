//! Routing of decoded client messages to session operations.
//!
//! Session mutations run under the hub lock. Tracker calls happen between
//! lock scopes so a slow adapter never stalls other participants.

use crate::state::AppState;
use poker_core::ConnectionId;
use poker_types::ClientMessage;
use tracing::{debug, warn};

/// What the reader loop should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub async fn dispatch(state: &AppState, id: ConnectionId, msg: ClientMessage) -> Flow {
    let hub = &state.hub;

    if let ClientMessage::Join(request) = &msg {
        let closed = hub.run(|session, out| {
            out.extend(session.join(id, request));
            out.close_target() == Some(id)
        });
        return if closed { Flow::Close } else { Flow::Continue };
    }

    let kind = msg.kind();
    let admitted = hub.run(|session, out| {
        if !session.is_admitted(id) {
            return false;
        }
        match &msg {
            ClientMessage::NewIssue(text) => out.extend(session.new_issue(id, text)),
            ClientMessage::Estimate(raw) => out.extend(session.estimate(id, raw)),
            ClientMessage::Reveal => out.extend(session.reveal(id)),
            ClientMessage::Leave => out.extend(session.count_update()),
            ClientMessage::IssueConfirm(payload) => out.extend(session.confirm_issue(id, payload)),
            ClientMessage::QueueAdd(payload) => out.extend(session.queue_add(id, payload.clone())),
            ClientMessage::QueueUpdate(payload) => {
                out.extend(session.queue_update(id, payload.clone()))
            }
            ClientMessage::QueueDelete(payload) => {
                out.extend(session.queue_delete(id, payload.clone()))
            }
            ClientMessage::QueueReorder(payload) => {
                out.extend(session.queue_reorder(id, payload.clone()))
            }
            ClientMessage::Join(_) | ClientMessage::Reset | ClientMessage::AssignEstimate => {}
        }
        true
    });

    if !admitted {
        debug!(target: "poker::ws", "Ignoring {} from unadmitted {}", kind, id);
        return Flow::Continue;
    }

    match msg {
        ClientMessage::Reset => reset(state, id).await,
        ClientMessage::AssignEstimate => assign_estimate(state, id).await,
        _ => {}
    }
    Flow::Continue
}

/// Clear the round and post its results to the tracker.
///
/// The report is taken in the same lock scope as the clear, so concurrent
/// resets post one comment and no vote lands between snapshot and clear.
async fn reset(state: &AppState, id: ConnectionId) {
    let report = state.hub.run(|session, out| {
        let report = session.results_report();
        out.extend(session.reset(id));
        report
    });

    let (Some(tracker), Some(report)) = (&state.tracker, report) else {
        return;
    };
    if let Err(e) = tracker
        .post_result_comment(&report.issue.id, &report.body)
        .await
    {
        warn!(
            target: "poker::tracker",
            "Failed to post results to {}: {}",
            report.issue.identifier, e
        );
    }
}

async fn assign_estimate(state: &AppState, id: ConnectionId) {
    let Some(tracker) = &state.tracker else {
        warn!(target: "poker::tracker", "assignEstimate from {} without a configured tracker", id);
        return;
    };

    let Some(assignment) = state.hub.run(|session, _| session.prepare_assignment(id)) else {
        return;
    };

    let outcome = tracker
        .update_estimate_field(&assignment.issue_id, assignment.value)
        .await
        .map_err(|e| e.to_string());

    state
        .hub
        .apply(|session| session.finish_assignment(id, &assignment, outcome));
}
