//! WebSocket message protocol between participants and the server.
//!
//! Every frame is a JSON envelope `{"type": <tag>, "payload": <...>}`.
//! Inbound frames are decoded once into [`ClientMessage`]; outbound frames are
//! produced from [`ServerMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{QueueItem, TrackerIssue};

/// Suggestion payload format version.
pub const SUGGESTION_VERSION: u32 = 1;

/// Payload sent with `issueStale`.
pub const STALE_NOTICE: &str = "Queue has changed, please refresh";

/// Errors decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid {kind} payload: {reason}")]
    Payload { kind: &'static str, reason: String },
}

/// Raw envelope before per-type decoding.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// A normalized join request.
///
/// Both the structured payload and the legacy bare-string payload decode to
/// this; legacy joins never claim host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub username: String,
    pub is_host: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JoinPayload {
    Structured {
        #[serde(default)]
        username: String,
        #[serde(default, rename = "isHost")]
        is_host: bool,
    },
    Legacy(String),
}

/// Host confirmation of a suggested (or directly picked) issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueConfirmPayload {
    pub request_id: String,
    pub identifier: String,
    /// Index the suggestion was issued for, or `-1` for a pick from the queue list.
    pub queue_index: i64,
    #[serde(default)]
    pub is_custom: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueAddPayload {
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Insert position; appended when absent or out of range.
    #[serde(default)]
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdatePayload {
    pub id: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDeletePayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueReorderPayload {
    pub item_ids: Vec<String>,
}

/// Messages sent from a participant to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Join(JoinRequest),
    NewIssue(String),
    /// Raw estimate text; validated by the round.
    Estimate(String),
    Reveal,
    Reset,
    Leave,
    IssueConfirm(IssueConfirmPayload),
    QueueAdd(QueueAddPayload),
    QueueUpdate(QueueUpdatePayload),
    QueueDelete(QueueDeletePayload),
    QueueReorder(QueueReorderPayload),
    AssignEstimate,
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Envelope)?;
        let payload = envelope.payload;

        let msg = match envelope.kind.as_str() {
            "join" => ClientMessage::Join(decode_join(payload)?),
            "newIssue" => ClientMessage::NewIssue(payload_text("newIssue", payload)?),
            "estimate" => ClientMessage::Estimate(payload_text("estimate", payload)?),
            "reveal" => ClientMessage::Reveal,
            "reset" => ClientMessage::Reset,
            "leave" => ClientMessage::Leave,
            "assignEstimate" => ClientMessage::AssignEstimate,
            "issueConfirm" => ClientMessage::IssueConfirm(payload_struct("issueConfirm", payload)?),
            "queueAdd" => ClientMessage::QueueAdd(payload_struct("queueAdd", payload)?),
            "queueUpdate" => ClientMessage::QueueUpdate(payload_struct("queueUpdate", payload)?),
            "queueDelete" => ClientMessage::QueueDelete(payload_struct("queueDelete", payload)?),
            "queueReorder" => {
                ClientMessage::QueueReorder(payload_struct("queueReorder", payload)?)
            }
            other => return Err(DecodeError::UnknownType(other.to_string())),
        };
        Ok(msg)
    }

    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join(_) => "join",
            ClientMessage::NewIssue(_) => "newIssue",
            ClientMessage::Estimate(_) => "estimate",
            ClientMessage::Reveal => "reveal",
            ClientMessage::Reset => "reset",
            ClientMessage::Leave => "leave",
            ClientMessage::IssueConfirm(_) => "issueConfirm",
            ClientMessage::QueueAdd(_) => "queueAdd",
            ClientMessage::QueueUpdate(_) => "queueUpdate",
            ClientMessage::QueueDelete(_) => "queueDelete",
            ClientMessage::QueueReorder(_) => "queueReorder",
            ClientMessage::AssignEstimate => "assignEstimate",
        }
    }
}

fn decode_join(payload: Value) -> Result<JoinRequest, DecodeError> {
    if payload.is_null() {
        return Ok(JoinRequest {
            username: String::new(),
            is_host: false,
        });
    }
    let parsed: JoinPayload = serde_json::from_value(payload).map_err(|e| DecodeError::Payload {
        kind: "join",
        reason: e.to_string(),
    })?;
    Ok(match parsed {
        JoinPayload::Structured { username, is_host } => JoinRequest { username, is_host },
        JoinPayload::Legacy(username) => JoinRequest {
            username,
            is_host: false,
        },
    })
}

fn payload_text(kind: &'static str, payload: Value) -> Result<String, DecodeError> {
    match payload {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(DecodeError::Payload {
            kind,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn payload_struct<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    payload: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|e| DecodeError::Payload {
        kind,
        reason: e.to_string(),
    })
}

/// Current round issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentIssuePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_issue: Option<TrackerIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterInfo {
    pub username: String,
    pub has_voted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatusPayload {
    pub voters: Vec<VoterInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEstimate {
    pub user: String,
    pub estimate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealPayload {
    pub estimates: Vec<UserEstimate>,
    pub point_avg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSyncPayload {
    pub items: Vec<QueueItem>,
}

/// Origin of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Tracker,
    /// Server notice, e.g. "no more issues".
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSuggestedPayload {
    pub version: u32,
    pub source: SuggestionSource,
    pub identifier: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub queue_index: i64,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLoadedPayload {
    pub identifier: String,
    pub title: String,
    pub queue_index: i64,
}

/// Messages sent from the server to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Join rejected; the connection is closed after this frame.
    JoinError(String),
    CurrentIssue(CurrentIssuePayload),
    CurrentEstimate(String),
    ParticipantCount(String),
    VoteStatus(VoteStatusPayload),
    ClearBoard,
    RevealData(RevealPayload),
    QueueSync(QueueSyncPayload),
    IssueSuggested(IssueSuggestedPayload),
    IssueLoaded(IssueLoadedPayload),
    IssueStale(String),
    EstimateAssignmentSuccess(String),
    EstimateAssignmentError(String),
    AutoAdvance(String),
}

impl ServerMessage {
    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::JoinError(_) => "joinError",
            ServerMessage::CurrentIssue(_) => "currentIssue",
            ServerMessage::CurrentEstimate(_) => "currentEstimate",
            ServerMessage::ParticipantCount(_) => "participantCount",
            ServerMessage::VoteStatus(_) => "voteStatus",
            ServerMessage::ClearBoard => "clearBoard",
            ServerMessage::RevealData(_) => "revealData",
            ServerMessage::QueueSync(_) => "queueSync",
            ServerMessage::IssueSuggested(_) => "issueSuggested",
            ServerMessage::IssueLoaded(_) => "issueLoaded",
            ServerMessage::IssueStale(_) => "issueStale",
            ServerMessage::EstimateAssignmentSuccess(_) => "estimateAssignmentSuccess",
            ServerMessage::EstimateAssignmentError(_) => "estimateAssignmentError",
            ServerMessage::AutoAdvance(_) => "autoAdvance",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========================================================================
    // CLIENT MESSAGE DECODING
    // ========================================================================

    #[test]
    fn test_decode_structured_join() {
        let frame = json!({"type": "join", "payload": {"username": "alice", "isHost": true}});
        let msg = ClientMessage::decode(&frame.to_string()).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join(JoinRequest {
                username: "alice".to_string(),
                is_host: true,
            })
        );
    }

    #[test]
    fn test_decode_legacy_join_defaults_to_player() {
        let msg = ClientMessage::decode(r#"{"type":"join","payload":"bob"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join(JoinRequest {
                username: "bob".to_string(),
                is_host: false,
            })
        );
    }

    #[test]
    fn test_decode_join_without_payload() {
        let msg = ClientMessage::decode(r#"{"type":"join"}"#).unwrap();
        match msg {
            ClientMessage::Join(req) => assert!(req.username.is_empty()),
            other => panic!("Expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_estimate_accepts_string_and_number() {
        let msg = ClientMessage::decode(r#"{"type":"estimate","payload":"5"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Estimate("5".to_string()));

        let msg = ClientMessage::decode(r#"{"type":"estimate","payload":8}"#).unwrap();
        assert_eq!(msg, ClientMessage::Estimate("8".to_string()));
    }

    #[test]
    fn test_decode_empty_payload_commands() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"reveal","payload":""}"#).unwrap(),
            ClientMessage::Reveal
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"reset"}"#).unwrap(),
            ClientMessage::Reset
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"assignEstimate","payload":""}"#).unwrap(),
            ClientMessage::AssignEstimate
        );
    }

    #[test]
    fn test_decode_issue_confirm() {
        let frame = json!({
            "type": "issueConfirm",
            "payload": {"requestId": "r-1", "identifier": "CDP-1", "queueIndex": -1, "isCustom": false}
        });
        let msg = ClientMessage::decode(&frame.to_string()).unwrap();
        assert_eq!(
            msg,
            ClientMessage::IssueConfirm(IssueConfirmPayload {
                request_id: "r-1".to_string(),
                identifier: "CDP-1".to_string(),
                queue_index: -1,
                is_custom: false,
            })
        );
    }

    #[test]
    fn test_decode_queue_messages() {
        let frame = json!({"type": "queueAdd", "payload": {"identifier": "X-1", "title": "Spike", "index": 0}});
        match ClientMessage::decode(&frame.to_string()).unwrap() {
            ClientMessage::QueueAdd(p) => {
                assert_eq!(p.index, Some(0));
                assert_eq!(p.description, None);
            }
            other => panic!("Expected queueAdd, got {:?}", other),
        }

        let frame = json!({"type": "queueReorder", "payload": {"itemIds": ["b", "a"]}});
        assert_eq!(
            ClientMessage::decode(&frame.to_string()).unwrap(),
            ClientMessage::QueueReorder(QueueReorderPayload {
                item_ids: vec!["b".to_string(), "a".to_string()],
            })
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            ClientMessage::decode("not json"),
            Err(DecodeError::Envelope(_))
        ));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"dance","payload":""}"#),
            Err(DecodeError::UnknownType(t)) if t == "dance"
        ));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"queueDelete","payload":"oops"}"#),
            Err(DecodeError::Payload { kind: "queueDelete", .. })
        ));
    }

    // ========================================================================
    // SERVER MESSAGE ENCODING
    // ========================================================================

    #[test]
    fn test_server_message_envelope_shape() {
        let msg = ServerMessage::ParticipantCount("3".to_string());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "participantCount", "payload": "3"}));
    }

    #[test]
    fn test_clear_board_has_no_payload() {
        let value = serde_json::to_value(ServerMessage::ClearBoard).unwrap();
        assert_eq!(value, json!({"type": "clearBoard"}));
    }

    #[test]
    fn test_issue_suggested_serialization() {
        let msg = ServerMessage::IssueSuggested(IssueSuggestedPayload {
            version: SUGGESTION_VERSION,
            source: SuggestionSource::System,
            identifier: String::new(),
            title: "No more issues in queue".to_string(),
            description: None,
            url: None,
            queue_index: -1,
            has_more: false,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "issueSuggested");
        assert_eq!(value["payload"]["source"], "system");
        assert_eq!(value["payload"]["queueIndex"], -1);
        assert!(value["payload"].get("description").is_none());
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let messages = vec![
            ServerMessage::JoinError("x".to_string()),
            ServerMessage::ClearBoard,
            ServerMessage::IssueStale(STALE_NOTICE.to_string()),
            ServerMessage::EstimateAssignmentSuccess("ok".to_string()),
            ServerMessage::AutoAdvance("next".to_string()),
        ];
        for msg in messages {
            let value = serde_json::to_value(&msg).unwrap();
            assert_eq!(value["type"], msg.kind());
        }
    }
}
