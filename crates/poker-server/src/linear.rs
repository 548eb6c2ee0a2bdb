//! Linear issue tracker adapter.
//!
//! Talks to the Linear GraphQL API: resolves a cycle URL to a cycle, fetches
//! its unestimated issues, posts results comments and writes estimates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use poker_core::{IssueTracker, PokerError};
use poker_types::TrackerIssue;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// `<org>/team/<KEY>/cycle/<selector>` once the URL path is trimmed of slashes.
static CYCLE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^/]+/team/([^/]+)/cycle/(.+)$").expect("Invalid cycle path regex")
});

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TEAMS_QUERY: &str = r#"query Teams {
  teams(first: 100) {
    nodes { id key name }
  }
}"#;

const CYCLES_QUERY: &str = r#"query Cycles {
  organization {
    teams(first: 100) {
      nodes {
        id
        cycles(first: 50) {
          nodes { id name number startsAt endsAt }
        }
      }
    }
  }
}"#;

const ISSUES_QUERY: &str = r#"query CycleIssues($cycleId: ID!) {
  issues(first: 100, filter: { cycle: { id: { eq: $cycleId } }, estimate: { null: true } }) {
    nodes { id identifier title description url estimate }
  }
}"#;

const COMMENT_MUTATION: &str = r#"mutation CommentCreate($issueId: String!, $body: String!) {
  commentCreate(input: { issueId: $issueId, body: $body }) {
    success
    comment { id }
  }
}"#;

const ESTIMATE_MUTATION: &str = r#"mutation IssueEstimate($id: String!, $estimate: Int!) {
  issueUpdate(id: $id, input: { estimate: $estimate }) {
    success
  }
}"#;

#[derive(Debug, Error)]
pub enum LinearError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("response contained no data")]
    MissingData,

    #[error("{0} was not successful")]
    Unsuccessful(&'static str),

    #[error("invalid cycle URL format, expected: linear.app/{{org}}/team/{{team}}/cycle/{{type}}")]
    InvalidCycleUrl,

    #[error("team with key '{0}' not found")]
    TeamNotFound(String),

    #[error("no matching cycle found for '{selector}' in team {team}")]
    CycleNotFound { selector: String, team: String },
}

impl From<LinearError> for PokerError {
    fn from(e: LinearError) -> Self {
        let message = e.to_string();
        match e {
            LinearError::InvalidCycleUrl => PokerError::InvalidCycle(message),
            _ => PokerError::Tracker(message),
        }
    }
}

/// A parsed cycle URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRef {
    pub team_key: String,
    /// `upcoming`, `current`, or a cycle name.
    pub selector: String,
}

pub fn parse_cycle_url(raw: &str) -> Result<CycleRef, LinearError> {
    let url = Url::parse(raw.trim()).map_err(|_| LinearError::InvalidCycleUrl)?;
    let path = url.path().trim_matches('/');
    let caps = CYCLE_PATH
        .captures(path)
        .ok_or(LinearError::InvalidCycleUrl)?;
    Ok(CycleRef {
        team_key: caps[1].to_string(),
        selector: caps[2].to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub ends_at: Option<String>,
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Pick the cycle a selector refers to.
///
/// `upcoming` is the earliest cycle that has not started, `current` the first
/// one running at `now`; anything else matches a cycle name ignoring case.
pub fn select_cycle<'a>(cycles: &'a [Cycle], selector: &str, now: DateTime<Utc>) -> Option<&'a Cycle> {
    match selector {
        "upcoming" => cycles
            .iter()
            .filter_map(|c| parse_time(c.starts_at.as_deref()).map(|start| (start, c)))
            .filter(|(start, _)| *start > now)
            .min_by_key(|(start, _)| *start)
            .map(|(_, c)| c),
        "current" => cycles.iter().find(|c| {
            match (
                parse_time(c.starts_at.as_deref()),
                parse_time(c.ends_at.as_deref()),
            ) {
                (Some(start), Some(end)) => start < now && now < end,
                _ => false,
            }
        }),
        name => cycles.iter().find(|c| {
            c.name
                .as_deref()
                .is_some_and(|n| n.to_lowercase() == name.to_lowercase())
        }),
    }
}

// GraphQL response shapes

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct Team {
    id: String,
    key: String,
}

#[derive(Deserialize)]
struct TeamsData {
    teams: Nodes<Team>,
}

#[derive(Deserialize)]
struct TeamCycles {
    id: String,
    cycles: Nodes<Cycle>,
}

#[derive(Deserialize)]
struct Organization {
    teams: Nodes<TeamCycles>,
}

#[derive(Deserialize)]
struct CyclesData {
    organization: Organization,
}

#[derive(Deserialize)]
struct IssueNode {
    id: String,
    identifier: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct IssuesData {
    issues: Nodes<IssueNode>,
}

#[derive(Deserialize)]
struct MutationResult {
    success: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentCreateData {
    comment_create: MutationResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueUpdateData {
    issue_update: MutationResult,
}

impl From<IssueNode> for TrackerIssue {
    fn from(node: IssueNode) -> Self {
        TrackerIssue {
            id: node.id,
            identifier: node.identifier,
            title: node.title,
            description: node.description.unwrap_or_default(),
            url: node.url.unwrap_or_default(),
        }
    }
}

/// Linear GraphQL client.
#[derive(Debug, Clone)]
pub struct LinearClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl LinearClient {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Result<Self, LinearError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            api_url: api_url.into(),
        })
    }

    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, LinearError> {
        let resp = self
            .http
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LinearError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GraphQlResponse<T> = resp.json().await?;
        if !parsed.errors.is_empty() {
            return Err(LinearError::GraphQl(Value::Array(parsed.errors).to_string()));
        }
        parsed.data.ok_or(LinearError::MissingData)
    }

    /// Issues without an estimate in the cycle `cycle` refers to.
    pub async fn fetch_cycle_issues(&self, cycle: &CycleRef) -> Result<Vec<TrackerIssue>, LinearError> {
        let teams: TeamsData = self.execute(TEAMS_QUERY, json!({})).await?;
        let team_id = teams
            .teams
            .nodes
            .into_iter()
            .find(|t| t.key == cycle.team_key)
            .map(|t| t.id)
            .ok_or_else(|| LinearError::TeamNotFound(cycle.team_key.clone()))?;

        let cycles: CyclesData = self.execute(CYCLES_QUERY, json!({})).await?;
        let team_cycles = cycles
            .organization
            .teams
            .nodes
            .into_iter()
            .find(|t| t.id == team_id)
            .map(|t| t.cycles.nodes)
            .unwrap_or_default();

        let not_found = || LinearError::CycleNotFound {
            selector: cycle.selector.clone(),
            team: cycle.team_key.clone(),
        };
        let cycle_id = select_cycle(&team_cycles, &cycle.selector, Utc::now())
            .map(|c| c.id.clone())
            .ok_or_else(not_found)?;
        debug!(target: "poker::tracker", "Resolved {}/{} to cycle {}", cycle.team_key, cycle.selector, cycle_id);

        let issues: IssuesData = self
            .execute(ISSUES_QUERY, json!({ "cycleId": cycle_id }))
            .await?;
        Ok(issues.issues.nodes.into_iter().map(TrackerIssue::from).collect())
    }

    pub async fn create_comment(&self, issue_id: &str, body: &str) -> Result<(), LinearError> {
        let data: CommentCreateData = self
            .execute(COMMENT_MUTATION, json!({ "issueId": issue_id, "body": body }))
            .await?;
        if !data.comment_create.success {
            return Err(LinearError::Unsuccessful("comment creation"));
        }
        Ok(())
    }

    pub async fn set_estimate(&self, issue_id: &str, estimate: u32) -> Result<(), LinearError> {
        let data: IssueUpdateData = self
            .execute(ESTIMATE_MUTATION, json!({ "id": issue_id, "estimate": estimate }))
            .await?;
        if !data.issue_update.success {
            return Err(LinearError::Unsuccessful("estimate update"));
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for LinearClient {
    async fn fetch_issues_for_cycle(&self, cycle: &str) -> poker_core::Result<Vec<TrackerIssue>> {
        let cycle = parse_cycle_url(cycle)?;
        let issues = self.fetch_cycle_issues(&cycle).await?;
        info!(
            target: "poker::tracker",
            "Fetched {} unestimated issues from {}/{}",
            issues.len(), cycle.team_key, cycle.selector
        );
        Ok(issues)
    }

    async fn post_result_comment(&self, issue_id: &str, body: &str) -> poker_core::Result<()> {
        self.create_comment(issue_id, body).await?;
        debug!(target: "poker::tracker", "Posted results comment on {}", issue_id);
        Ok(())
    }

    async fn update_estimate_field(&self, issue_id: &str, value: u32) -> poker_core::Result<()> {
        Ok(self.set_estimate(issue_id, value).await?)
    }
}
