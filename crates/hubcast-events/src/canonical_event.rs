//! Canonical event model all raw activity is normalized into.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic carrying every canonical event regardless of kind.
pub const GENERIC_EVENT_TOPIC: &str = "github/event";

/// Source platform recorded on every canonical event.
pub const SOURCE_PLATFORM: &str = "github";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Owner/name pair identifying one concrete repository.
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some((owner, name)) = trimmed.split_once('/') else {
            bail!("invalid repository '{raw}', expected owner/repo");
        };
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{raw}', expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Acting identity attached to a canonical event.
pub struct EventActor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Closed enumeration of canonical event kinds.
pub enum EventKind {
    Issues,
    IssueComment,
    PullRequest,
    PullRequestReviewComment,
    Discussion,
    DiscussionComment,
    WorkflowRun,
    WorkflowJob,
    Watch,
    Fork,
    Push,
    Release,
}

impl EventKind {
    /// Stable per-kind topic segment; the full topic is `github/<segment>`
    /// and the per-action topic is `github/<segment>-<action>`.
    pub fn channel_topic(&self) -> &'static str {
        match self {
            Self::Issues => "issue",
            Self::IssueComment => "issue-comment",
            Self::PullRequest => "pull-request",
            Self::PullRequestReviewComment => "pull-request-review-comment",
            Self::Discussion => "discussion",
            Self::DiscussionComment => "discussion-comment",
            Self::WorkflowRun => "workflow-run",
            Self::WorkflowJob => "workflow-job",
            Self::Watch => "star",
            Self::Fork => "fork",
            Self::Push => "push",
            Self::Release => "release",
        }
    }

    /// Maps an activity-feed `type` string to a kind.
    pub fn from_feed_type(raw: &str) -> Option<Self> {
        match raw {
            "IssuesEvent" => Some(Self::Issues),
            "IssueCommentEvent" => Some(Self::IssueComment),
            "PullRequestEvent" => Some(Self::PullRequest),
            "PullRequestReviewCommentEvent" => Some(Self::PullRequestReviewComment),
            "DiscussionEvent" => Some(Self::Discussion),
            "DiscussionCommentEvent" => Some(Self::DiscussionComment),
            "WorkflowRunEvent" => Some(Self::WorkflowRun),
            "WorkflowJobEvent" => Some(Self::WorkflowJob),
            "WatchEvent" => Some(Self::Watch),
            "ForkEvent" => Some(Self::Fork),
            "PushEvent" => Some(Self::Push),
            "ReleaseEvent" => Some(Self::Release),
            _ => None,
        }
    }

    /// True for the subset of kinds that map onto a reply-able thread.
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            Self::Issues
                | Self::IssueComment
                | Self::PullRequest
                | Self::PullRequestReviewComment
                | Self::Discussion
                | Self::DiscussionComment
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Issue, pull request, or discussion summary carried by conversational
/// payloads.
pub struct ThreadInfo {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Comment summary carried by conversational payloads.
pub struct CommentInfo {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Push payload fields forwarded from the raw record.
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub commits: Vec<Value>,
    #[serde(default)]
    pub head_commit: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload_kind", rename_all = "snake_case")]
/// Type-specific payload union keyed by [`EventKind`].
pub enum EventPayload {
    Issue {
        issue: ThreadInfo,
    },
    IssueComment {
        issue: ThreadInfo,
        comment: CommentInfo,
    },
    PullRequest {
        pull_request: ThreadInfo,
    },
    PullRequestReviewComment {
        pull_request: ThreadInfo,
        comment: CommentInfo,
    },
    Discussion {
        discussion: ThreadInfo,
    },
    DiscussionComment {
        discussion: ThreadInfo,
        comment: CommentInfo,
    },
    WorkflowRun {
        workflow_run: Value,
        #[serde(default)]
        workflow: Option<Value>,
    },
    WorkflowJob {
        workflow_job: Value,
    },
    Watch,
    Fork {
        forkee: Value,
    },
    Push(PushPayload),
    Release {
        release: Value,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Issue { .. } => EventKind::Issues,
            Self::IssueComment { .. } => EventKind::IssueComment,
            Self::PullRequest { .. } => EventKind::PullRequest,
            Self::PullRequestReviewComment { .. } => EventKind::PullRequestReviewComment,
            Self::Discussion { .. } => EventKind::Discussion,
            Self::DiscussionComment { .. } => EventKind::DiscussionComment,
            Self::WorkflowRun { .. } => EventKind::WorkflowRun,
            Self::WorkflowJob { .. } => EventKind::WorkflowJob,
            Self::Watch => EventKind::Watch,
            Self::Fork { .. } => EventKind::Fork,
            Self::Push(_) => EventKind::Push,
            Self::Release { .. } => EventKind::Release,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Normalized representation all raw activity converges on before dispatch.
///
/// Constructed once by the normalizer, immutable afterwards, never persisted.
pub struct CanonicalEvent {
    pub id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub action: Option<String>,
    pub actor: EventActor,
    pub repository: RepoRef,
    pub payload: EventPayload,
    pub created_at: String,
    pub source_bot_id: String,
    pub source_platform: String,
}
