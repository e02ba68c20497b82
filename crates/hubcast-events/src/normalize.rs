//! Normalization of raw activity shapes into [`CanonicalEvent`].
//!
//! Three shapes arrive here: activity-feed records (typed, newest-first),
//! webhook delivery bodies (shape identified only by which fields are
//! present), and notification-derived synthetic comments. All three converge
//! on the same canonical model; unrecognized shapes yield `None` and the
//! caller logs the miss.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical_event::{
    CanonicalEvent, CommentInfo, EventActor, EventKind, EventPayload, RepoRef, ThreadInfo,
    SOURCE_PLATFORM,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
/// Actor shape of an activity-feed record. Push records may carry only a
/// `name`, so every field is optional.
pub struct FeedActor {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub display_login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl FeedActor {
    fn to_event_actor(&self) -> EventActor {
        let login = self
            .login
            .as_deref()
            .or(self.display_login.as_deref())
            .or(self.name.as_deref())
            .unwrap_or_default()
            .to_string();
        EventActor {
            login,
            avatar_url: self.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// One record of the per-repository activity feed.
pub struct FeedEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub actor: FeedActor,
    #[serde(default)]
    pub payload: Value,
    pub created_at: String,
}

/// Normalized webhook body before identity/time stamping.
#[derive(Debug, Clone)]
pub struct NormalizedWebhook {
    pub kind: EventKind,
    pub action: Option<String>,
    pub actor: EventActor,
    pub payload: EventPayload,
}

impl NormalizedWebhook {
    /// Stamps the webhook shape into a full canonical event. The caller
    /// supplies the process-unique id and observation time.
    pub fn into_event(
        self,
        id: String,
        created_at: String,
        repository: RepoRef,
        bot_id: &str,
    ) -> CanonicalEvent {
        CanonicalEvent {
            id,
            kind: self.kind,
            action: self.action,
            actor: self.actor,
            repository,
            payload: self.payload,
            created_at,
            source_bot_id: bot_id.to_string(),
            source_platform: SOURCE_PLATFORM.to_string(),
        }
    }
}

fn part<T: DeserializeOwned>(payload: &Value, key: &str) -> Option<T> {
    serde_json::from_value(payload.get(key)?.clone()).ok()
}

fn action_of(payload: &Value) -> Option<String> {
    payload
        .get("action")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn actor_from_value(value: Option<&Value>) -> Option<EventActor> {
    let value = value?;
    let login = value
        .get("login")
        .and_then(Value::as_str)
        .or_else(|| value.get("name").and_then(Value::as_str))?
        .to_string();
    let avatar_url = value
        .get("avatar_url")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(EventActor { login, avatar_url })
}

/// Builds the typed payload for a feed record of the given kind; `None` when
/// the required sub-objects are missing or malformed.
fn payload_from_value(kind: EventKind, payload: &Value) -> Option<EventPayload> {
    match kind {
        EventKind::Issues => Some(EventPayload::Issue {
            issue: part(payload, "issue")?,
        }),
        EventKind::IssueComment => Some(EventPayload::IssueComment {
            issue: part(payload, "issue")?,
            comment: part(payload, "comment")?,
        }),
        EventKind::PullRequest => Some(EventPayload::PullRequest {
            pull_request: part(payload, "pull_request")?,
        }),
        EventKind::PullRequestReviewComment => Some(EventPayload::PullRequestReviewComment {
            pull_request: part(payload, "pull_request")?,
            comment: part(payload, "comment")?,
        }),
        EventKind::Discussion => Some(EventPayload::Discussion {
            discussion: part(payload, "discussion")?,
        }),
        EventKind::DiscussionComment => Some(EventPayload::DiscussionComment {
            discussion: part(payload, "discussion")?,
            comment: part(payload, "comment")?,
        }),
        EventKind::WorkflowRun => Some(EventPayload::WorkflowRun {
            workflow_run: payload.get("workflow_run")?.clone(),
            workflow: payload.get("workflow").cloned(),
        }),
        EventKind::WorkflowJob => Some(EventPayload::WorkflowJob {
            workflow_job: payload.get("workflow_job")?.clone(),
        }),
        EventKind::Watch => Some(EventPayload::Watch),
        EventKind::Fork => Some(EventPayload::Fork {
            forkee: payload.get("forkee")?.clone(),
        }),
        EventKind::Push => serde_json::from_value(payload.clone())
            .ok()
            .map(EventPayload::Push),
        EventKind::Release => Some(EventPayload::Release {
            release: payload.get("release")?.clone(),
        }),
    }
}

/// Normalizes one activity-feed record. The feed's native id is preserved as
/// the canonical id. Returns `None` for unrecognized or malformed records.
pub fn normalize_feed_event(
    event: &FeedEvent,
    repository: &RepoRef,
    bot_id: &str,
) -> Option<CanonicalEvent> {
    let kind = EventKind::from_feed_type(&event.event_type)?;
    let payload = payload_from_value(kind, &event.payload)?;
    let action = match kind {
        // Feed watch records omit the action; webhook star deliveries say
        // started/deleted, so default the feed side to started.
        EventKind::Watch => Some(
            action_of(&event.payload).unwrap_or_else(|| "started".to_string()),
        ),
        _ => action_of(&event.payload),
    };
    Some(CanonicalEvent {
        id: event.id.clone(),
        kind,
        action,
        actor: event.actor.to_event_actor(),
        repository: repository.clone(),
        payload,
        created_at: event.created_at.clone(),
        source_bot_id: bot_id.to_string(),
        source_platform: SOURCE_PLATFORM.to_string(),
    })
}

/// Resolves a webhook delivery body whose only structural signal is which
/// fields are present.
///
/// The predicate order below is load-bearing: payloads can satisfy more than
/// one predicate (a pull-request body also carries `ref`-like fields), so the
/// first match wins and the order must not be rearranged.
pub fn normalize_webhook_payload(body: &Value) -> Option<NormalizedWebhook> {
    let action = body.get("action").and_then(Value::as_str).map(str::to_string);
    let sender = actor_from_value(body.get("sender"));

    let has = |key: &str| body.get(key).is_some();

    if has("issue") && has("comment") {
        return Some(NormalizedWebhook {
            kind: EventKind::IssueComment,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::IssueComment {
                issue: part(body, "issue")?,
                comment: part(body, "comment")?,
            },
        });
    }
    if has("issue") {
        return Some(NormalizedWebhook {
            kind: EventKind::Issues,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::Issue {
                issue: part(body, "issue")?,
            },
        });
    }
    if has("pull_request") && has("comment") {
        return Some(NormalizedWebhook {
            kind: EventKind::PullRequestReviewComment,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::PullRequestReviewComment {
                pull_request: part(body, "pull_request")?,
                comment: part(body, "comment")?,
            },
        });
    }
    if has("pull_request") {
        return Some(NormalizedWebhook {
            kind: EventKind::PullRequest,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::PullRequest {
                pull_request: part(body, "pull_request")?,
            },
        });
    }
    if has("discussion") && has("comment") {
        return Some(NormalizedWebhook {
            kind: EventKind::DiscussionComment,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::DiscussionComment {
                discussion: part(body, "discussion")?,
                comment: part(body, "comment")?,
            },
        });
    }
    if has("discussion") {
        return Some(NormalizedWebhook {
            kind: EventKind::Discussion,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::Discussion {
                discussion: part(body, "discussion")?,
            },
        });
    }
    if let Some(forkee) = body.get("forkee") {
        let actor = actor_from_value(forkee.get("owner"))
            .or(sender)
            .unwrap_or_default();
        return Some(NormalizedWebhook {
            kind: EventKind::Fork,
            action,
            actor,
            payload: EventPayload::Fork {
                forkee: forkee.clone(),
            },
        });
    }
    if matches!(action.as_deref(), Some("started") | Some("deleted")) && has("repository") {
        return Some(NormalizedWebhook {
            kind: EventKind::Watch,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::Watch,
        });
    }
    if let Some(workflow_run) = body.get("workflow_run") {
        return Some(NormalizedWebhook {
            kind: EventKind::WorkflowRun,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::WorkflowRun {
                workflow_run: workflow_run.clone(),
                workflow: body.get("workflow").cloned(),
            },
        });
    }
    if let Some(workflow_job) = body.get("workflow_job") {
        return Some(NormalizedWebhook {
            kind: EventKind::WorkflowJob,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::WorkflowJob {
                workflow_job: workflow_job.clone(),
            },
        });
    }
    if has("ref") && has("commits") {
        let actor = actor_from_value(body.get("pusher"))
            .or(sender)
            .unwrap_or_default();
        return Some(NormalizedWebhook {
            kind: EventKind::Push,
            action,
            actor,
            payload: serde_json::from_value(body.clone()).ok().map(EventPayload::Push)?,
        });
    }
    if let Some(release) = body.get("release") {
        return Some(NormalizedWebhook {
            kind: EventKind::Release,
            action,
            actor: sender.unwrap_or_default(),
            payload: EventPayload::Release {
                release: release.clone(),
            },
        });
    }
    None
}

/// Builds the synthetic comment event used for notification-feed threads.
///
/// Both Issue and PullRequest notification subjects synthesize issue-comment
/// events, since the comments live on the shared issue timeline.
pub fn synthesize_comment_event(
    thread_id: &str,
    issue: ThreadInfo,
    comment: CommentInfo,
    author: EventActor,
    created_at: &str,
    repository: &RepoRef,
    bot_id: &str,
) -> CanonicalEvent {
    CanonicalEvent {
        id: format!("notif-{}-{}", thread_id, comment.id),
        kind: EventKind::IssueComment,
        action: Some("created".to_string()),
        actor: author,
        repository: repository.clone(),
        payload: EventPayload::IssueComment { issue, comment },
        created_at: created_at.to_string(),
        source_bot_id: bot_id.to_string(),
        source_platform: SOURCE_PLATFORM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        normalize_feed_event, normalize_webhook_payload, synthesize_comment_event, FeedEvent,
    };
    use crate::canonical_event::{CommentInfo, EventActor, EventKind, EventPayload, RepoRef, ThreadInfo};

    fn sample_repo() -> RepoRef {
        RepoRef {
            owner: "octo".to_string(),
            name: "widget".to_string(),
        }
    }

    fn feed_event(event_type: &str, payload: serde_json::Value) -> FeedEvent {
        serde_json::from_value(json!({
            "id": "321",
            "type": event_type,
            "actor": { "login": "alice", "avatar_url": "https://example.test/a.png" },
            "payload": payload,
            "created_at": "2026-02-01T00:00:00Z",
        }))
        .expect("feed event")
    }

    #[test]
    fn unit_normalize_feed_event_maps_issue_comment() {
        let event = feed_event(
            "IssueCommentEvent",
            json!({
                "action": "created",
                "issue": { "number": 5, "title": "Bug", "body": "details" },
                "comment": { "id": 900, "body": "me too" },
            }),
        );
        let canonical =
            normalize_feed_event(&event, &sample_repo(), "hubcast-bot").expect("canonical");
        assert_eq!(canonical.id, "321");
        assert_eq!(canonical.kind, EventKind::IssueComment);
        assert_eq!(canonical.action.as_deref(), Some("created"));
        assert_eq!(canonical.actor.login, "alice");
        assert_eq!(canonical.source_bot_id, "hubcast-bot");
        match &canonical.payload {
            EventPayload::IssueComment { issue, comment } => {
                assert_eq!(issue.number, 5);
                assert_eq!(comment.id, 900);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unit_normalize_feed_event_defaults_watch_action_to_started() {
        let event = feed_event("WatchEvent", json!({}));
        let canonical =
            normalize_feed_event(&event, &sample_repo(), "hubcast-bot").expect("canonical");
        assert_eq!(canonical.kind, EventKind::Watch);
        assert_eq!(canonical.action.as_deref(), Some("started"));
    }

    #[test]
    fn unit_normalize_feed_event_drops_unrecognized_type() {
        let event = feed_event("GollumEvent", json!({"pages": []}));
        assert!(normalize_feed_event(&event, &sample_repo(), "hubcast-bot").is_none());
    }

    #[test]
    fn unit_normalize_feed_event_drops_malformed_payload() {
        let event = feed_event("IssuesEvent", json!({"action": "opened"}));
        assert!(normalize_feed_event(&event, &sample_repo(), "hubcast-bot").is_none());
    }

    #[test]
    fn functional_webhook_resolution_follows_field_presence() {
        let issue = json!({ "number": 1, "title": "T", "body": null });
        let comment = json!({ "id": 2, "body": "c" });

        let resolved = normalize_webhook_payload(&json!({
            "action": "created",
            "issue": issue.clone(),
            "comment": comment,
            "sender": { "login": "bob" },
        }))
        .expect("resolved");
        assert_eq!(resolved.kind, EventKind::IssueComment);

        let resolved = normalize_webhook_payload(&json!({
            "action": "opened",
            "issue": issue,
            "sender": { "login": "bob" },
        }))
        .expect("resolved");
        assert_eq!(resolved.kind, EventKind::Issues);
        assert_eq!(resolved.actor.login, "bob");

        let resolved = normalize_webhook_payload(&json!({
            "action": "started",
            "repository": { "full_name": "octo/widget" },
            "sender": { "login": "stargazer" },
        }))
        .expect("resolved");
        assert_eq!(resolved.kind, EventKind::Watch);
    }

    #[test]
    fn regression_webhook_pull_request_wins_over_push_fields() {
        // Ambiguous body carrying both pull_request and ref+commits must
        // resolve by predicate order, not by push.
        let resolved = normalize_webhook_payload(&json!({
            "action": "opened",
            "pull_request": { "number": 9, "title": "Change" },
            "ref": "refs/heads/main",
            "commits": [],
            "sender": { "login": "bob" },
        }))
        .expect("resolved");
        assert_eq!(resolved.kind, EventKind::PullRequest);
    }

    #[test]
    fn unit_webhook_push_actor_falls_back_to_pusher_name() {
        let resolved = normalize_webhook_payload(&json!({
            "ref": "refs/heads/main",
            "before": "aaa",
            "after": "bbb",
            "commits": [{ "sha": "bbb" }],
            "pusher": { "name": "carol" },
        }))
        .expect("resolved");
        assert_eq!(resolved.kind, EventKind::Push);
        assert_eq!(resolved.actor.login, "carol");
        match resolved.payload {
            EventPayload::Push(push) => {
                assert_eq!(push.git_ref, "refs/heads/main");
                assert_eq!(push.commits.len(), 1);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unit_webhook_fork_actor_comes_from_forkee_owner() {
        let resolved = normalize_webhook_payload(&json!({
            "forkee": { "full_name": "dana/widget", "owner": { "login": "dana" } },
            "sender": { "login": "someone-else" },
        }))
        .expect("resolved");
        assert_eq!(resolved.kind, EventKind::Fork);
        assert_eq!(resolved.actor.login, "dana");
    }

    #[test]
    fn unit_webhook_unrecognized_body_yields_none() {
        assert!(normalize_webhook_payload(&json!({ "zen": "Design for failure." })).is_none());
    }

    #[test]
    fn unit_synthesized_comment_event_id_is_thread_scoped() {
        let event = synthesize_comment_event(
            "4242",
            ThreadInfo {
                number: 7,
                title: "Question".to_string(),
                body: None,
            },
            CommentInfo {
                id: 99,
                body: Some("answer".to_string()),
            },
            EventActor {
                login: "erin".to_string(),
                avatar_url: None,
            },
            "2026-02-01T00:00:05Z",
            &sample_repo(),
            "hubcast-bot",
        );
        assert_eq!(event.id, "notif-4242-99");
        assert_eq!(event.kind, EventKind::IssueComment);
        assert_eq!(event.action.as_deref(), Some("created"));
    }
}
