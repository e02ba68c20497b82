use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hubcast_core::{current_unix_timestamp_ms, parse_rfc3339_to_unix_ms};
use hubcast_events::canonical_event::{CanonicalEvent, EventActor, EventPayload, GENERIC_EVENT_TOPIC};
use hubcast_events::channel_ref::{ChannelRef, ThreadKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Conversational projection of a canonical event: the message the messaging
/// layer receives for reply-able threads.
pub struct ChannelMessage {
    pub channel_id: String,
    pub message_id: String,
    pub content: String,
    pub author: EventActor,
    pub timestamp_unix_ms: u64,
}

#[async_trait]
/// Boundary between the bridge and the messaging layer. Delivery is
/// at-least-once; sink failures never abort the remaining fan-out.
pub trait EventSink: Send + Sync {
    async fn deliver_event(&self, topic: &str, event: &CanonicalEvent) -> anyhow::Result<()>;
    async fn deliver_message(&self, message: &ChannelMessage) -> anyhow::Result<()>;
}

/// Fans each canonical event out to its channel topics and, for the
/// conversational subset, synthesizes the channel message.
pub struct EventDispatcher {
    sink: Arc<dyn EventSink>,
    bot_login: String,
}

impl EventDispatcher {
    pub fn new(sink: Arc<dyn EventSink>, bot_login: String) -> Self {
        Self { sink, bot_login }
    }

    pub async fn dispatch(&self, event: &CanonicalEvent) {
        let kind_topic = format!("github/{}", event.kind.channel_topic());
        if let Some(action) = event.action.as_deref() {
            let action_topic = format!("{kind_topic}-{action}");
            self.deliver_topic(&action_topic, event).await;
        }
        self.deliver_topic(&kind_topic, event).await;
        self.deliver_topic(GENERIC_EVENT_TOPIC, event).await;

        let Some(message) = conversational_message(event) else {
            return;
        };
        // Suppressing the bot's own activity here prevents feedback loops
        // when outbound replies come back through the feeds.
        if event.actor.login == self.bot_login {
            debug!(
                "suppressing conversational message for self event {}",
                event.id
            );
            return;
        }
        if let Err(error) = self.sink.deliver_message(&message).await {
            warn!(
                "failed to deliver message for {} to {}: {error}",
                event.id, message.channel_id
            );
        }
    }

    async fn deliver_topic(&self, topic: &str, event: &CanonicalEvent) {
        if let Err(error) = self.sink.deliver_event(topic, event).await {
            warn!("failed to deliver event {} on {topic}: {error}", event.id);
        }
    }
}

/// Builds the conversational projection, or `None` for kinds/actions that do
/// not map onto a reply-able thread.
pub fn conversational_message(event: &CanonicalEvent) -> Option<ChannelMessage> {
    let (channel, content, message_id) = match &event.payload {
        EventPayload::IssueComment { issue, comment } => (
            thread_channel(event, ThreadKind::Issues, issue.number),
            comment.body.clone().unwrap_or_default(),
            comment.id.to_string(),
        ),
        EventPayload::Issue { issue } => {
            let action = state_change_action(event)?;
            (
                thread_channel(event, ThreadKind::Issues, issue.number),
                opened_header("Issue", action, &issue.title, issue.body.as_deref()),
                "issue".to_string(),
            )
        }
        EventPayload::PullRequest { pull_request } => {
            let action = state_change_action(event)?;
            (
                thread_channel(event, ThreadKind::Pull, pull_request.number),
                opened_header("PR", action, &pull_request.title, pull_request.body.as_deref()),
                "pull".to_string(),
            )
        }
        EventPayload::PullRequestReviewComment {
            pull_request,
            comment,
        } => (
            thread_channel(event, ThreadKind::Pull, pull_request.number),
            comment.body.clone().unwrap_or_default(),
            comment.id.to_string(),
        ),
        EventPayload::Discussion { discussion } => {
            let action = event.action.as_deref()?;
            // Header line only; the discussion body is intentionally not
            // appended, matching the established outbound format.
            (
                thread_channel(event, ThreadKind::Discussions, discussion.number),
                format!("[Discussion {action}] {}", discussion.title),
                "discussion".to_string(),
            )
        }
        EventPayload::DiscussionComment {
            discussion,
            comment,
        } => (
            thread_channel(event, ThreadKind::Discussions, discussion.number),
            comment.body.clone().unwrap_or_default(),
            comment.id.to_string(),
        ),
        _ => return None,
    };
    if content.trim().is_empty() {
        return None;
    }
    Some(ChannelMessage {
        channel_id: channel.to_string(),
        message_id,
        content,
        author: event.actor.clone(),
        timestamp_unix_ms: parse_rfc3339_to_unix_ms(&event.created_at)
            .unwrap_or_else(current_unix_timestamp_ms),
    })
}

fn thread_channel(event: &CanonicalEvent, kind: ThreadKind, number: u64) -> ChannelRef {
    ChannelRef::new(&event.repository.owner, &event.repository.name, kind, number)
}

fn state_change_action(event: &CanonicalEvent) -> Option<&str> {
    match event.action.as_deref() {
        Some(action @ ("opened" | "closed" | "reopened")) => Some(action),
        _ => None,
    }
}

fn opened_header(kind: &str, action: &str, title: &str, body: Option<&str>) -> String {
    let mut content = format!("[{kind} {action}] {title}");
    if action == "opened" {
        content.push('\n');
        content.push_str(body.unwrap_or_default());
    }
    content
}
