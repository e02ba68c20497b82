//! GitHub activity bridge runtime: dual-strategy polling, bounded
//! deduplication, canonical event dispatch, and outbound encoding.
//!
//! Repositories the authenticated identity administers are read through the
//! fast per-repository activity feed; everything else arrives through the
//! cross-repository notification feed. Neither source guarantees
//! exactly-once delivery or stable ordering, so the poller filters through
//! the dedup window and notification cursors and re-orders fast-feed batches
//! chronologically before dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use hubcast_core::{current_rfc3339, current_unix_timestamp_ms};
use hubcast_events::canonical_event::{CommentInfo, EventActor, RepoRef, ThreadInfo};
use hubcast_events::channel_ref::ChannelRef;
use hubcast_events::normalize::{
    normalize_feed_event, normalize_webhook_payload, synthesize_comment_event,
};

mod comment_encoder;
mod dedup_store;
mod dispatcher;
mod github_api_client;
mod repo_classifier;

pub use comment_encoder::{
    load_local_asset, AssetTransformer, CommentEncoder, LocalAsset, RepoAssetUploader,
};
pub use dedup_store::{NotificationCursor, ProcessedEventStore, DEFAULT_PROCESSED_EVENT_CAP};
pub use dispatcher::{conversational_message, ChannelMessage, EventDispatcher, EventSink};
pub use github_api_client::{
    AuthenticatedUser, CommentRecord, GithubApiClient, GithubApiError, NotificationThread,
    ThreadRecord,
};
pub use repo_classifier::{classify_repositories, Ownership, RepositoryTarget};

const FEED_EVENTS_PER_PAGE: u32 = 20;
const NOTIFICATIONS_PER_PAGE: u32 = 50;

#[derive(Debug, Clone)]
/// Runtime configuration for the activity bridge.
pub struct ActivityBridgeConfig {
    pub api_base: String,
    pub graphql_url: String,
    pub token: String,
    /// Configured `owner/repo` identifier strings, classified at startup.
    pub repositories: Vec<String>,
    pub poll_interval: Duration,
    pub request_timeout_ms: u64,
    pub processed_event_cap: usize,
    /// Suppresses all outbound comment sends when set.
    pub silent_mode: bool,
    /// Overrides the authenticated-identity lookup when set.
    pub bot_login: Option<String>,
    /// Run one poll cycle after the baseline and exit.
    pub poll_once: bool,
}

impl Default for ActivityBridgeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            token: String::new(),
            repositories: Vec::new(),
            poll_interval: Duration::from_secs(60),
            request_timeout_ms: 30_000,
            processed_event_cap: DEFAULT_PROCESSED_EVENT_CAP,
            silent_mode: false,
            bot_login: None,
            poll_once: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
/// Per-cycle counters logged after every poll.
pub struct PollCycleReport {
    pub discovered_events: usize,
    pub dispatched_events: usize,
    pub duplicate_skips: usize,
    pub notification_threads: usize,
    pub failed_targets: usize,
}

/// Runs the bridge until ctrl-c.
pub async fn run_activity_bridge(
    config: ActivityBridgeConfig,
    sink: Arc<dyn EventSink>,
) -> Result<()> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut bridge = ActivityBridge::new(config, sink).await?;
    bridge.run(shutdown_rx).await
}

/// Owned handle over a spawned bridge with an idempotent stop.
pub struct ActivityBridgeHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<Result<()>>,
}

impl ActivityBridgeHandle {
    pub fn spawn(config: ActivityBridgeConfig, sink: Arc<dyn EventSink>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut bridge = ActivityBridge::new(config, sink).await?;
            bridge.run(shutdown_rx).await
        });
        Self { shutdown, task }
    }

    /// Requests shutdown. Safe to call repeatedly or after the task exited.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn join(self) -> Result<()> {
        self.task.await.context("bridge task panicked")?
    }
}

/// The bridge runtime. One instance per process; all mutable state (dedup
/// windows, classified targets) is owned here and mutated only on the poll
/// path.
pub struct ActivityBridge {
    config: ActivityBridgeConfig,
    client: GithubApiClient,
    dispatcher: EventDispatcher,
    bot: EventActor,
    targets: Vec<RepositoryTarget>,
    processed: ProcessedEventStore,
}

impl ActivityBridge {
    pub async fn new(config: ActivityBridgeConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let client = GithubApiClient::new(
            config.api_base.clone(),
            config.graphql_url.clone(),
            config.token.clone(),
            config.request_timeout_ms,
        )?;
        let bot = match config.bot_login.as_deref() {
            Some(login) if !login.trim().is_empty() => EventActor {
                login: login.trim().to_string(),
                avatar_url: None,
            },
            _ => {
                let user = client
                    .authenticated_user()
                    .await
                    .context("failed to resolve the authenticated identity")?;
                EventActor {
                    login: user.login,
                    avatar_url: user.avatar_url,
                }
            }
        };
        let dispatcher = EventDispatcher::new(sink, bot.login.clone());
        let processed = ProcessedEventStore::new(config.processed_event_cap);
        Ok(Self {
            config,
            client,
            dispatcher,
            bot,
            targets: Vec::new(),
            processed,
        })
    }

    pub fn bot_login(&self) -> &str {
        &self.bot.login
    }

    /// Builds an outbound encoder for one channel id, wired with the asset
    /// uploader for the channel's repository.
    pub fn comment_encoder(&self, channel_id: &str) -> Result<CommentEncoder> {
        let channel = ChannelRef::parse(channel_id)?;
        let repo = RepoRef {
            owner: channel.owner.clone(),
            name: channel.repo.clone(),
        };
        let uploader: Arc<dyn AssetTransformer> =
            Arc::new(RepoAssetUploader::new(self.client.clone(), repo));
        Ok(CommentEncoder::new(
            self.client.clone(),
            channel,
            Some(uploader),
            self.config.silent_mode,
        ))
    }

    /// Classifies targets, establishes the baseline, then polls on the
    /// configured interval until shutdown or ctrl-c.
    ///
    /// Cycles run to completion before the next sleep starts, so overlapping
    /// cycles cannot occur; a slow cycle delays the next one instead.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.targets =
            classify_repositories(&self.client, &self.config.repositories, &self.bot.login).await;
        if self.targets.is_empty() {
            bail!("no usable repositories after classification, stopping ingestion");
        }
        let watched = self
            .targets
            .iter()
            .map(|target| target.repo.as_slug())
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "github bridge online as {} (repositories: {watched})",
            self.bot.login
        );

        self.poll_cycle(true).await;

        if self.config.poll_once {
            let report = self.poll_cycle(false).await;
            log_cycle_report(&report, 0);
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("github bridge shutdown requested");
                    return Ok(());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        info!("github bridge shutdown requested");
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    let started = Instant::now();
                    let report = self.poll_cycle(false).await;
                    log_cycle_report(&report, started.elapsed().as_millis() as u64);
                }
            }
        }
    }

    /// One poll cycle. `baseline` records currently visible fast-feed ids
    /// without dispatching, so history is never replayed after (re)start.
    /// Targets are processed sequentially; failures are isolated per target.
    async fn poll_cycle(&mut self, baseline: bool) -> PollCycleReport {
        let mut report = PollCycleReport::default();
        let owned: Vec<RepositoryTarget> = self
            .targets
            .iter()
            .filter(|target| target.is_owned())
            .cloned()
            .collect();
        for target in &owned {
            if let Err(feed_error) = self.poll_owned_target(target, baseline, &mut report).await {
                report.failed_targets += 1;
                log_target_failure("activity feed", &target.repo.as_slug(), &feed_error);
            }
        }
        if let Err(notification_error) = self.poll_notifications(&mut report).await {
            report.failed_targets += 1;
            log_target_failure("notification feed", self.bot_login(), &notification_error);
        }
        report
    }

    async fn poll_owned_target(
        &mut self,
        target: &RepositoryTarget,
        baseline: bool,
        report: &mut PollCycleReport,
    ) -> std::result::Result<(), GithubApiError> {
        let slug = target.repo.as_slug();
        let events = self
            .client
            .list_repo_events(&target.repo, FEED_EVENTS_PER_PAGE)
            .await?;

        if baseline {
            let mut recorded = 0_usize;
            for event in &events {
                if self.processed.insert(&slug, &event.id) {
                    recorded += 1;
                }
            }
            info!("repository {slug} baseline established with {recorded} event ids");
            return Ok(());
        }

        let mut fresh = Vec::new();
        for event in events {
            report.discovered_events += 1;
            if self.processed.insert(&slug, &event.id) {
                fresh.push(event);
            } else {
                report.duplicate_skips += 1;
            }
        }
        if fresh.is_empty() {
            return Ok(());
        }
        debug!("repository {slug} produced {} new events", fresh.len());

        // The feed is newest-first; reverse so delivery is chronological
        // within the repository.
        for event in fresh.into_iter().rev() {
            match normalize_feed_event(&event, &target.repo, &self.bot.login) {
                Some(canonical) => {
                    self.dispatcher.dispatch(&canonical).await;
                    report.dispatched_events += 1;
                }
                None => debug!(
                    "dropping unrecognized activity record {} ({})",
                    event.id, event.event_type
                ),
            }
        }
        Ok(())
    }

    async fn poll_notifications(
        &mut self,
        report: &mut PollCycleReport,
    ) -> std::result::Result<(), GithubApiError> {
        let notifications = self.client.list_notifications(NOTIFICATIONS_PER_PAGE).await?;
        for thread in notifications {
            report.notification_threads += 1;
            let repo = RepoRef {
                owner: thread.repository.owner.login.clone(),
                name: thread.repository.name.clone(),
            };
            if self.is_owned(&repo.as_slug()) {
                // Already covered by the fast feed; just clear the unread
                // marker.
                self.mark_thread_read_logged(&thread.id).await;
                continue;
            }
            if let Err(thread_error) = self.process_notification(&thread, &repo, report).await {
                report.failed_targets += 1;
                if thread_error.is_transient() {
                    warn!(
                        "transient failure processing notification {} for {}: {thread_error}",
                        thread.id,
                        repo.as_slug()
                    );
                } else {
                    error!(
                        "failed to process notification {} for {}: {thread_error}",
                        thread.id,
                        repo.as_slug()
                    );
                }
            }
            self.mark_thread_read_logged(&thread.id).await;
        }
        Ok(())
    }

    /// Resolves one notification thread and synthesizes comment events for
    /// everything created after the thread's prior read boundary.
    async fn process_notification(
        &mut self,
        thread: &NotificationThread,
        repo: &RepoRef,
        report: &mut PollCycleReport,
    ) -> std::result::Result<(), GithubApiError> {
        let Some(subject_url) = thread.subject.url.as_deref() else {
            debug!(
                "notification {} subject '{}' has no url, skipping",
                thread.id, thread.subject.subject_type
            );
            return Ok(());
        };
        let Some(number) = subject_url
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse::<u64>().ok())
        else {
            warn!("could not parse thread number from {subject_url}");
            return Ok(());
        };

        let record = match thread.subject.subject_type.as_str() {
            "Issue" => self.client.get_issue(repo, number).await?,
            "PullRequest" => self.client.get_pull_request(repo, number).await?,
            other => {
                debug!("notification subject type {other} is not supported, skipping");
                return Ok(());
            }
        };
        let cursor = NotificationCursor::from_last_read_at(thread.last_read_at.as_deref());
        let comments = self
            .client
            .list_issue_comments_since(repo, number, cursor.since())
            .await?;

        let thread_info = ThreadInfo {
            number: record.number,
            title: record.title.clone(),
            body: record.body.clone(),
        };
        for comment in comments {
            if cursor.is_already_seen(&comment.created_at) {
                continue;
            }
            let canonical = synthesize_comment_event(
                &thread.id,
                thread_info.clone(),
                CommentInfo {
                    id: comment.id,
                    body: comment.body.clone(),
                },
                EventActor {
                    login: comment.user.login.clone(),
                    avatar_url: comment.user.avatar_url.clone(),
                },
                &comment.created_at,
                repo,
                &self.bot.login,
            );
            self.dispatcher.dispatch(&canonical).await;
            report.dispatched_events += 1;
        }
        Ok(())
    }

    /// Normalizes an externally-delivered webhook body and dispatches it.
    /// External deliveries are trusted as already deduplicated by their
    /// transport, so the dedup window is not consulted.
    pub async fn ingest_delivery(&self, body: &Value, owner: &str, repo: &str) -> Result<()> {
        let repository = RepoRef {
            owner: owner.to_string(),
            name: repo.to_string(),
        };
        let Some(webhook) = normalize_webhook_payload(body) else {
            let keys = body
                .as_object()
                .map(|map| map.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            debug!("unrecognized webhook payload for {}, keys: {keys}", repository.as_slug());
            return Ok(());
        };
        debug!(
            "webhook delivery for {}: {}",
            repository.as_slug(),
            webhook.kind.channel_topic()
        );
        let event = webhook.into_event(
            format!("webhook-{}", current_unix_timestamp_ms()),
            current_rfc3339(),
            repository,
            &self.bot.login,
        );
        self.dispatcher.dispatch(&event).await;
        Ok(())
    }

    async fn mark_thread_read_logged(&self, thread_id: &str) {
        if let Err(read_error) = self.client.mark_thread_read(thread_id).await {
            if read_error.is_transient() {
                warn!("transient failure marking notification {thread_id} read: {read_error}");
            } else {
                error!("failed to mark notification {thread_id} read: {read_error}");
            }
        }
    }

    fn is_owned(&self, slug: &str) -> bool {
        self.targets
            .iter()
            .any(|target| target.is_owned() && target.repo.as_slug() == slug)
    }
}

fn log_cycle_report(report: &PollCycleReport, elapsed_ms: u64) {
    info!(
        "github bridge poll: discovered={} dispatched={} duplicate_skips={} notifications={} failed={} elapsed_ms={elapsed_ms}",
        report.discovered_events,
        report.dispatched_events,
        report.duplicate_skips,
        report.notification_threads,
        report.failed_targets
    );
}

fn log_target_failure(source: &str, subject: &str, failure: &GithubApiError) {
    if failure.is_transient() {
        warn!("transient {source} failure for {subject}, retrying next cycle: {failure}");
    } else {
        error!("{source} poll failed for {subject}: {failure}");
    }
}
