//! Async runtime for the GitHub activity bridge.
//!
//! Hosts the API client, repository classification, the dual-strategy
//! poller, canonical event dispatch, and the outbound comment encoder.

pub mod activity_bridge;

pub use activity_bridge::{
    classify_repositories, conversational_message, run_activity_bridge, ActivityBridge,
    ActivityBridgeConfig, ActivityBridgeHandle, AssetTransformer, ChannelMessage, CommentEncoder,
    EventDispatcher, EventSink, GithubApiClient, GithubApiError, NotificationCursor, Ownership,
    PollCycleReport, ProcessedEventStore, RepoAssetUploader, RepositoryTarget,
    DEFAULT_PROCESSED_EVENT_CAP,
};
