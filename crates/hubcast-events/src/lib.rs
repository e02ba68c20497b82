//! Transport-free building blocks for the GitHub activity bridge.
//!
//! This crate holds the canonical event model, the normalizer that converts
//! the three raw record shapes (activity feed, webhook delivery, synthesized
//! notification comment) into that model, channel identifier parsing, the
//! outbound message element tree, and the pure markdown rendering pass.

pub mod canonical_event;
pub mod channel_ref;
pub mod markdown_render;
pub mod message_element;
pub mod normalize;
pub mod transport;

pub use canonical_event::{
    CanonicalEvent, CommentInfo, EventActor, EventKind, EventPayload, PushPayload, RepoRef,
    ThreadInfo, GENERIC_EVENT_TOPIC, SOURCE_PLATFORM,
};
pub use channel_ref::{ChannelRef, ThreadKind};
pub use message_element::{MediaKind, MessageElement};
