//! Reply-able thread identifiers.
//!
//! Channel identifiers use the stable format `owner/repo:kind:number` and
//! must round-trip bit-exact for downstream compatibility.

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Thread kind segment of a channel identifier.
pub enum ThreadKind {
    Issues,
    Pull,
    Discussions,
}

impl ThreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issues => "issues",
            Self::Pull => "pull",
            Self::Discussions => "discussions",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "issues" => Some(Self::Issues),
            "pull" => Some(Self::Pull),
            "discussions" => Some(Self::Discussions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Parsed channel identifier pointing at one issue, pull request, or
/// discussion thread.
pub struct ChannelRef {
    pub owner: String,
    pub repo: String,
    pub kind: ThreadKind,
    pub number: u64,
}

impl ChannelRef {
    pub fn new(owner: &str, repo: &str, kind: ThreadKind, number: u64) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            kind,
            number,
        }
    }

    /// Parses `owner/repo:kind:number`; anything else fails.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 3 {
            bail!("invalid channel id '{raw}', expected owner/repo:kind:number");
        }
        let Some((owner, repo)) = parts[0].split_once('/') else {
            bail!("invalid channel id '{raw}', missing owner/repo prefix");
        };
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            bail!("invalid channel id '{raw}', malformed owner/repo prefix");
        }
        let Some(kind) = ThreadKind::parse(parts[1]) else {
            bail!("invalid channel id '{raw}', unknown thread kind '{}'", parts[1]);
        };
        let Ok(number) = parts[2].parse::<u64>() else {
            bail!("invalid channel id '{raw}', non-numeric thread number");
        };
        Ok(Self::new(owner, repo, kind, number))
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}/{}:{}:{}",
            self.owner,
            self.repo,
            self.kind.as_str(),
            self.number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelRef, ThreadKind};

    #[test]
    fn unit_channel_ref_parse_round_trips() {
        let channel = ChannelRef::parse("octo/repo:issues:42").expect("parse channel");
        assert_eq!(channel.owner, "octo");
        assert_eq!(channel.repo, "repo");
        assert_eq!(channel.kind, ThreadKind::Issues);
        assert_eq!(channel.number, 42);
        assert_eq!(channel.to_string(), "octo/repo:issues:42");
    }

    #[test]
    fn unit_channel_ref_parse_accepts_all_thread_kinds() {
        for (raw, kind) in [
            ("o/r:issues:1", ThreadKind::Issues),
            ("o/r:pull:2", ThreadKind::Pull),
            ("o/r:discussions:3", ThreadKind::Discussions),
        ] {
            let channel = ChannelRef::parse(raw).expect("parse channel");
            assert_eq!(channel.kind, kind);
        }
    }

    #[test]
    fn unit_channel_ref_parse_rejects_malformed_ids() {
        for raw in [
            "octo/repo:issues",
            "octo/repo:issues:42:extra",
            "octorepo:issues:42",
            "/repo:issues:42",
            "octo/:issues:42",
            "octo/repo:tickets:42",
            "octo/repo:issues:nan",
        ] {
            assert!(ChannelRef::parse(raw).is_err(), "expected failure for {raw}");
        }
    }
}
