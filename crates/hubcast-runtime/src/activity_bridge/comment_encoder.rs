use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use tracing::{error, warn};

use hubcast_core::current_unix_timestamp_ms;
use hubcast_events::canonical_event::RepoRef;
use hubcast_events::channel_ref::{ChannelRef, ThreadKind};
use hubcast_events::markdown_render::{collect_media_sources, render_markdown};
use hubcast_events::message_element::{MediaKind, MessageElement};

use super::github_api_client::GithubApiClient;

#[async_trait]
/// Re-hosts a non-network media source and returns the hosted URL.
pub trait AssetTransformer: Send + Sync {
    async fn transform(&self, kind: MediaKind, src: &str) -> Result<String>;
}

/// Bytes plus naming metadata loaded from a local media source.
#[derive(Debug, Clone)]
pub struct LocalAsset {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

/// Loads `file://`, `base64://`, `data:`, and plain-path media sources.
/// Network URLs never reach this function.
pub async fn load_local_asset(src: &str) -> Result<LocalAsset> {
    if let Some(path) = src.strip_prefix("file://") {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {path}"))?;
        return Ok(LocalAsset {
            bytes,
            file_name: file_name_of(path),
            content_type: "application/octet-stream".to_string(),
        });
    }
    if let Some(data) = src.strip_prefix("base64://") {
        let bytes = BASE64_STANDARD
            .decode(data)
            .context("invalid base64 media source")?;
        return Ok(LocalAsset {
            bytes,
            file_name: format!("file_{}", current_unix_timestamp_ms()),
            content_type: "application/octet-stream".to_string(),
        });
    }
    if let Some(rest) = src.strip_prefix("data:") {
        let Some((content_type, data)) = rest.split_once(";base64,") else {
            bail!("unsupported data url, expected base64 payload");
        };
        let bytes = BASE64_STANDARD
            .decode(data)
            .context("invalid base64 payload in data url")?;
        let extension = content_type.split('/').nth(1).unwrap_or("bin");
        return Ok(LocalAsset {
            bytes,
            file_name: format!("file_{}.{extension}", current_unix_timestamp_ms()),
            content_type: content_type.to_string(),
        });
    }
    let bytes = tokio::fs::read(src)
        .await
        .with_context(|| format!("failed to read {src}"))?;
    Ok(LocalAsset {
        bytes,
        file_name: file_name_of(src),
        content_type: "application/octet-stream".to_string(),
    })
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("file_{}", current_unix_timestamp_ms()))
}

/// Default transformer: loads the local source and uploads it as a
/// repository asset.
pub struct RepoAssetUploader {
    client: GithubApiClient,
    repo: RepoRef,
}

impl RepoAssetUploader {
    pub fn new(client: GithubApiClient, repo: RepoRef) -> Self {
        Self { client, repo }
    }
}

#[async_trait]
impl AssetTransformer for RepoAssetUploader {
    async fn transform(&self, _kind: MediaKind, src: &str) -> Result<String> {
        let asset = load_local_asset(src).await?;
        let url = self
            .client
            .upload_repo_asset(&self.repo, &asset.file_name, &asset.content_type, asset.bytes)
            .await?;
        Ok(url)
    }
}

/// Serializes outbound replies into GitHub markdown comments.
///
/// Elements accumulate into a buffer; `flush` posts the buffered string as
/// one new comment. The buffer is cleared on every flush attempt, success or
/// failure, so a failed send is never resent as stale content.
pub struct CommentEncoder {
    client: GithubApiClient,
    channel: ChannelRef,
    assets: Option<Arc<dyn AssetTransformer>>,
    silent: bool,
    buffer: String,
    created_comment_ids: Vec<String>,
}

impl CommentEncoder {
    pub fn new(
        client: GithubApiClient,
        channel: ChannelRef,
        assets: Option<Arc<dyn AssetTransformer>>,
        silent: bool,
    ) -> Self {
        Self {
            client,
            channel,
            assets,
            silent,
            buffer: String::new(),
            created_comment_ids: Vec::new(),
        }
    }

    pub fn for_channel_id(
        client: GithubApiClient,
        channel_id: &str,
        assets: Option<Arc<dyn AssetTransformer>>,
        silent: bool,
    ) -> Result<Self> {
        let channel = ChannelRef::parse(channel_id)?;
        Ok(Self::new(client, channel, assets, silent))
    }

    pub fn push_text(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Renders elements into the buffer, resolving non-network media through
    /// the asset transformer. Failed transforms render their failure marker.
    pub async fn push_elements(&mut self, elements: &[MessageElement]) {
        let mut resolved: HashMap<String, Option<String>> = HashMap::new();
        for (kind, src) in collect_media_sources(elements) {
            let outcome = match &self.assets {
                Some(transformer) => match transformer.transform(kind, &src).await {
                    Ok(url) => Some(url),
                    Err(transform_error) => {
                        warn!("asset transform failed for {src}: {transform_error}");
                        None
                    }
                },
                None => None,
            };
            resolved.insert(src, outcome);
        }
        self.buffer.push_str(&render_markdown(elements, &resolved));
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn created_comment_ids(&self) -> &[String] {
        &self.created_comment_ids
    }

    /// Posts the buffered content as one comment and returns the created
    /// comment id, or `None` when nothing was sent (empty buffer or silent
    /// mode).
    pub async fn flush(&mut self) -> Result<Option<String>> {
        // Taking the buffer up front guarantees the clear-on-flush contract
        // even when the send fails.
        let body = std::mem::take(&mut self.buffer);
        if body.trim().is_empty() {
            return Ok(None);
        }
        if self.silent {
            warn!("silent mode enabled, dropping message for {}", self.channel);
            return Ok(None);
        }
        let repo = RepoRef {
            owner: self.channel.owner.clone(),
            name: self.channel.repo.clone(),
        };
        let created = match self.channel.kind {
            ThreadKind::Issues | ThreadKind::Pull => self
                .client
                .create_issue_comment(&repo, self.channel.number, &body)
                .await
                .map(|response| response.id.to_string())
                .map_err(anyhow::Error::from),
            ThreadKind::Discussions => {
                let discussion = self
                    .client
                    .discussion_node_id(&repo, self.channel.number)
                    .await
                    .map_err(anyhow::Error::from);
                match discussion {
                    Ok(discussion_id) => self
                        .client
                        .add_discussion_comment(&discussion_id, &body)
                        .await
                        .map_err(anyhow::Error::from),
                    Err(lookup_error) => Err(lookup_error),
                }
            }
        };
        match created {
            Ok(comment_id) => {
                self.created_comment_ids.push(comment_id.clone());
                Ok(Some(comment_id))
            }
            Err(send_error) => {
                error!(
                    "failed to deliver comment to {}: {send_error}",
                    self.channel
                );
                Err(send_error)
            }
        }
    }
}
