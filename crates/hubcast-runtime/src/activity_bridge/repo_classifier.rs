use tracing::{error, info, warn};

use hubcast_events::canonical_event::RepoRef;

use super::github_api_client::GithubApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Whether the bridge administers a repository (fast feed available) or only
/// watches it through the notification feed.
pub enum Ownership {
    Owned,
    Watched,
}

#[derive(Debug, Clone)]
/// One classified repository. Immutable for the lifetime of the process.
pub struct RepositoryTarget {
    pub repo: RepoRef,
    pub ownership: Ownership,
}

impl RepositoryTarget {
    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }
}

/// Resolves each configured repository string and classifies it.
///
/// Malformed identifiers, wildcards, and repositories that fail to resolve
/// are dropped; classification runs once at startup and is never repeated.
pub async fn classify_repositories(
    client: &GithubApiClient,
    configured: &[String],
    bot_login: &str,
) -> Vec<RepositoryTarget> {
    let mut targets = Vec::new();
    for raw in configured {
        let repo = match RepoRef::parse(raw) {
            Ok(repo) => repo,
            Err(error) => {
                warn!("skipping malformed repository '{raw}': {error}");
                continue;
            }
        };
        if repo.owner == "*" || repo.name == "*" {
            warn!(
                "wildcard repository '{}' is not supported in pull mode, skipping",
                repo.as_slug()
            );
            continue;
        }
        match client.get_repository(&repo).await {
            Ok(metadata) => {
                let permissions = metadata.permissions.unwrap_or_default();
                let owned =
                    metadata.owner.login == bot_login || permissions.admin || permissions.push;
                if owned {
                    targets.push(RepositoryTarget {
                        repo,
                        ownership: Ownership::Owned,
                    });
                } else {
                    if let Err(error) = client.set_repository_subscription(&repo).await {
                        warn!(
                            "failed to subscribe to all activity on {}: {error}",
                            repo.as_slug()
                        );
                    }
                    info!("watching {} through the notification feed", repo.as_slug());
                    targets.push(RepositoryTarget {
                        repo,
                        ownership: Ownership::Watched,
                    });
                }
            }
            Err(error) if error.status() == Some(404) => {
                warn!(
                    "repository {} not found or not accessible, skipping",
                    repo.as_slug()
                );
            }
            Err(error) if error.is_transient() => {
                warn!(
                    "transient failure resolving repository {}, skipping: {error}",
                    repo.as_slug()
                );
            }
            Err(error) => {
                error!("failed to resolve repository {}: {error}", repo.as_slug());
            }
        }
    }
    targets
}
