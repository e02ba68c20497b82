//! `hubcast` binary: GitHub activity bridge with stdout event delivery.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use hubcast_events::canonical_event::CanonicalEvent;
use hubcast_runtime::{
    run_activity_bridge, ActivityBridgeConfig, ChannelMessage, EventSink,
    DEFAULT_PROCESSED_EVENT_CAP,
};

#[derive(Debug, Parser)]
#[command(
    name = "hubcast",
    about = "Bridges GitHub repository activity into channel events on stdout",
    version
)]
struct BridgeArgs {
    #[arg(
        long,
        env = "HUBCAST_CONFIG",
        help = "Optional TOML config file; command-line flags take precedence"
    )]
    config: Option<PathBuf>,

    #[arg(
        long = "repo",
        env = "HUBCAST_REPOS",
        value_delimiter = ',',
        help = "Repository to bridge in owner/repo form; repeatable"
    )]
    repo: Vec<String>,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        help = "GitHub token used for all API calls"
    )]
    github_token: Option<String>,

    #[arg(
        long = "interval-seconds",
        env = "HUBCAST_INTERVAL_SECONDS",
        help = "Seconds between poll cycles (default 60)"
    )]
    interval_seconds: Option<u64>,

    #[arg(
        long = "api-base",
        env = "HUBCAST_API_BASE",
        help = "GitHub REST API base URL (default https://api.github.com)"
    )]
    api_base: Option<String>,

    #[arg(
        long = "graphql-url",
        env = "HUBCAST_GRAPHQL_URL",
        help = "GitHub GraphQL endpoint (default https://api.github.com/graphql)"
    )]
    graphql_url: Option<String>,

    #[arg(
        long = "bot-login",
        env = "HUBCAST_BOT_LOGIN",
        help = "Override the authenticated login used for self-event suppression"
    )]
    bot_login: Option<String>,

    #[arg(
        long = "request-timeout-ms",
        env = "HUBCAST_REQUEST_TIMEOUT_MS",
        help = "Per-request timeout in milliseconds (default 30000)"
    )]
    request_timeout_ms: Option<u64>,

    #[arg(
        long = "processed-event-cap",
        env = "HUBCAST_PROCESSED_EVENT_CAP",
        help = "Per-repository dedup window size (default 100)"
    )]
    processed_event_cap: Option<usize>,

    #[arg(long, help = "Log outbound messages instead of posting them")]
    silent: bool,

    #[arg(long = "poll-once", help = "Run a single poll cycle after the baseline and exit")]
    poll_once: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BridgeFileConfig {
    #[serde(default)]
    repositories: Vec<String>,
    github_token: Option<String>,
    interval_seconds: Option<u64>,
    api_base: Option<String>,
    graphql_url: Option<String>,
    bot_login: Option<String>,
    request_timeout_ms: Option<u64>,
    processed_event_cap: Option<usize>,
    silent: Option<bool>,
    poll_once: Option<bool>,
}

fn load_file_config(path: Option<&PathBuf>) -> Result<BridgeFileConfig> {
    let Some(path) = path else {
        return Ok(BridgeFileConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

/// Merges command-line flags over the file config and applies defaults.
fn resolve_config(args: &BridgeArgs, file: &BridgeFileConfig) -> Result<ActivityBridgeConfig> {
    let Some(token) = args
        .github_token
        .clone()
        .or_else(|| file.github_token.clone())
    else {
        bail!("a github token is required (--github-token or GITHUB_TOKEN)");
    };
    let repositories = if args.repo.is_empty() {
        file.repositories.clone()
    } else {
        args.repo.clone()
    };
    if repositories.is_empty() {
        bail!("no repositories configured (--repo or the config file's repositories list)");
    }
    let interval_seconds = args
        .interval_seconds
        .or(file.interval_seconds)
        .unwrap_or(60)
        .max(1);
    Ok(ActivityBridgeConfig {
        api_base: args
            .api_base
            .clone()
            .or_else(|| file.api_base.clone())
            .unwrap_or_else(|| "https://api.github.com".to_string()),
        graphql_url: args
            .graphql_url
            .clone()
            .or_else(|| file.graphql_url.clone())
            .unwrap_or_else(|| "https://api.github.com/graphql".to_string()),
        token,
        repositories,
        poll_interval: Duration::from_secs(interval_seconds),
        request_timeout_ms: args
            .request_timeout_ms
            .or(file.request_timeout_ms)
            .unwrap_or(30_000),
        processed_event_cap: args
            .processed_event_cap
            .or(file.processed_event_cap)
            .unwrap_or(DEFAULT_PROCESSED_EVENT_CAP),
        silent_mode: args.silent || file.silent.unwrap_or(false),
        bot_login: args.bot_login.clone().or_else(|| file.bot_login.clone()),
        poll_once: args.poll_once || file.poll_once.unwrap_or(false),
    })
}

/// Emits every delivery as one JSON object per line on stdout.
struct StdoutEventSink;

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn deliver_event(&self, topic: &str, event: &CanonicalEvent) -> Result<()> {
        let line = serde_json::to_string(&json!({
            "stream": "event",
            "topic": topic,
            "event": event,
        }))
        .context("failed to serialize event")?;
        println!("{line}");
        Ok(())
    }

    async fn deliver_message(&self, message: &ChannelMessage) -> Result<()> {
        let line = serde_json::to_string(&json!({
            "stream": "message",
            "message": message,
        }))
        .context("failed to serialize message")?;
        println!("{line}");
        Ok(())
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = BridgeArgs::parse();
    let file = load_file_config(args.config.as_ref())?;
    let config = resolve_config(&args, &file)?;
    run_activity_bridge(config, Arc::new(StdoutEventSink)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> BridgeArgs {
        BridgeArgs::parse_from(["hubcast", "--github-token", "t", "--repo", "a/b"])
    }

    #[test]
    fn unit_resolve_config_applies_defaults() {
        let config =
            resolve_config(&base_args(), &BridgeFileConfig::default()).expect("config");
        assert_eq!(config.api_base, "https://api.github.com");
        assert_eq!(config.graphql_url, "https://api.github.com/graphql");
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.processed_event_cap, DEFAULT_PROCESSED_EVENT_CAP);
        assert!(!config.silent_mode);
        assert!(!config.poll_once);
        assert_eq!(config.repositories, vec!["a/b".to_string()]);
    }

    #[test]
    fn unit_flags_take_precedence_over_file_values() {
        let args = BridgeArgs::parse_from([
            "hubcast",
            "--github-token",
            "flag-token",
            "--repo",
            "flag/repo",
            "--interval-seconds",
            "5",
            "--silent",
        ]);
        let file = BridgeFileConfig {
            repositories: vec!["file/repo".to_string()],
            github_token: Some("file-token".to_string()),
            interval_seconds: Some(300),
            api_base: Some("https://ghe.example/api/v3".to_string()),
            ..BridgeFileConfig::default()
        };
        let config = resolve_config(&args, &file).expect("config");
        assert_eq!(config.token, "flag-token");
        assert_eq!(config.repositories, vec!["flag/repo".to_string()]);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(config.silent_mode);
        // File values survive where no flag was given.
        assert_eq!(config.api_base, "https://ghe.example/api/v3");
    }

    #[test]
    fn unit_missing_token_and_repositories_are_rejected() {
        let args = BridgeArgs::parse_from(["hubcast", "--repo", "a/b"]);
        assert!(resolve_config(&args, &BridgeFileConfig::default()).is_err());

        let args = BridgeArgs::parse_from(["hubcast", "--github-token", "t"]);
        assert!(resolve_config(&args, &BridgeFileConfig::default()).is_err());
    }

    #[test]
    fn functional_config_file_round_trips_through_resolution() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hubcast.toml");
        std::fs::write(
            &path,
            r#"
repositories = ["acme/site", "acme/tools"]
github_token = "file-token"
interval_seconds = 120
bot_login = "hubot"
poll_once = true
"#,
        )
        .expect("write config");

        let args = BridgeArgs::parse_from(["hubcast"]);
        let file = load_file_config(Some(&path)).expect("file config");
        let config = resolve_config(&args, &file).expect("config");
        assert_eq!(config.token, "file-token");
        assert_eq!(
            config.repositories,
            vec!["acme/site".to_string(), "acme/tools".to_string()]
        );
        assert_eq!(config.poll_interval, Duration::from_secs(120));
        assert_eq!(config.bot_login.as_deref(), Some("hubot"));
        assert!(config.poll_once);
    }

    #[test]
    fn unit_unknown_config_keys_are_rejected() {
        let parsed: Result<BridgeFileConfig, _> = toml::from_str("unknown_key = 1");
        assert!(parsed.is_err());
    }
}
