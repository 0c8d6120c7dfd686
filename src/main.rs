use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use rssok::clock::SystemClock;
use rssok::config::Config;
use rssok::feed::{FeedTransformer, HttpFeedSource};
use rssok::media::{MediaFetcher, MediaStore};

const USER_AGENT: &str = concat!("rssok/", env!("CARGO_PKG_VERSION"));
use rssok::server::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(
    name = "rssok",
    about = "RSS proxy that republishes channel feeds with locally hosted images"
)]
struct Args {
    /// TOML config file (optional; missing file means defaults)
    #[arg(long, value_name = "FILE", default_value = "rssok.toml")]
    config: PathBuf,

    /// Port to listen on (overrides PORT and the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Public base URL used in image links, e.g. https://rss.example.com
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Directory where harvested images are stored
    #[arg(long, value_name = "DIR")]
    content_dir: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config
        .apply_env()
        .context("Invalid environment configuration")?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(dir) = &args.content_dir {
        config.content_dir = dir.clone();
    }

    config.validate()?;
    if config.base_url.is_none() {
        tracing::warn!(
            base_url = %config.media_base_url(),
            "No base_url configured; image links will only resolve locally"
        );
    }
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::debug!(?config, "Resolved configuration");

    let store = MediaStore::new(&config.content_dir);
    store.ensure_dir().await.with_context(|| {
        format!(
            "Failed to create content directory {}",
            config.content_dir.display()
        )
    })?;

    // Upstream is operator-configured; image URLs come from the feed and get
    // their own client with a per-hop redirect check.
    let upstream_client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    let fetcher = MediaFetcher::builder()
        .max_bytes(config.max_image_bytes)
        .timeout(config.image_timeout())
        .allow_private_hosts(config.allow_private_hosts)
        .allow_insecure_http(config.allow_insecure_http)
        .build_with(reqwest::Client::builder().user_agent(USER_AGENT))
        .context("Failed to build image HTTP client")?;

    let transformer = FeedTransformer::new(
        fetcher,
        store.clone(),
        Arc::new(SystemClock),
        config.media_base_url(),
    );

    let state = AppState {
        source: Arc::new(HttpFeedSource::new(
            upstream_client,
            config.upstream_url.clone(),
        )),
        transformer: Arc::new(transformer),
        store,
        default_channel: Arc::from(config.default_channel.as_str()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        content_dir = %config.content_dir.display(),
        "Server running"
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
