use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use joyip_cli::config::ClientConfig;
use joyip_cli::repl;
use joyip_client::{GenerationApi, HttpGenerationApi};
use joyip_controller::{ControllerConfig, JobController};
use joyip_core::generation::GenerationSettings;
use joyip_store::FileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    // Logs go to stderr so they do not interleave with the chat on stdout.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "joyip=info,joyip_cli=info,joyip_controller=info,joyip_client=info,joyip_store=info".into()
    });
    let json_logs = std::env::var("JOYIP_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // --- Configuration ---
    let config = ClientConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        api_url = %config.api_url,
        state_dir = %config.state_dir.display(),
        mode = %config.mode,
        "Loaded client configuration"
    );

    // --- Backend ---
    let api: Arc<dyn GenerationApi> =
        Arc::new(HttpGenerationApi::new(config.api_url.as_str()).with_timeouts(config.timeouts));
    match api.health().await {
        Ok(_) => tracing::info!("Backend health check passed"),
        Err(e) => tracing::warn!(error = %e, "Backend health check failed, continuing"),
    }

    // --- Local state ---
    let store = FileStore::open(&config.state_dir)
        .with_context(|| format!("Failed to open state directory {}", config.state_dir.display()))?;
    tracing::debug!(dir = %store.dir().display(), "Chat state store opened");

    // --- Controller ---
    let controller = JobController::new(
        Arc::clone(&api),
        Arc::new(store),
        ControllerConfig {
            poll_interval: config.poll_interval,
            settings: GenerationSettings {
                mode: config.mode,
                ..Default::default()
            },
        },
    );

    let result = repl::run(&controller, api.as_ref(), BufReader::new(tokio::io::stdin())).await;

    controller.shutdown().await;
    result
}
