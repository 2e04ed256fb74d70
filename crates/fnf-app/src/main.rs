use std::sync::Arc;

use anyhow::Context;
use fnf_app::bootstrap::{Bot, open_store};
use fnf_app::discord::{DryRunSink, sink_from_config};
use fnf_app::shutdown::shutdown_signal;
use fnf_core::config::load_config;
use fnf_service::clock::{Clock, SystemClock};
use fnf_service::event::AnnouncementSink;
use fnf_service::task::TokioTaskScheduler;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(filter_layer).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true),
    );
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;
    tracing_log::LogTracer::init().context("failed to bridge log records")?;

    tracing::info!("Starting Food & Friends bot");

    let config = load_config()?;

    tracing::info!(config = ?config, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    let store = open_store(&config.storage).await?;

    let sink: Arc<dyn AnnouncementSink> = match sink_from_config(&config.discord)? {
        Some(discord) => {
            discord.current_user().await.context("Discord rejected the bot token")?;
            Arc::new(discord)
        }
        None => {
            tracing::warn!("No Discord token configured, announcements are only logged");
            Arc::new(DryRunSink::default())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bot = Bot::new(
        store,
        sink,
        clock.clone(),
        Arc::new(TokioTaskScheduler::new(clock)),
        config.scheduler.recheck_interval(),
    );

    let seeded = bot.seed(&config.schedules).await?;
    tracing::info!(seeded, "Schedules ready");

    // Chat connection is up; the first timer may be armed now.
    if let Err(e) = bot.timer.start().await {
        tracing::error!(error = %e, "Initial scheduling failed, retrying on the fallback interval");
    }

    if let Some(next) = bot.schedules.next_post_time().await? {
        tracing::info!(
            schedule_id = %next.schedule.id,
            post_at = %next.post_at,
            event_at = %next.event_at,
            "Next announcement"
        );
    }

    shutdown_signal().await;

    tracing::info!("Shutting down");
    bot.timer.cancel().await;

    Ok(())
}
