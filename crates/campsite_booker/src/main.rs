//! Main entry point for the campsite booker.
//! Watches the configured campgrounds and books the first site that opens up.

mod config;
mod scan_manager;

use std::sync::Arc;

use anyhow::{Context, bail};
use campground_scan::{ChromiumEngine, RunExecutor, RunOutcome};
use notification_services::{
    FanoutNotifier, LogNotifier, Notifier, PushNotifier, SesNotifier, SnsNotifier,
};

use crate::config::{AppConfig, NotificationChannels};
use crate::scan_manager::ScanManager;

async fn build_notifier(channels: &NotificationChannels) -> Arc<dyn Notifier> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];

    if let Some((server, topic)) = &channels.push {
        match PushNotifier::new(server, topic) {
            Ok(push) => {
                log::info!("📣 Push notifications go to {}", push.endpoint());
                notifiers.push(Arc::new(push));
            }
            Err(e) => log::warn!("🔧 Push notifications disabled: {}", e),
        }
    }

    if let Some(target) = &channels.sns_target {
        match SnsNotifier::new(target).await {
            Ok(sns) => {
                log::info!("📱 SNS notifications enabled");
                notifiers.push(Arc::new(sns));
            }
            Err(e) => log::warn!("🔧 SNS notifications disabled: {}", e),
        }
    }

    if let Some((from, to)) = &channels.ses {
        match SesNotifier::new(from, to).await {
            Ok(ses) => {
                log::info!("📧 Email notifications go to {}", to);
                notifiers.push(Arc::new(ses));
            }
            Err(e) => log::warn!("🔧 Email notifications disabled: {}", e),
        }
    }

    Arc::new(FanoutNotifier::new(notifiers))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting campsite booker...");

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let names: Vec<&str> = config.targets.iter().map(|t| t.name.as_str()).collect();
    log::info!("🏕️ Watching {} for {}", names.join(", "), config.window);

    let engine = Arc::new(
        ChromiumEngine::launch(config.browser.clone())
            .await
            .context("Failed to start the browser")?,
    );
    let notifier = build_notifier(&config.channels).await;

    let executor = RunExecutor::new(
        engine.clone(),
        notifier,
        config.targets.clone(),
        config.probe_settings(),
        config.profile.clone(),
        config.executor.clone(),
    );

    let mut manager = ScanManager::new(executor);
    manager.start();

    let outcome = tokio::select! {
        outcome = manager.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            log::info!("🛑 Interrupted");
            None
        }
    };
    manager.stop().await;
    drop(manager);

    match Arc::try_unwrap(engine) {
        Ok(engine) => {
            if let Err(e) = engine.shutdown().await {
                log::warn!("⚠️ {}", e);
            }
        }
        Err(_) => log::warn!("⚠️ Browser still in use, leaving it to exit with the process"),
    }

    match outcome {
        Some(RunOutcome::BookingFailed { target, stage, cause }) => {
            bail!("Booking {} failed at {}: {}", target, stage, cause)
        }
        Some(RunOutcome::Booked { target }) => {
            log::info!("✅ All done, {} is booked. Check the screenshot ✨", target);
            Ok(())
        }
        Some(RunOutcome::NoInventory) | None => Ok(()),
    }
}
