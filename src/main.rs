mod config;
mod controllers;
mod errors;
mod formatting;
mod logging;
mod model;
mod services;
mod utils;

use anyhow::Result;
use config::Config;
use controllers::notification_controller::NotificationEngine;
use services::filter_service::FilterStore;
use services::lardi_service::{HttpTransport, LardiClient};
use services::profile_service::ProfileStore;
use services::session_service::{HelperCommandLogin, SessionManager, run_refresh_loop};
use services::shutdown_service::ShutdownHandle;
use services::telegram_service::TelegramService;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = logging::init_logger();

    let config = Config::load()?;
    let shutdown = ShutdownHandle::new();

    let session = Arc::new(SessionManager::new(
        HelperCommandLogin {
            command: config.session.login_helper_cmd.clone(),
        },
        &config.session.cookies_file,
    ));
    let transport = HttpTransport::new(&config.lardi)?;
    let client = Arc::new(LardiClient::new(transport, session.clone(), &config.lardi));
    let telegram = Arc::new(TelegramService::new(config.telegram.clone()));
    let profiles = Arc::new(ProfileStore::load(&config.persistence.profiles_file)?);
    let filters = Arc::new(FilterStore::load(&config.persistence.filters_file)?);

    // proactive cookie renewal, independent of the 401-triggered path
    tokio::spawn(run_refresh_loop(
        session.clone(),
        Duration::from_secs(config.session.refresh_interval_hours * 3600),
        shutdown.clone(),
    ));

    let engine = NotificationEngine::new(
        client,
        telegram,
        profiles,
        filters,
        &config.notifications,
        config.lardi.webapp_details_url.clone(),
    );
    let scheduler_shutdown = shutdown.clone();
    tokio::spawn(async move {
        engine.run(scheduler_shutdown).await;
    });

    shutdown.wait_for_ctrl_c().await?;
    Ok(())
}
