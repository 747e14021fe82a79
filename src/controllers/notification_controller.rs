use crate::config::NotificationsConfig;
use crate::errors::ApiError;
use crate::formatting::format_offer;
use crate::model::{FilterSpecification, Offer, UserNotificationProfile};
use crate::services::filter_service::FilterStore;
use crate::services::lardi_service::{LardiClient, SearchTransport};
use crate::services::profile_service::ProfileStore;
use crate::services::session_service::LoginFlow;
use crate::services::shutdown_service::ShutdownHandle;
use crate::services::telegram_service::{InlineAction, TelegramService};
use crate::utils::parse_offer_timestamp;
use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Where the scheduler gets its offers from. In production this is the
/// Lardi client's full paged fetch.
#[allow(async_fn_in_trait)]
pub trait OfferSource: Send + Sync {
    async fn fetch_all(&self, filter: &FilterSpecification) -> Result<Vec<Offer>, ApiError>;
}

impl<T: SearchTransport, L: LoginFlow> OfferSource for LardiClient<T, L> {
    async fn fetch_all(&self, filter: &FilterSpecification) -> Result<Vec<Offer>, ApiError> {
        self.search_all(filter).await
    }
}

/// Where delivered messages go. In production, the Telegram transport.
#[allow(async_fn_in_trait)]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: i64, text: &str, actions: &[InlineAction]) -> Result<()>;
}

impl Notifier for TelegramService {
    async fn notify(&self, user_id: i64, text: &str, actions: &[InlineAction]) -> Result<()> {
        self.send(user_id, text, actions).await
    }
}

/// The polling and deduplication engine. Each enabled user gets an
/// independent FETCH → DIFF → DELIVER → ADVANCE cycle per pass; one user's
/// failure never aborts the others, and the outer loop never dies.
pub struct NotificationEngine<S: OfferSource, N: Notifier> {
    source: Arc<S>,
    notifier: Arc<N>,
    profiles: Arc<ProfileStore>,
    filters: Arc<FilterStore>,
    check_interval: Duration,
    send_delay: Duration,
    details_url: String,
}

impl<S: OfferSource, N: Notifier> NotificationEngine<S, N> {
    pub fn new(
        source: Arc<S>,
        notifier: Arc<N>,
        profiles: Arc<ProfileStore>,
        filters: Arc<FilterStore>,
        config: &NotificationsConfig,
        details_url: String,
    ) -> Self {
        NotificationEngine {
            source,
            notifier,
            profiles,
            filters,
            check_interval: Duration::from_secs(config.check_interval_secs),
            send_delay: Duration::from_millis(config.inter_message_delay_ms),
            details_url,
        }
    }

    pub async fn run(&self, shutdown: ShutdownHandle) {
        // a restart must not replay the downtime window as a storm of
        // historical notifications
        if let Err(e) = self.profiles.reset_watermarks_to_now().await {
            error!("Failed to reset watermarks at startup: {:#}", e);
        }

        let mut interval = time::interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !shutdown.is_shutdown() {
            interval.tick().await;
            if shutdown.is_shutdown() {
                break;
            }
            self.run_pass().await;
        }

        info!("Notification scheduler stopped");
    }

    /// One full pass over all users with notifications enabled.
    pub async fn run_pass(&self) {
        let users = self.profiles.enabled_profiles().await;
        debug!("Notification pass over {} users", users.len());

        for profile in &users {
            match self.run_user_cycle(profile).await {
                Ok(0) => {}
                Ok(sent) => info!(
                    "Delivered {} new offers to user {}",
                    sent, profile.user_id
                ),
                Err(e) => error!(
                    "Notification cycle failed for user {}: {:#}",
                    profile.user_id, e
                ),
            }
        }
    }

    /// FETCH → DIFF → DELIVER → ADVANCE for one user. A fetch failure
    /// returns early so the watermark stays put and the same window is
    /// retried next pass.
    async fn run_user_cycle(&self, profile: &UserNotificationProfile) -> Result<usize> {
        let filter = self.filters.filter_for(profile.user_id).await;
        let offers = self.source.fetch_all(&filter).await?;

        let mut delivered_ids = profile.delivered_ids.clone();
        let mut sent = 0;

        // delivery order is whatever the fetch returned
        for offer in offers {
            let Some(raw) = offer.date_create.as_deref() else {
                warn!("Offer {} has no creation date, skipping", offer.id);
                continue;
            };
            let Some(created_at) = parse_offer_timestamp(raw) else {
                warn!(
                    "Offer {} has unparsable creation date '{}', skipping",
                    offer.id, raw
                );
                continue;
            };
            if created_at <= profile.last_checked_at {
                continue;
            }
            if !delivered_ids.insert(offer.id) {
                continue;
            }

            let text = format_offer(&offer);
            let actions = [InlineAction::offer_details(&self.details_url, offer.id)];
            if let Err(e) = self.notifier.notify(profile.user_id, &text, &actions).await {
                // a rejected send still counts as delivered: re-attempting
                // against a blocked recipient is not meaningful
                error!(
                    "Failed to deliver offer {} to user {}: {:#}",
                    offer.id, profile.user_id, e
                );
            }
            self.profiles
                .mark_delivered(profile.user_id, offer.id)
                .await?;
            sent += 1;

            time::sleep(self.send_delay).await;
        }

        self.profiles
            .advance_watermark(profile.user_id, Utc::now())
            .await?;
        Ok(sent)
    }
}
