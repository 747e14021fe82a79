use crate::model::UserNotificationProfile;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// File-backed store of per-user notification state. Every mutation is
/// written through to disk so that a crash mid-delivery never re-sends an
/// offer that was already marked delivered.
pub struct ProfileStore {
    path: PathBuf,
    profiles: Mutex<HashMap<i64, UserNotificationProfile>>,
}

impl ProfileStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let profiles = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Corrupt profiles file: {}", path.display()))?,
            Err(_) => {
                warn!(
                    "No profiles file at {}, starting with no users",
                    path.display()
                );
                HashMap::new()
            }
        };

        Ok(ProfileStore {
            path,
            profiles: Mutex::new(profiles),
        })
    }

    fn persist(&self, profiles: &HashMap<i64, UserNotificationProfile>) -> Result<()> {
        let data = serde_json::to_string_pretty(profiles)?;
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to persist profiles to {}", self.path.display()))?;
        Ok(())
    }

    pub async fn get_or_create(&self, user_id: i64) -> Result<UserNotificationProfile> {
        let mut profiles = self.profiles.lock().await;
        if let Some(profile) = profiles.get(&user_id) {
            return Ok(profile.clone());
        }
        let profile = UserNotificationProfile::new(user_id);
        profiles.insert(user_id, profile.clone());
        self.persist(&profiles)?;
        info!("Created notification profile for user {}", user_id);
        Ok(profile)
    }

    /// Toggles notifications. Enabling resets the watermark to now and
    /// clears the skip-list, so a freshly subscribed user is not flooded
    /// with historical offers.
    pub async fn set_notifications(
        &self,
        user_id: i64,
        enabled: bool,
    ) -> Result<UserNotificationProfile> {
        let mut profiles = self.profiles.lock().await;
        let profile = profiles
            .entry(user_id)
            .or_insert_with(|| UserNotificationProfile::new(user_id));
        profile.notifications_enabled = enabled;
        if enabled {
            profile.last_checked_at = Utc::now();
            profile.delivered_ids.clear();
        }
        let snapshot = profile.clone();
        self.persist(&profiles)?;
        Ok(snapshot)
    }

    pub async fn enabled_profiles(&self) -> Vec<UserNotificationProfile> {
        let profiles = self.profiles.lock().await;
        profiles
            .values()
            .filter(|p| p.notifications_enabled)
            .cloned()
            .collect()
    }

    pub async fn mark_delivered(&self, user_id: i64, offer_id: i64) -> Result<()> {
        let mut profiles = self.profiles.lock().await;
        let profile = profiles
            .entry(user_id)
            .or_insert_with(|| UserNotificationProfile::new(user_id));
        if profile.delivered_ids.insert(offer_id) {
            self.persist(&profiles)?;
        }
        Ok(())
    }

    /// Moves the watermark forward, never backward.
    pub async fn advance_watermark(&self, user_id: i64, instant: DateTime<Utc>) -> Result<()> {
        let mut profiles = self.profiles.lock().await;
        let profile = profiles
            .entry(user_id)
            .or_insert_with(|| UserNotificationProfile::new(user_id));
        if instant > profile.last_checked_at {
            profile.last_checked_at = instant;
            self.persist(&profiles)?;
        }
        Ok(())
    }

    /// Called once at scheduler startup: resets enabled users' watermarks to
    /// now so a restart does not replay offers from the downtime window.
    pub async fn reset_watermarks_to_now(&self) -> Result<()> {
        let mut profiles = self.profiles.lock().await;
        let now = Utc::now();
        let mut touched = 0;
        for profile in profiles.values_mut() {
            if profile.notifications_enabled {
                profile.last_checked_at = now;
                touched += 1;
            }
        }
        if touched > 0 {
            self.persist(&profiles)?;
            info!("Reset watermarks for {} active users", touched);
        }
        Ok(())
    }
}
