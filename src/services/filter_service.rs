use crate::model::{FilterSpecification, InvalidRange, RangeField};
use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// File-backed store of per-user search filters. A user without a stored
/// filter gets the built-in defaults; mutations validate before anything is
/// persisted, so an invalid input never dirties the stored specification.
pub struct FilterStore {
    path: PathBuf,
    filters: Mutex<HashMap<i64, FilterSpecification>>,
}

impl FilterStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let filters = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Corrupt filters file: {}", path.display()))?,
            Err(_) => {
                warn!(
                    "No filters file at {}, all users start with default filters",
                    path.display()
                );
                HashMap::new()
            }
        };

        Ok(FilterStore {
            path,
            filters: Mutex::new(filters),
        })
    }

    fn persist(&self, filters: &HashMap<i64, FilterSpecification>) -> Result<()> {
        let data = serde_json::to_string_pretty(filters)?;
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to persist filters to {}", self.path.display()))?;
        Ok(())
    }

    /// The active filter for a user, or the defaults when none is stored.
    pub async fn filter_for(&self, user_id: i64) -> FilterSpecification {
        let filters = self.filters.lock().await;
        filters.get(&user_id).cloned().unwrap_or_default()
    }

    /// Applies one mutation to a user's filter. The closure works on a copy;
    /// only a successful validation result is stored and persisted.
    pub async fn update<F>(&self, user_id: i64, mutate: F) -> Result<FilterSpecification>
    where
        F: FnOnce(&mut FilterSpecification) -> Result<(), InvalidRange>,
    {
        let mut filters = self.filters.lock().await;
        let mut candidate = filters.get(&user_id).cloned().unwrap_or_default();
        mutate(&mut candidate)?;
        filters.insert(user_id, candidate.clone());
        self.persist(&filters)?;
        Ok(candidate)
    }

    pub async fn set_range(
        &self,
        user_id: i64,
        field: RangeField,
        from: Option<f64>,
        to: Option<f64>,
    ) -> Result<FilterSpecification> {
        self.update(user_id, |filter| filter.set_range(field, from, to))
            .await
    }

    pub async fn reset(&self, user_id: i64) -> Result<FilterSpecification> {
        let mut filters = self.filters.lock().await;
        let defaults = FilterSpecification::default();
        filters.insert(user_id, defaults.clone());
        self.persist(&filters)?;
        info!("Reset filters to defaults for user {}", user_id);
        Ok(defaults)
    }
}
