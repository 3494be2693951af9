use crate::domain::error::Result;
use crate::domain::user_config::{UserConfig, UserConfigUpdate};
use crate::infrastructure::db::UserConfigStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub struct SettingsService {
    configs: Arc<dyn UserConfigStore>,
}

impl SettingsService {
    pub fn new(configs: Arc<dyn UserConfigStore>) -> Self {
        Self { configs }
    }

    /// Returns the stored config, creating the defaults on first access.
    pub async fn get_or_create(&self, user_id: &str) -> Result<UserConfig> {
        if let Some(config) = self.configs.get(user_id).await? {
            return Ok(config);
        }
        let config = self
            .configs
            .upsert(&UserConfig::with_defaults(user_id, Utc::now()))
            .await?;
        info!(user_id, "Created default configuration");
        Ok(config)
    }

    pub async fn update(&self, user_id: &str, update: UserConfigUpdate) -> Result<UserConfig> {
        update.validate()?;
        let mut config = self.get_or_create(user_id).await?;
        config.apply(&update, Utc::now());
        let saved = self.configs.upsert(&config).await?;
        info!(
            user_id,
            run_policy = %saved.run_policy,
            sample_rate_pct = saved.sample_rate_pct,
            obfuscate_pii = saved.obfuscate_pii,
            max_eval_per_day = saved.max_eval_per_day,
            "Configuration updated"
        );
        Ok(saved)
    }
}
