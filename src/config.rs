use anyhow::{Context, Result};
use serde::Deserialize;
use serde::Serialize;
use std::{fs, path::Path};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub lardi: LardiConfig,
    pub telegram: TelegramConfig,
    pub notifications: NotificationsConfig,
    pub session: SessionConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LardiConfig {
    pub search_url: String,
    pub offer_url: String,
    pub webapp_details_url: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationsConfig {
    pub check_interval_secs: u64,
    pub inter_message_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub cookies_file: String,
    pub login_helper_cmd: String,
    pub refresh_interval_hours: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PersistenceConfig {
    pub profiles_file: String,
    pub filters_file: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        if !Path::new(config_path).exists() {
            Self::create_default_config(config_path)?;
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;

        toml::from_str(&config_content).with_context(|| "Failed to parse config file")
    }

    fn create_default_config(path: &str) -> Result<()> {
        let default_config = Config {
            lardi: LardiConfig {
                search_url: "https://lardi-trans.com/webapi/proposal/search/gruz/".into(),
                offer_url: "https://lardi-trans.com/webapi/proposal/offer/gruz/".into(),
                webapp_details_url: "https://example.ngrok-free.app/webapp/cargo_details".into(),
                page_size: 20,
                max_pages: 100,
                request_timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: "YOUR_BOT_TOKEN".into(),
            },
            notifications: NotificationsConfig {
                check_interval_secs: 50,
                inter_message_delay_ms: 300,
            },
            session: SessionConfig {
                cookies_file: "cookies.txt".into(),
                login_helper_cmd: "./lardi-login-helper".into(),
                refresh_interval_hours: 6,
            },
            persistence: PersistenceConfig {
                profiles_file: "profiles.json".into(),
                filters_file: "filters.json".into(),
            },
        };

        let toml = toml::to_string_pretty(&default_config)?;
        fs::write(path, toml)?;

        log::warn!("Created default config file. Please update with your credentials.");
        Ok(())
    }
}
