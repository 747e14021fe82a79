use crate::config::TelegramConfig;
use anyhow::Result;
use reqwest::Client;
use serde_json::json;

/// One inline keyboard button attached to a notification.
#[derive(Debug, Clone)]
pub struct InlineAction {
    pub label: String,
    pub url: String,
}

impl InlineAction {
    /// "Details" button pointing at the web-app details page for an offer.
    pub fn offer_details(base_url: &str, offer_id: i64) -> Self {
        InlineAction {
            label: "📄 Деталі".into(),
            url: format!("{}?cargo_id={}", base_url, offer_id),
        }
    }
}

#[derive(Clone)]
pub struct TelegramService {
    client: Client,
    config: TelegramConfig,
}

impl TelegramService {
    pub fn new(config: TelegramConfig) -> Self {
        TelegramService {
            client: Client::new(),
            config,
        }
    }

    /// Sends one message with optional inline actions. The text is expected
    /// to be pre-escaped HTML; see `formatting::format_offer`.
    pub async fn send(&self, chat_id: i64, text: &str, actions: &[InlineAction]) -> Result<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );

        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        });

        if !actions.is_empty() {
            let row: Vec<serde_json::Value> = actions
                .iter()
                .map(|action| json!({"text": action.label, "url": action.url}))
                .collect();
            payload["reply_markup"] = json!({ "inline_keyboard": [row] });
        }

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let text = response.text().await?;
            return Err(anyhow::anyhow!("Telegram API error: {}", text));
        }

        Ok(())
    }
}
