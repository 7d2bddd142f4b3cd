use super::{AnnouncePayload, DeliveryCollaborator, DeliveryOutcome};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::content::ContentKind;

/// Posts announcements to a Discord webhook with bounded retries and
/// exponential backoff.
#[derive(Clone)]
pub struct DiscordDelivery {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordDelivery {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Delay before retry `attempt + 1`: 500ms doubling per attempt, capped
    /// at 32s so a large retry budget cannot overflow the shift.
    fn backoff(attempt: u8) -> Duration {
        Duration::from_millis(500u64 << u32::from(attempt.saturating_sub(1)).min(6))
    }

    fn render(payload: &AnnouncePayload) -> DiscordWebhookPayload {
        let verb = match payload.kind {
            ContentKind::Livestream => "is live",
            ContentKind::Video => "uploaded a video",
            _ => "posted",
        };
        let title = match payload.author.as_deref() {
            Some(author) => format!("{author} {verb}"),
            None => format!("New {verb}"),
        };

        let mut description = String::new();
        if let Some(t) = &payload.title {
            description.push_str(&format!("**{t}**\n"));
        }
        if let Some(u) = &payload.url {
            description.push_str(u);
            description.push('\n');
        }
        description.push_str(&format!("_via {}_", payload.source));

        DiscordWebhookPayload::embed(&title, &description)
    }
}

#[async_trait::async_trait]
impl DeliveryCollaborator for DiscordDelivery {
    async fn announce(&self, payload: &AnnouncePayload) -> Result<DeliveryOutcome> {
        let body = Self::render(payload);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Self::backoff(attempt)).await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(DeliveryOutcome::ok());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: description.to_string(),
            }],
        }
    }
}
