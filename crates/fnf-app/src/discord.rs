//! Discord REST transport for announcements and log lines.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use serde::Deserialize;

use fnf_core::config::DiscordConfig;
use fnf_core::error::CoreError;
use fnf_core::types::{ChannelId, MessageId};
use fnf_service::error::{ServiceError, ServiceResult};
use fnf_service::event::AnnouncementSink;

use crate::error::AppResult;

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: String,
    pub username: String,
}

/// Bot-token authenticated client for the Discord REST API.
pub struct DiscordSink {
    client: reqwest::Client,
    api_base: String,
}

impl DiscordSink {
    /// ## Errors
    /// Returns an error if the token is not a valid header value or the HTTP client cannot be built.
    pub fn new(api_base: &str, token: &str) -> AppResult<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_err| CoreError::ConfigError("discord.token is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("fnf-bot/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// ## Summary
    /// Fetches the bot's own user, confirming the token works.
    ///
    /// ## Errors
    /// Returns an error if Discord rejects the token or cannot be reached.
    #[tracing::instrument(skip(self))]
    pub async fn current_user(&self) -> AppResult<BotUser> {
        let user = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .send()
            .await?
            .error_for_status()?
            .json::<BotUser>()
            .await?;
        tracing::info!(user = %user.username, id = %user.id, "Authenticated with Discord");
        Ok(user)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ServiceResult<reqwest::Response> {
        let mut request = self.client.request(method.clone(), format!("{}{path}", self.api_base));
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.map_err(|e| {
            tracing::warn!(%method, path, error = %e, "Discord request failed");
            ServiceError::AnnouncementError(format!("{method} {path}: {e}"))
        })
    }

    async fn expect_success(response: reqwest::Response) -> ServiceResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(ServiceError::AnnouncementError(format!("Discord {status}: {text}")))
    }
}

/// Path for the bot's own reaction; the emoji is percent-encoded as a path segment.
fn reaction_path(channel: ChannelId, message: MessageId, emoji: &str) -> String {
    format!(
        "/channels/{channel}/messages/{message}/reactions/{}/@me",
        urlencoding::encode(emoji)
    )
}

#[async_trait]
impl AnnouncementSink for DiscordSink {
    #[tracing::instrument(skip(self, content))]
    async fn send_message(&self, channel: ChannelId, content: &str) -> ServiceResult<MessageId> {
        let response = self
            .request(
                Method::POST,
                &format!("/channels/{channel}/messages"),
                Some(serde_json::json!({ "content": content })),
            )
            .await?;
        let message: MessageResponse = Self::expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::AnnouncementError(format!("Invalid message response: {e}")))?;

        message
            .id
            .parse()
            .map_err(|e: CoreError| ServiceError::AnnouncementError(e.to_string()))
    }

    #[tracing::instrument(skip(self, content))]
    async fn edit_message(&self, channel: ChannelId, message: MessageId, content: &str) -> ServiceResult<()> {
        let response = self
            .request(
                Method::PATCH,
                &format!("/channels/{channel}/messages/{message}"),
                Some(serde_json::json!({ "content": content })),
            )
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn message_exists(&self, channel: ChannelId, message: MessageId) -> ServiceResult<bool> {
        let response = self
            .request(Method::GET, &format!("/channels/{channel}/messages/{message}"), None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success(response).await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> ServiceResult<()> {
        let response = self
            .request(Method::PUT, &reaction_path(channel, message, emoji), None)
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

/// Sink used when no bot token is configured: everything is logged, nothing is sent.
#[derive(Debug, Default)]
pub struct DryRunSink {
    next_id: AtomicU64,
}

#[async_trait]
impl AnnouncementSink for DryRunSink {
    async fn send_message(&self, channel: ChannelId, content: &str) -> ServiceResult<MessageId> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!(%channel, message = %id, content, "Dry run: would send message");
        Ok(id)
    }

    async fn edit_message(&self, channel: ChannelId, message: MessageId, content: &str) -> ServiceResult<()> {
        tracing::info!(%channel, %message, content, "Dry run: would edit message");
        Ok(())
    }

    async fn message_exists(&self, _channel: ChannelId, message: MessageId) -> ServiceResult<bool> {
        Ok(message.get() <= self.next_id.load(Ordering::Relaxed))
    }

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> ServiceResult<()> {
        tracing::debug!(%channel, %message, emoji, "Dry run: would react");
        Ok(())
    }
}

/// ## Summary
/// Builds the Discord sink when a token is configured.
///
/// ## Errors
/// Returns an error if the configured token cannot be used.
pub fn sink_from_config(config: &DiscordConfig) -> AppResult<Option<DiscordSink>> {
    config
        .token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .map(|token| DiscordSink::new(&config.api_base, token.trim()))
        .transpose()
}
