extern crate google_gmail1 as gmail1;

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use google_gmail1::api::{ListMessagesResponse, Message, Profile, Thread};
use leaky_bucket::RateLimiter;
use serde_json::json;

use crate::{
    config::GmailConfig,
    email::api_quota::{GMAIL_API_QUOTA, GMAIL_QUOTA_PER_SECOND},
    HttpClient,
};

use super::auth::GmailAuthenticator;

#[derive(Default)]
/// Filter and paging options for message list
pub struct MessageListOptions {
    /// Gmail search query (e.g. "in:inbox newer_than:60s")
    pub query: Option<String>,
    pub max_results: Option<u32>,
}

pub const MAX_MESSAGES_PER_PAGE_DEFAULT: u32 = 100;

#[derive(Clone)]
pub struct EmailClient {
    http_client: HttpClient,
    authenticator: Arc<GmailAuthenticator>,
    rate_limiter: Arc<RateLimiter>,
    api_base_url: String,
    pub email_address: String,
}

impl EmailClient {
    pub fn new(
        http_client: HttpClient,
        authenticator: Arc<GmailAuthenticator>,
        cfg: &GmailConfig,
        email_address: String,
    ) -> EmailClient {
        let rate_limiter = Arc::new(
            RateLimiter::builder()
                .initial(GMAIL_QUOTA_PER_SECOND)
                .interval(Duration::from_secs(1))
                .refill(GMAIL_QUOTA_PER_SECOND)
                .build(),
        );

        EmailClient {
            http_client,
            authenticator,
            rate_limiter,
            api_base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            email_address,
        }
    }

    fn url(&self, segments: &[&str]) -> String {
        format!("{}/{}", self.api_base_url, segments.join("/"))
    }

    pub async fn get_message_list(
        &self,
        options: MessageListOptions,
    ) -> anyhow::Result<ListMessagesResponse> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let max_results = options.max_results.unwrap_or(MAX_MESSAGES_PER_PAGE_DEFAULT);

        let mut query = vec![("maxResults".to_string(), max_results.to_string())];
        if let Some(q) = options.query {
            query.push(("q".to_string(), q));
        }

        let resp = self
            .http_client
            .get(self.url(&["messages"]))
            .query(&query)
            .bearer_auth(self.authenticator.access_token().await?)
            .send()
            .await?;

        let data = resp.json::<ListMessagesResponse>().await?;

        Ok(data)
    }

    /// Get a message by ID with FULL format (headers and decoded MIME parts
    /// in the payload).
    pub async fn get_message_by_id(&self, message_id: &str) -> anyhow::Result<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;

        let req = self
            .http_client
            .get(self.url(&["messages", message_id]))
            .bearer_auth(self.authenticator.access_token().await?)
            .query(&[("format", "FULL")])
            .send()
            .await?;

        req.json::<Message>().await.context("Error getting message")
    }

    pub async fn get_thread_by_id(&self, thread_id: &str) -> anyhow::Result<Thread> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.threads_get).await;

        let resp = self
            .http_client
            .get(self.url(&["threads", thread_id]))
            .bearer_auth(self.authenticator.access_token().await?)
            .query(&[("format", "FULL")])
            .send()
            .await?;

        resp.json::<Thread>().await.context("Error getting thread")
    }

    pub async fn get_profile(&self) -> anyhow::Result<Profile> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.get_profile).await;

        let resp = self
            .http_client
            .get(self.url(&["profile"]))
            .bearer_auth(self.authenticator.access_token().await?)
            .send()
            .await?;

        Ok(resp.json::<Profile>().await?)
    }

    /// Send an email using the Gmail API.
    /// The raw_message must be a base64url-encoded RFC 2822 MIME message.
    /// If thread_id is provided, the message is filed into that thread.
    pub async fn send_message(
        &self,
        raw_message: &str,
        thread_id: Option<&str>,
    ) -> anyhow::Result<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_send)
            .await;

        let mut body = json!({
            "raw": raw_message
        });

        if let Some(tid) = thread_id {
            body["threadId"] = json!(tid);
        }

        let resp = self
            .http_client
            .post(self.url(&["messages", "send"]))
            .bearer_auth(self.authenticator.access_token().await?)
            .json(&body)
            .send()
            .await?;

        let data = resp.json::<serde_json::Value>().await?;

        if let Some(error) = data.get("error") {
            return Err(anyhow!("Error sending message: {:?}", error));
        }

        serde_json::from_value(data).context("Failed to parse send response")
    }
}
