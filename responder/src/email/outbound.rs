use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use lettre::message::header::ContentType;

use super::client::EmailClient;

/// Seam for sending replies, so the orchestration loop can be exercised
/// without a mail provider.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        thread_id: &str,
        in_reply_to: Option<&str>,
    ) -> anyhow::Result<String>;
}

/// Composes and sends outbound replies threaded into an existing
/// conversation. Not idempotent: calling twice sends twice.
pub struct ReplyDispatcher {
    client: Arc<EmailClient>,
}

impl ReplyDispatcher {
    pub fn new(client: Arc<EmailClient>) -> Self {
        Self { client }
    }

    fn build_reply_mime(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        in_reply_to: Option<&str>,
    ) -> anyhow::Result<Vec<u8>> {
        let from = self
            .client
            .email_address
            .parse()
            .context("Sender address is invalid")?;
        let to = to.parse().context("Recipient address is invalid")?;

        let mut builder = lettre::Message::builder()
            .from(from)
            .reply_to(
                self.client
                    .email_address
                    .parse()
                    .context("Reply-To address is invalid")?,
            )
            .to(to)
            .subject(ensure_reply_subject(subject));

        if let Some(message_id) = in_reply_to {
            builder = builder
                .in_reply_to(message_id.to_string())
                .references(message_id.to_string());
        }

        let message = builder
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .context("Could not build reply message")?;

        Ok(message.formatted())
    }
}

#[async_trait]
impl ReplySender for ReplyDispatcher {
    /// Returns the provider-assigned identifier of the sent message.
    async fn send_reply(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        thread_id: &str,
        in_reply_to: Option<&str>,
    ) -> anyhow::Result<String> {
        let mime = self.build_reply_mime(to, subject, html_body, in_reply_to)?;
        let raw = URL_SAFE.encode(mime);

        let sent = self
            .client
            .send_message(&raw, (!thread_id.is_empty()).then_some(thread_id))
            .await?;

        sent.id.context("Send response carried no message id")
    }
}

/// Prefixes a subject with "Re: " unless it already starts with a reply
/// marker, case-insensitively.
pub fn ensure_reply_subject(subject: &str) -> String {
    if subject.to_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::GmailConfig, email::auth::GmailAuthenticator};

    fn test_dispatcher() -> ReplyDispatcher {
        let http_client = reqwest::Client::new();
        let authenticator = Arc::new(GmailAuthenticator::with_static_token(
            http_client.clone(),
            "test-token".to_string(),
        ));
        let cfg = GmailConfig {
            key_file: String::new(),
            api_base_url: "http://localhost:0".to_string(),
            scopes: vec![],
        };
        ReplyDispatcher::new(Arc::new(EmailClient::new(
            http_client,
            authenticator,
            &cfg,
            "agent@example.com".to_string(),
        )))
    }

    #[test]
    fn test_reply_subject_gets_prefix() {
        assert_eq!(ensure_reply_subject("Hello"), "Re: Hello");
    }

    #[test]
    fn test_reply_subject_prefix_is_idempotent() {
        assert_eq!(ensure_reply_subject("Re: Hello"), "Re: Hello");
        assert_eq!(ensure_reply_subject("RE: Hello"), "RE: Hello");
        assert_eq!(ensure_reply_subject("re: Hello"), "re: Hello");
    }

    #[test]
    fn test_reply_subject_empty() {
        assert_eq!(ensure_reply_subject(""), "Re: ");
    }

    #[test]
    fn test_reply_mime_carries_threading_headers() {
        let dispatcher = test_dispatcher();
        let mime = dispatcher
            .build_reply_mime(
                "jane@example.com",
                "Hello",
                "<p>Hi</p>",
                Some("<original@mail.example.com>"),
            )
            .expect("Could not build mime");
        let mime = String::from_utf8_lossy(&mime);

        assert!(mime.contains("From: agent@example.com"));
        assert!(mime.contains("To: jane@example.com"));
        assert!(mime.contains("Subject: Re: Hello"));
        assert!(mime.contains("In-Reply-To: <original@mail.example.com>"));
        assert!(mime.contains("References: <original@mail.example.com>"));
        assert!(mime.contains("Content-Type: text/html"));
    }

    #[test]
    fn test_reply_mime_omits_threading_headers_when_absent() {
        let dispatcher = test_dispatcher();
        let mime = dispatcher
            .build_reply_mime("jane@example.com", "Hello", "<p>Hi</p>", None)
            .expect("Could not build mime");
        let mime = String::from_utf8_lossy(&mime);

        assert!(!mime.contains("In-Reply-To"));
        assert!(!mime.contains("References"));
    }
}
