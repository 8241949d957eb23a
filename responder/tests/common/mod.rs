#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use responder::{
    config::GmailConfig,
    email::{auth::GmailAuthenticator, client::EmailClient, intake::MessageIntake},
    store::checkpoint::CheckpointStore,
};

pub const MAILBOX: &str = "tyron@theworkflowpro.com";

/// A mock Gmail endpoint plus a scratch directory for the persistent stores.
pub struct GmailFixture {
    pub server: MockServer,
    pub dir: TempDir,
}

impl GmailFixture {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn api_base_url(&self) -> String {
        format!("{}/gmail", self.server.uri())
    }

    pub fn email_client(&self) -> Arc<EmailClient> {
        let http_client = reqwest::Client::new();
        let authenticator = Arc::new(GmailAuthenticator::with_static_token(
            http_client.clone(),
            "test-token".to_string(),
        ));
        let cfg = GmailConfig {
            key_file: String::new(),
            api_base_url: self.api_base_url(),
            scopes: vec![],
        };
        Arc::new(EmailClient::new(
            http_client,
            authenticator,
            &cfg,
            MAILBOX.to_string(),
        ))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("last_msg.json")
    }

    pub fn intake(&self) -> MessageIntake {
        MessageIntake::new(
            self.email_client(),
            CheckpointStore::new(self.checkpoint_path()),
            MAILBOX.to_string(),
        )
    }

    pub fn seed_checkpoint(&self, id: &str) {
        CheckpointStore::new(self.checkpoint_path()).save(id).unwrap();
    }

    pub fn checkpoint(&self) -> Option<String> {
        CheckpointStore::new(self.checkpoint_path()).load()
    }

    /// Mounts the message listing, newest first.
    pub async fn mount_list(&self, refs: &[(&str, &str)]) {
        let messages: Vec<Value> = refs
            .iter()
            .map(|(id, thread_id)| json!({ "id": id, "threadId": thread_id }))
            .collect();

        Mock::given(method("GET"))
            .and(path("/gmail/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": messages,
                "resultSizeEstimate": messages.len(),
            })))
            .mount(&self.server)
            .await;
    }

    /// Mounts an empty listing (Gmail omits the messages key entirely).
    pub async fn mount_empty_list(&self) {
        Mock::given(method("GET"))
            .and(path("/gmail/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "resultSizeEstimate": 0 })),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mount_full_message(&self, message: &Value) {
        let id = message["id"].as_str().unwrap();
        Mock::given(method("GET"))
            .and(path(format!("/gmail/messages/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(message))
            .mount(&self.server)
            .await;
    }

    /// Mounts a mock asserting a message is never fetched.
    pub async fn forbid_full_message(&self, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/gmail/messages/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_thread(&self, thread_id: &str, messages: &[Value]) {
        Mock::given(method("GET"))
            .and(path(format!("/gmail/threads/{}", thread_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": thread_id,
                "messages": messages,
            })))
            .mount(&self.server)
            .await;
    }
}

pub fn plain_part(text: &str) -> Value {
    json!({
        "mimeType": "text/plain",
        "body": { "data": URL_SAFE.encode(text) }
    })
}

pub fn html_part(html: &str) -> Value {
    json!({
        "mimeType": "text/html",
        "body": { "data": URL_SAFE.encode(html) }
    })
}

/// A FULL-format message with a multipart/alternative payload.
pub fn full_message(
    id: &str,
    thread_id: &str,
    from: &str,
    subject: &str,
    parts: &[Value],
) -> Value {
    json!({
        "id": id,
        "threadId": thread_id,
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                { "name": "From", "value": from },
                { "name": "Subject", "value": subject },
                { "name": "Message-ID", "value": format!("<{}@mail.gmail.com>", id) }
            ],
            "parts": parts
        }
    })
}
