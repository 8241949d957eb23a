//! Message intake pipeline: list recent messages, cut the listing at the
//! checkpoint, fetch full content and thread context, and surface normalized
//! inbound messages oldest-first.

use std::sync::Arc;

use anyhow::Context;
use google_gmail1::api::Message;

use crate::store::checkpoint::CheckpointStore;

use super::{
    client::{EmailClient, MessageListOptions},
    inbound_message::{
        extract_plain_text_body, extract_sender_address, header_value, thread_position,
        InboundMessage, ReplyHeaders,
    },
};

pub struct MessageIntake {
    client: Arc<EmailClient>,
    checkpoint: CheckpointStore,
    /// Our own send-from identity, used to recognize threads we opened.
    mailbox_address: String,
}

impl MessageIntake {
    pub fn new(
        client: Arc<EmailClient>,
        checkpoint: CheckpointStore,
        mailbox_address: String,
    ) -> Self {
        Self {
            client,
            checkpoint,
            mailbox_address,
        }
    }

    /// Fetches messages that arrived since the last checkpoint and returns
    /// them oldest-first, so downstream reply generation sees a conversation
    /// in chronological order.
    ///
    /// The checkpoint advances to the newest listed message as soon as the
    /// listing is read, before any per-message extraction: progress commits
    /// even when messages are later skipped for lacking plain text.
    pub async fn fetch_new_messages(
        &self,
        max_results: u32,
        provider_query: &str,
    ) -> anyhow::Result<Vec<InboundMessage>> {
        let last_seen = self.checkpoint.load();

        let listing = self
            .client
            .get_message_list(MessageListOptions {
                query: Some(provider_query.to_string()),
                max_results: Some(max_results),
            })
            .await
            .context("Failed to list recent messages")?;

        let refs = listing.messages.unwrap_or_default();
        let new_refs = select_new_messages(&refs, last_seen.as_deref());

        if let Some(newest_id) = refs.first().and_then(|m| m.id.as_deref()) {
            self.checkpoint
                .save(newest_id)
                .context("Failed to save checkpoint")?;
        }

        let mut result = Vec::with_capacity(new_refs.len());

        // Oldest to newest, the reverse of the provider's listing order.
        for msg_ref in new_refs.iter().rev() {
            let Some(id) = msg_ref.id.as_deref() else {
                continue;
            };

            match self.build_inbound_message(id).await {
                Ok(Some(message)) => result.push(message),
                Ok(None) => {
                    tracing::info!("Message {} has no plain text part, skipping", id);
                }
                Err(e) => {
                    // Never retried: the checkpoint has already advanced.
                    tracing::warn!("Failed to process message {}: {:?}", id, e);
                }
            }
        }

        Ok(result)
    }

    async fn build_inbound_message(&self, id: &str) -> anyhow::Result<Option<InboundMessage>> {
        let full = self
            .client
            .get_message_by_id(id)
            .await
            .context("Failed to fetch full message")?;

        let thread_id = full.thread_id.clone().unwrap_or_default();
        let thread = self
            .client
            .get_thread_by_id(&thread_id)
            .await
            .context("Failed to fetch thread")?;

        let Some(body) = extract_plain_text_body(&full) else {
            return Ok(None);
        };

        let prior_context_body = match thread_position(&thread, id) {
            Some(2) => self.first_message_context(thread.messages.as_deref().unwrap_or_default()),
            _ => None,
        };

        let subject = header_value(&full, "Subject").unwrap_or_default().to_string();
        let sender_address = extract_sender_address(&full);
        let message_id = header_value(&full, "Message-ID").unwrap_or_default().to_string();

        Ok(Some(InboundMessage {
            id: id.to_string(),
            thread_id: thread_id.clone(),
            subject,
            sender_address,
            body,
            prior_context_body,
            reply: ReplyHeaders {
                thread_id,
                message_id,
            },
        }))
    }

    /// Body of the thread's first message, only when that message was sent by
    /// our own mailbox identity and has a usable plain-text body.
    fn first_message_context(&self, thread_messages: &[Message]) -> Option<String> {
        let first = thread_messages.first()?;
        if extract_sender_address(first) != self.mailbox_address {
            return None;
        }
        extract_plain_text_body(first)
    }
}

/// Walks a newest-first listing and collects everything newer than the
/// checkpointed identifier. No checkpoint, or a checkpoint absent from the
/// listing, classifies the entire listing as new.
pub(crate) fn select_new_messages<'a>(
    listing: &'a [Message],
    last_seen: Option<&str>,
) -> Vec<&'a Message> {
    let Some(last_id) = last_seen else {
        return listing.iter().collect();
    };

    let mut new_messages = Vec::new();
    for message in listing {
        if message.id.as_deref() == Some(last_id) {
            return new_messages;
        }
        new_messages.push(message);
    }

    new_messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_ref(id: &str) -> Message {
        Message {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn ids(messages: &[&Message]) -> Vec<String> {
        messages
            .iter()
            .map(|m| m.id.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_no_checkpoint_treats_whole_listing_as_new() {
        let listing = vec![msg_ref("m3"), msg_ref("m2"), msg_ref("m1")];
        let new = select_new_messages(&listing, None);
        assert_eq!(ids(&new), vec!["m3", "m2", "m1"]);
    }

    #[test]
    fn test_checkpoint_cuts_listing_exclusively() {
        let listing = vec![msg_ref("m4"), msg_ref("m3"), msg_ref("m2"), msg_ref("m1")];
        let new = select_new_messages(&listing, Some("m2"));
        assert_eq!(ids(&new), vec!["m4", "m3"]);
    }

    #[test]
    fn test_checkpoint_at_newest_yields_nothing() {
        let listing = vec![msg_ref("m4"), msg_ref("m3")];
        let new = select_new_messages(&listing, Some("m4"));
        assert!(new.is_empty());
    }

    #[test]
    fn test_checkpoint_not_in_listing_treats_whole_listing_as_new() {
        let listing = vec![msg_ref("m4"), msg_ref("m3")];
        let new = select_new_messages(&listing, Some("mX"));
        assert_eq!(ids(&new), vec!["m4", "m3"]);
    }

    #[test]
    fn test_empty_listing() {
        let new = select_new_messages(&[], Some("m1"));
        assert!(new.is_empty());
        let new = select_new_messages(&[], None);
        assert!(new.is_empty());
    }
}
