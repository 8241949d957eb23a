//! Orchestration loop: polls the mailbox on a fixed interval and runs each
//! inbound message through CRM resolution, AI reply generation, and dispatch.

use std::{sync::Arc, time::Duration};

use indoc::formatdoc;
use minijinja::render;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Settings,
    crm::{ActivityDirection, CrmClient, CrmRecord},
    email::{
        inbound_message::InboundMessage,
        intake::MessageIntake,
        outbound::{ensure_reply_subject, ReplySender},
    },
    error::AppResult,
    prompt::AiResponder,
    store::conversations::ConversationBindingStore,
};

const REPLY_BODY_TEMPLATE: &str =
    "Hi {{ first_name }},<br><br>{{ reply_html }}<br><br>All the best,<br>{{ signature }}";

pub struct ResponderAgent {
    settings: Settings,
    intake: MessageIntake,
    sender: Arc<dyn ReplySender>,
    crm: Arc<dyn CrmClient>,
    ai: Arc<dyn AiResponder>,
    bindings: ConversationBindingStore,
}

impl ResponderAgent {
    pub fn new(
        settings: Settings,
        intake: MessageIntake,
        sender: Arc<dyn ReplySender>,
        crm: Arc<dyn CrmClient>,
        ai: Arc<dyn AiResponder>,
        bindings: ConversationBindingStore,
    ) -> Self {
        Self {
            settings,
            intake,
            sender,
            crm,
            ai,
            bindings,
        }
    }

    /// Main polling loop. Cycles are strictly sequential: a missed tick is
    /// delayed, never run concurrently with the previous cycle.
    pub async fn run(&self, shutdown: CancellationToken) {
        let polling_interval = Duration::from_secs(self.settings.polling_interval_secs);
        let mut interval = tokio::time::interval(polling_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Responder started (interval: {}s, mailbox: {})",
            self.settings.polling_interval_secs,
            self.settings.mailbox_address
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Responder shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.process_cycle().await {
                        tracing::error!("Error processing poll cycle: {:?}", e);
                    }
                }
            }
        }
    }

    pub async fn process_cycle(&self) -> anyhow::Result<()> {
        let query = recency_query(self.settings.polling_interval_secs);
        let messages = self
            .intake
            .fetch_new_messages(self.settings.max_results_per_cycle, &query)
            .await?;

        if messages.is_empty() {
            tracing::debug!("No new emails to process");
            return Ok(());
        }

        tracing::info!("Processing {} new message(s)", messages.len());
        self.process_batch(&messages).await;

        Ok(())
    }

    /// Runs the batch strictly in order. A failing message is logged and
    /// never aborts the rest of the batch.
    pub async fn process_batch(&self, messages: &[InboundMessage]) {
        for message in messages {
            if let Err(e) = self.handle_message(message).await {
                tracing::error!(
                    "Error processing message {} from {}: {:?}",
                    message.id,
                    message.sender_address,
                    e
                );
            }
        }
    }

    async fn handle_message(&self, message: &InboundMessage) -> AppResult<()> {
        tracing::info!(
            "Processing message {} from {} (subject: {})",
            message.id,
            message.sender_address,
            message.subject
        );

        let record = self.resolve_crm_record(&message.sender_address).await?;
        let first_name = record
            .first_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or("there")
            .to_string();

        self.log_activity(
            &record.id,
            &message.subject,
            &message.body,
            ActivityDirection::Inbound,
        )
        .await;

        let input = build_ai_input(message, &self.settings.mailbox_address);

        let conversation_id = self
            .bindings
            .get_or_create(&record.id, || self.ai.create_conversation())
            .await?;

        let reply_text = self.ai.generate_reply(&conversation_id, &input).await?;

        let html_body = render_reply_html(&first_name, &reply_text, &self.settings.reply_signature);
        let reply_subject = ensure_reply_subject(&message.subject);

        let sent_id = self
            .sender
            .send_reply(
                &message.sender_address,
                &message.subject,
                &html_body,
                &message.reply.thread_id,
                (!message.reply.message_id.is_empty()).then_some(message.reply.message_id.as_str()),
            )
            .await?;

        tracing::info!("Reply {} sent to {}", sent_id, message.sender_address);

        self.log_activity(
            &record.id,
            &reply_subject,
            &reply_text,
            ActivityDirection::Outbound,
        )
        .await;

        Ok(())
    }

    async fn resolve_crm_record(&self, sender_address: &str) -> AppResult<CrmRecord> {
        if let Some(record) = self
            .crm
            .find_contact_or_lead_by_email(sender_address)
            .await?
        {
            return Ok(record);
        }

        let record = self.crm.create_lead(sender_address).await?;
        tracing::info!("Created new lead {} for {}", record.id, sender_address);

        Ok(record)
    }

    /// CRM activity logging is reported but never blocks the email workflow.
    async fn log_activity(
        &self,
        person_id: &str,
        subject: &str,
        body: &str,
        direction: ActivityDirection,
    ) {
        match self.crm.log_activity(person_id, subject, body, direction).await {
            Ok(outcome) if outcome.success => {
                tracing::info!(
                    "Logged {} email as task {}",
                    direction,
                    outcome.id.unwrap_or_default()
                );
            }
            Ok(outcome) => {
                tracing::warn!(
                    "Failed to log {} email task: {}",
                    direction,
                    outcome.error.unwrap_or_default()
                );
            }
            Err(e) => {
                tracing::warn!("Failed to log {} email task: {:?}", direction, e);
            }
        }
    }
}

/// Converts the polling interval into the provider's recency-query
/// granularity (newer_than supports s, m, h).
pub(crate) fn recency_query(polling_interval_secs: u64) -> String {
    let time_filter = if polling_interval_secs < 60 {
        format!("newer_than:{}s", polling_interval_secs)
    } else if polling_interval_secs < 3600 {
        format!("newer_than:{}m", polling_interval_secs / 60)
    } else {
        format!("newer_than:{}h", polling_interval_secs / 3600)
    };

    format!("in:inbox {}", time_filter)
}

/// With prior thread context, the AI sees both sides of the exchange;
/// otherwise the inbound body alone.
pub(crate) fn build_ai_input(message: &InboundMessage, mailbox_address: &str) -> String {
    match &message.prior_context_body {
        Some(prior) => formatdoc! {"
            Previous message from {mailbox_address}:
            {prior}

            ---

            Current message from {sender}:
            {body}",
            sender = message.sender_address,
            body = message.body,
        },
        None => message.body.clone(),
    }
}

pub(crate) fn render_reply_html(first_name: &str, reply_text: &str, signature: &str) -> String {
    let reply_html = reply_text.replace('\n', "<br>");
    render!(REPLY_BODY_TEMPLATE, first_name, reply_html, signature)
}
