pub mod openai;

use async_trait::async_trait;

use crate::error::AppResult;

/// The AI collaborator: conversation handles preserve context across
/// generation calls for the same CRM contact.
#[async_trait]
pub trait AiResponder: Send + Sync {
    async fn create_conversation(&self) -> AppResult<String>;

    async fn generate_reply(&self, conversation_id: &str, input: &str) -> AppResult<String>;
}
