pub mod salesforce;

use async_trait::async_trait;
use derive_more::derive::Display;

use crate::error::AppResult;

/// A person record in the CRM, keyed by email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmRecord {
    pub id: String,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ActivityDirection {
    Inbound,
    Outbound,
}

/// Result of an activity-logging call. An unsuccessful outcome is reported,
/// not raised: the email workflow proceeds even when CRM logging fails.
#[derive(Debug, Clone, Default)]
pub struct ActivityOutcome {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Looks the address up as a contact first, then as a lead.
    async fn find_contact_or_lead_by_email(&self, address: &str)
        -> AppResult<Option<CrmRecord>>;

    async fn create_lead(&self, address: &str) -> AppResult<CrmRecord>;

    async fn log_activity(
        &self,
        person_id: &str,
        subject: &str,
        body: &str,
        direction: ActivityDirection,
    ) -> AppResult<ActivityOutcome>;
}
