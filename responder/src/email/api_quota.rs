//! Gmail API quota units per endpoint, for the leaky-bucket rate limiter.
//! Values are Google's published per-method costs.

pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
    pub threads_get: usize,
    pub messages_send: usize,
    pub get_profile: usize,
}

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
    threads_get: 10,
    messages_send: 100,
    get_profile: 1,
};

pub const GMAIL_QUOTA_PER_SECOND: usize = 250;
