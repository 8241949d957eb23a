pub mod api_quota;
pub mod auth;
pub mod client;
pub mod inbound_message;
pub mod intake;
pub mod outbound;
