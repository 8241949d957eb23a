pub mod agent;
pub mod config;
pub mod crm;
pub mod email;
pub mod error;
pub mod prompt;
pub mod store;

pub type HttpClient = reqwest::Client;
