// Shared HTTP plumbing for source adapters.

mod client;
mod settings;
mod user_agent;

pub use client::{get_with_retry, HttpClientConfig};
pub use settings::NetworkSettings;
pub use user_agent::random_user_agent;
