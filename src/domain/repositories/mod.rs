pub mod account_registry;
pub mod provider_client;
