pub mod agenda;
pub mod config;
pub mod fetch;
pub mod provider;
