pub mod analytics;
pub mod auth;
pub mod config;
pub mod dataset;
pub mod dossier;
pub mod search;
pub mod server;
