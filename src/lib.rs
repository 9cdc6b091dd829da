pub mod activity_log;
pub mod analytics;
pub mod api;
pub mod client;
pub mod config;
pub mod export;
pub mod generator;
pub mod insights;
pub mod llm;
pub mod plan;
pub mod prompt;
pub mod repair;
pub mod types;
