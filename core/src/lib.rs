pub mod agents;
pub mod config;
pub mod embedding;
pub mod intent;
pub mod llm;
pub mod messages;
pub mod platform;
pub mod prompt;
pub mod registry;
