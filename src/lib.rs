//! CMS Studio: content backend and AI-assisted section authoring for a
//! marketing site.

pub mod attachment;
pub mod backup;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod sections;
pub mod server;
pub mod settings;
pub mod store;
pub mod summarize;
