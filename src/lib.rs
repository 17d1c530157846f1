// Library root: exposes the adapter, providers and channels to the binary
// (src/main.rs) and to integration tests.

pub mod chat;
pub mod comms;
pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod media;
