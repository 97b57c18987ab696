//! Transparent Wyoming STT relay that rewrites transcripts using
//! hot-reloadable phrase rules.

pub mod config;
pub mod core;
pub mod error;
pub mod handler;
pub mod logger;
pub mod rules;
pub mod server_runner;
