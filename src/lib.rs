//! Session-scoped caching and event-driven invalidation for the flashcard
//! study service.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
