//! gdnotify - bridges Google Drive change notifications to an
//! EventBridge-style event bus.
//!
//! The system owns a fleet of notification channels (bounded-lifetime
//! subscriptions, one per drive scope), rotates them before expiry, pulls
//! incremental change lists with a durable monotonic page token on each
//! poke, and forwards the changes as structured events - optionally copying
//! the changed file object into S3 under a rule-based policy first.

pub mod aws;
pub mod config;
pub mod copier;
pub mod emitter;
pub mod events;
pub mod expr;
pub mod manager;
pub mod pipeline;
pub mod puller;
pub mod server;
pub mod store;
pub mod types;
pub mod upstream;
