//! Publish/subscribe bus client.
//!
//! The voice mesh only needs fire-and-forget publish plus pattern
//! subscriptions, so the [`Bus`] trait is synchronous. [`BusClient`] is the
//! WebSocket implementation talking to `pulse-relay`; it handles connect
//! timeouts, reconnect with backoff, re-subscription, and holds publishes
//! while offline. [`MemoryBus`] is an in-process hub used by tests and
//! single-process demos.

mod client;
mod connection;
mod handler;
mod memory;
mod types;

pub use client::BusClient;
pub use memory::{MemoryBus, MemoryBusClient};
pub use types::{Bus, BusClientConfig, BusEvent};
