//! # rsvc-dispatch
//!
//! The request dispatch core: a single dispatch thread routes incoming
//! RPCs to registered services and drives a lazily-grown pool of worker
//! threads, keeping itself free to keep polling the network while
//! handlers run.
//!
//! This crate provides:
//! - The dispatcher (service registry, per-service admission control,
//!   completion polling, shutdown draining)
//! - Worker threads and the lock-free handoff cell between them and the
//!   dispatch thread
//! - Kernel-assisted parking for workers idle beyond their poll budget
//! - An in-process `BindTransport` for exercising the whole stack without
//!   a network

pub mod config;
pub mod parking;
pub mod clock;
mod worker;
pub mod dispatch;
pub mod bind;

// Re-exports
pub use bind::{BindClientRpc, BindTransport, UnknownHost};
pub use clock::DispatchClock;
pub use config::{DispatchConfig, DEFAULT_POLL_BUDGET};
pub use dispatch::Dispatcher;
pub use parking::{new_park, ParkOutcome, StatePark};
