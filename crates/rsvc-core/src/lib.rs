//! # rsvc-core
//!
//! Core types and traits for the rsvc request dispatcher.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The dispatcher, worker threads, and parking primitives live in
//! `rsvc-dispatch`.
//!
//! ## Modules
//!
//! - `wire` - Common request header, service tags, status codes
//! - `buffer` - Reply payload buffer
//! - `rpc` - Transport-facing (`ServerRpc`) and service-facing (`Service`) contracts
//! - `state` - Worker state-cell values
//! - `error` - Error types
//! - `rlog` - Leveled stderr logging macros

pub mod wire;
pub mod buffer;
pub mod rpc;
pub mod state;
pub mod error;
pub mod rlog;

// Re-exports for convenience
pub use wire::{RpcHeader, Status, HEADER_LEN, MAX_SERVICE};
pub use buffer::Buffer;
pub use rpc::{ReplyNotify, ServerRpc, Service, ServiceRpc};
pub use state::WorkerState;
pub use error::{DispatchError, Result};
