//! Device bridge for punt
//!
//! This crate runs the external commands that answer "which pid belongs to
//! this package" and "how much memory is this pid using".

mod bridge;
mod proc_status;

pub use bridge::{AdbBridge, BridgeError, DeviceBridge};
pub use proc_status::parse_proc_status;

// Re-export types used in our public API
pub use punt_types::ResourceSample;
