//! Application Layer
//!
//! This module contains:
//! - Bridge: lifecycle of one connection (dial → relay both ways → teardown)
//! - Runtime: configuration-driven listener and accept loop

mod bridge;
mod runtime;

pub use bridge::{
    Bridge, BridgeConfig, BridgeOutcome, RelaySummary, DEFAULT_GRACE_PERIOD,
    DEFAULT_IDLE_TIMEOUT,
};
pub use runtime::{Runtime, RuntimeConfig};
