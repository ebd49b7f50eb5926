//! sockbridge - bridge stream sockets across transport families
//!
//! Exposes a service listening on a Unix domain socket to TCP clients, or a
//! TCP service to local Unix socket clients.
//!
//! # Architecture
//!
//! ```text
//! Listener.accept()
//! → Bridge.serve()
//! → Dialer.dial()                (once per connection)
//! → copy_with_timeout × 2        (inbound → outbound, outbound → inbound)
//! → grace period → close both legs
//! ```
//!
//! ## Core Principles
//!
//! - Payload bytes are opaque
//! - Each direction owns its buffer and deadlines
//! - The first direction to finish tears the whole pair down, exactly once
//! - Configuration is passed in explicitly, never global
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Stream, Endpoint, Signal, relay loop
//! ├── transport/       # Transport layer: TCP, Unix, outbound Dialer
//! ├── app/             # Application: Bridge, Runtime (accept loop)
//! └── config.rs        # JSON / CLI configuration
//! ```

// Core types
pub mod common;
pub mod error;

// Layered architecture
pub mod transport;
pub mod app;

// Supporting modules
pub mod config;

// Re-exports for convenience
pub use common::{Address, Endpoint, Metadata, Network, Stream};
pub use error::{Error, Result};
pub use config::Config;

pub use app::{Bridge, BridgeConfig, BridgeOutcome, Runtime, RuntimeConfig};
pub use transport::{Dialer, DialerConfig, Transport};
