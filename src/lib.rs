//! # sensorkv
//!
//! A replicated in-memory store for sensor telemetry with:
//! - Round-robin routing over interchangeable receivers
//! - Last-write-wins conflict resolution with a writer-clock tie break
//! - Version vectors for causality tracking and conflict detection
//! - Periodic pairwise sync, snapshots and recovery scans
//! - Self-healing: restart, replace from a backup pool, running floor
//!
//! ## Architecture
//!
//! ```text
//!            adapters (UDP, MQTT, ...)
//!                      │ SensorMessage
//! ┌────────────────────▼────────────────────┐
//! │               Coordinator               │
//! │  sensor registry · round robin · events │
//! └───────────┬─────────────────────────────┘
//!             │ process_message
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌──▼───────────┐
//! │ Receiver 1 │   │ Receiver 2 │   │ Receiver 3   │
//! │ records+VV │◄─►│ records+VV │◄─►│ records+VV   │
//! └────────────┘   └────────────┘   └──────────────┘
//!        ▲ sync / backup / recovery     ▲ health / replace / floor
//!   ReplicationManager            FaultToleranceManager
//! ```
//!
//! ## Usage
//!
//! ### Start a node
//! ```bash
//! sensorkv-node serve --config ./sensorkv.toml --sync-interval 2s
//! ```
//!
//! ### Embed
//! ```no_run
//! use sensorkv::{common::SensorMessage, Config, SensorNode};
//!
//! # async fn run() -> sensorkv::Result<()> {
//! let node = SensorNode::from_config(&Config::default())?;
//! node.start();
//! node.coordinator()
//!     .route(&SensorMessage::data("T1", "temperature", 21.5, 1, 1), "10.0.0.7", 5683);
//! node.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod coordinator;
pub mod node;
pub mod ops;
pub mod receiver;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use node::SensorNode;
pub use ops::{FaultToleranceManager, ReplicationManager};
pub use receiver::DataReceiver;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
