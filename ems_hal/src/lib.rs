//! # EMS HAL Library
//!
//! Hardware bridge layer with pluggable driver architecture.
//!
//! Bridges implement the `Bridge` trait defined in `ems_common::bridge`.
//!
//! # Module Structure
//!
//! - [`bridge_registry`] - Bridge factory registration
//! - [`handle`] - Bridge worker threads, bounded-timeout writes, read barrier
//! - [`drivers`] - Bridge implementations
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   write job (timeout)   ┌──────────────────────┐
//! │  Tick thread  │────────────────────────►│  bridge worker       │
//! │ (cycle worker)│◄────── ValueSlot ───────│  (one per bridge)    │
//! └───────┬───────┘   poll every interval   └──────────┬───────────┘
//!         │ ReadSync (grace window)                    │ Box<dyn Bridge>
//!         └────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod bridge_registry;
pub mod drivers;
pub mod handle;

pub use crate::bridge_registry::BridgeRegistry;
pub use crate::handle::{BridgeHandle, BridgeSet, PolledChannel, ReadSync};
