//! # EMS Core
//!
//! Cycle-based process image and channel write-arbitration engine for an
//! edge energy-management runtime.
//!
//! ## Tick
//!
//! One tick is `IDLE → READ → EXECUTE → RESOLVE_WRITES → HARDWARE_WRITE →
//! SWAP → IDLE`, driven by a single thread ([`cycle::CycleWorker`]). Every
//! component sees the same frozen snapshot of `current` values; conflicting
//! write demands on one channel are reduced to one value per tick by
//! [`arbitration::resolve`].
//!
//! ## Modules
//!
//! - [`process_image`] - current/next double buffer and request queues
//! - [`arbitration`] - write-constraint resolver
//! - [`component`] - component contract and tick context
//! - [`registry`] - dependency-ordered component registry
//! - [`cycle`] - tick state machine, timing, failure isolation
//! - [`components`] - built-in components and their factory
//! - [`runtime`] - startup wiring from configuration

pub mod arbitration;
pub mod component;
pub mod components;
pub mod cycle;
pub mod process_image;
pub mod registry;
pub mod runtime;
