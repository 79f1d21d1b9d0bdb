//! EMS Common Library
//!
//! Shared building blocks for all EMS edge workspace crates.
//!
//! # Module Structure
//!
//! - [`channel`] - Channel identity, static description, tagged values
//! - [`bridge`] - Hardware bridge trait consumed by the cycle worker
//! - [`config`] - Configuration loading traits and the edge startup config
//! - [`error`] - Error taxonomy
//! - [`consts`] - Default timings and reserved names
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ems_common::prelude::*;
//!
//! let id: ChannelId = "ess0/SetActivePower".parse().unwrap();
//! assert_eq!(id.component(), "ess0");
//! ```

pub mod bridge;
pub mod channel;
pub mod config;
pub mod consts;
pub mod error;
pub mod prelude;
