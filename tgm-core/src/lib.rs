//! Core types for tgm
//!
//! This crate provides the dual-source event bridge: the lossy hand-off
//! queue, the fair merge of two event streams, the per-side reactive
//! controller and the bridge that wires two sides together. Configuration
//! and logging shared by the other tgm crates live here as well.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod side;

pub use bridge::Bridge;
pub use bus::{BoundedDropQueue, FairMerge, Merged, QueueReader, QueueWriter};
pub use error::{Error, Result};
pub use side::{SideController, SideHandler, SideState};
