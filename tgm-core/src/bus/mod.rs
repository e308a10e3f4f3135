//! Event plumbing between the two sides of the bridge
//!
//! Each direction gets its own bounded queue of cross events. A side reads
//! its inbound queue together with its own external source through a
//! [`FairMerge`], so neither side can block the other.

pub mod events;
pub mod merge;
pub mod queue;

pub use events::{ChatEvent, RequestId, VoiceEvent};
pub use merge::{FairMerge, Merged};
pub use queue::{BoundedDropQueue, QueueReader, QueueWriter, DEFAULT_QUEUE_CAPACITY};
