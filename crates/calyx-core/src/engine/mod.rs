//! Audio engine - stream lifecycle, signal sources, block queue
//!
//! This module contains the real-time core of the module firmware:
//! - SignalSource: the switchable generators behind the callback
//! - BlockQueue: lock-free handoff from the synthesis worker
//! - StreamStatus: lock-free counters shared with diagnostics
//! - AudioEngine: the stream lifecycle state machine

mod engine;
pub mod ring;
mod source;
mod status;

pub use engine::*;
pub use ring::{block_queue, BlockConsumer, BlockProducer, DEFAULT_QUEUE_BLOCKS};
pub use source::*;
pub use status::*;
