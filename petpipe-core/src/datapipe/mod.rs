//! Lazy pipeline stages
//!
//! Pull-based iterator adaptors over `Result` items: demultiplexing, key
//! joins, line parsing, sharding and shuffling.

pub mod entry;
pub mod demux;
pub mod zipper;
pub mod lines;
pub mod shard;

pub use entry::RawEntry;
pub use demux::{demux, DemuxChild, QueueDepth};
pub use zipper::KeyZipper;
pub use lines::{LineRecord, LineRecords};
pub use shard::{ShardSpec, ShardingFilter, ShuffleBuffer};
