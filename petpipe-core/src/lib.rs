//! PetPipe Core - Oxford-IIIT Pet sample pipeline
//!
//! This crate provides:
//! - Lazy pipeline stages (demultiplex, key join, sharding, shuffling)
//! - Resource download, verification and extraction
//! - The Oxford-IIIT Pet sample definition (classification, trimaps, images)

pub mod datapipe;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod resource;

pub use dataset::{OxfordPet, PetConfig, Sample, Split};
pub use error::{PetError, Result};

/// Default shuffle buffer size (records)
pub const DEFAULT_SHUFFLE_BUFFER: usize = 1000;
