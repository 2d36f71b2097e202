//! Dataset configuration
//!
//! Split selection plus the optional sharding and shuffling hints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::datapipe::ShardSpec;
use crate::error::{PetError, Result};

/// Named subset of the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Trainval,
    Test,
    Train,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Trainval, Split::Test, Split::Train];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Trainval => "trainval",
            Split::Test => "test",
            Split::Train => "train",
        }
    }

    /// Name of the classification list holding this split, e.g. `test.txt`
    pub fn list_file(&self) -> String {
        format!("{}.txt", self.as_str())
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = PetError;

    fn from_str(s: &str) -> Result<Self> {
        Split::ALL
            .into_iter()
            .find(|split| split.as_str() == s)
            .ok_or_else(|| PetError::UnknownSplit { name: s.into() })
    }
}

/// Configuration for building a sample pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PetConfig {
    /// Which classification list to read
    pub split: Split,
    /// Keep only this worker's slice of the classification records
    pub shard: Option<ShardSpec>,
    /// Shuffle classification records with this seed
    pub shuffle_seed: Option<u64>,
    /// Shuffle buffer size (records)
    pub shuffle_buffer: usize,
}

impl Default for PetConfig {
    fn default() -> Self {
        Self {
            split: Split::Trainval,
            shard: None,
            shuffle_seed: None,
            shuffle_buffer: crate::DEFAULT_SHUFFLE_BUFFER,
        }
    }
}

impl PetConfig {
    /// Create a configuration for `split` with no sharding or shuffling
    pub fn new(split: Split) -> Self {
        Self {
            split,
            ..Default::default()
        }
    }

    /// Restrict to one worker's shard
    pub fn with_shard(mut self, worker_id: u32, num_workers: u32) -> Result<Self> {
        self.shard = Some(ShardSpec::new(worker_id, num_workers)?);
        Ok(self)
    }

    /// Enable seeded shuffling
    pub fn with_shuffle(mut self, seed: u64, buffer: usize) -> Self {
        self.shuffle_seed = Some(seed);
        self.shuffle_buffer = buffer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(shard) = &self.shard {
            shard.validate()?;
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| PetError::Internal {
            message: format!("Invalid pipeline config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PetError::Internal {
            message: format!("Config serialization failed: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_names() {
        for split in Split::ALL {
            assert_eq!(split.as_str().parse::<Split>().unwrap(), split);
        }
        assert_eq!(Split::Test.list_file(), "test.txt");
        assert!(matches!(
            "val".parse::<Split>(),
            Err(PetError::UnknownSplit { .. })
        ));
    }

    #[test]
    fn test_config_json() {
        let config = PetConfig::from_json(r#"{"split": "test", "shard": {"worker_id": 1, "num_workers": 2}}"#)
            .unwrap();
        assert_eq!(config.split, Split::Test);
        assert_eq!(config.shard, Some(ShardSpec { worker_id: 1, num_workers: 2 }));
        assert_eq!(config.shuffle_seed, None);

        let again = PetConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_config_rejects_bad_shard() {
        let err = PetConfig::from_json(r#"{"shard": {"worker_id": 2, "num_workers": 2}}"#).unwrap_err();
        assert!(matches!(err, PetError::InvalidShardSpec { .. }));
        assert!(PetConfig::default().with_shard(0, 0).is_err());
    }
}
