//! Producer tuning passed through unchanged to every producer the sink creates.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::Result;

const DEFAULT_BATCHING_MAX_PUBLISH_DELAY_MILLIS: u64 = 10;
const DEFAULT_BATCHING_MAX_MESSAGES: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchingConfig {
    pub max_publish_delay: Duration,
    pub max_messages: u32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        BatchingConfig {
            max_publish_delay: Duration::from_millis(DEFAULT_BATCHING_MAX_PUBLISH_DELAY_MILLIS),
            max_messages: DEFAULT_BATCHING_MAX_MESSAGES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionType {
    None,
    #[default]
    Lz4,
    Zlib,
    Zstd,
    Snappy,
}

impl TryFrom<&str> for CompressionType {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "none" => Ok(CompressionType::None),
            "lz4" => Ok(CompressionType::Lz4),
            "zlib" => Ok(CompressionType::Zlib),
            "zstd" => Ok(CompressionType::Zstd),
            "snappy" => Ok(CompressionType::Snappy),
            other => Err(Error::Config(format!(
                "Unsupported compression type: {other}"
            ))),
        }
    }
}

/// How a key is hashed to pick the partition of a partitioned topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashingScheme {
    JavaStringHash,
    #[default]
    Murmur3_32Hash,
}

impl TryFrom<&str> for HashingScheme {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.to_lowercase().replace(['_', '-'], "").as_str() {
            "javastringhash" => Ok(HashingScheme::JavaStringHash),
            "murmur332hash" => Ok(HashingScheme::Murmur3_32Hash),
            other => Err(Error::Config(format!("Unsupported hashing scheme: {other}"))),
        }
    }
}

/// How messages are spread over the partitions of a partitioned topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingMode {
    RoundRobinPartition,
    SinglePartition,
    /// Keyed messages go to the partition their key hashes to, unkeyed ones round-robin.
    #[default]
    CustomPartition,
}

impl TryFrom<&str> for RoutingMode {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.to_lowercase().replace(['_', '-'], "").as_str() {
            "roundrobinpartition" => Ok(RoutingMode::RoundRobinPartition),
            "singlepartition" => Ok(RoutingMode::SinglePartition),
            "custompartition" => Ok(RoutingMode::CustomPartition),
            other => Err(Error::Config(format!("Unsupported routing mode: {other}"))),
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::RoundRobinPartition => write!(f, "RoundRobinPartition"),
            RoutingMode::SinglePartition => write!(f, "SinglePartition"),
            RoutingMode::CustomPartition => write!(f, "CustomPartition"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    /// `None` disables batching.
    pub batching: Option<BatchingConfig>,
    pub compression: CompressionType,
    pub hashing_scheme: HashingScheme,
    pub routing_mode: RoutingMode,
    pub block_if_queue_full: bool,
    /// Extra producer properties. The sink's own identity properties take precedence.
    pub properties: HashMap<String, String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            batching: Some(BatchingConfig::default()),
            compression: CompressionType::default(),
            hashing_scheme: HashingScheme::default(),
            routing_mode: RoutingMode::default(),
            block_if_queue_full: true,
            properties: HashMap::new(),
        }
    }
}

/// Wire form of [ProducerConfig]. Every field is optional and falls back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProducerSpec {
    pub batching_enabled: Option<bool>,
    pub batching_max_publish_delay_ms: Option<u64>,
    pub batching_max_messages: Option<u32>,
    pub compression_type: Option<String>,
    pub hashing_scheme: Option<String>,
    pub message_routing_mode: Option<String>,
    pub block_if_queue_full: Option<bool>,
    pub properties: HashMap<String, String>,
}

impl TryFrom<ProducerSpec> for ProducerConfig {
    type Error = Error;

    fn try_from(spec: ProducerSpec) -> Result<Self> {
        let defaults = ProducerConfig::default();

        let batching = if spec.batching_enabled.unwrap_or(true) {
            let mut batching = BatchingConfig::default();
            if let Some(delay) = spec.batching_max_publish_delay_ms {
                batching.max_publish_delay = Duration::from_millis(delay);
            }
            if let Some(max_messages) = spec.batching_max_messages {
                if max_messages == 0 {
                    return Err(Error::Config(
                        "batchingMaxMessages must be greater than 0".to_string(),
                    ));
                }
                batching.max_messages = max_messages;
            }
            Some(batching)
        } else {
            None
        };

        Ok(ProducerConfig {
            batching,
            compression: spec
                .compression_type
                .as_deref()
                .map(CompressionType::try_from)
                .transpose()?
                .unwrap_or(defaults.compression),
            hashing_scheme: spec
                .hashing_scheme
                .as_deref()
                .map(HashingScheme::try_from)
                .transpose()?
                .unwrap_or(defaults.hashing_scheme),
            routing_mode: spec
                .message_routing_mode
                .as_deref()
                .map(RoutingMode::try_from)
                .transpose()?
                .unwrap_or(defaults.routing_mode),
            block_if_queue_full: spec
                .block_if_queue_full
                .unwrap_or(defaults.block_if_queue_full),
            properties: spec.properties,
        })
    }
}
