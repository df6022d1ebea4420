use std::collections::HashMap;
use std::env;
use std::fmt;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::from_slice;

use crate::Error;
use crate::Result;

pub mod producer;

pub use producer::{BatchingConfig, CompressionType, HashingScheme, ProducerConfig, RoutingMode};

const ENV_SINK_OBJ: &str = "SINKFLOW_SINK_OBJECT";
const DEFAULT_TENANT: &str = "public";
const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_INSTANCE_ID: &str = "0";

/// Producer property keys the sink always sets.
const PROPERTY_APPLICATION: &str = "application";
const PROPERTY_ID: &str = "id";
const PROPERTY_INSTANCE_ID: &str = "instance_id";
const APPLICATION_NAME: &str = "sinkflow";

/// The delivery/ack contract of a sink. Fixed for the lifetime of a [crate::Sink].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessingGuarantee {
    /// Fire and forget. The record is acked as soon as the publish is issued.
    AtMostOnce,
    /// The record is acked once the broker confirms the publish and failed otherwise.
    #[default]
    AtLeastOnce,
    /// Like at-least-once, with named producers and sequence ids so retransmissions are dropped.
    EffectivelyOnce,
}

impl TryFrom<&str> for ProcessingGuarantee {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.to_uppercase().replace(['_', '-'], "").as_str() {
            "ATMOSTONCE" => Ok(ProcessingGuarantee::AtMostOnce),
            "ATLEASTONCE" => Ok(ProcessingGuarantee::AtLeastOnce),
            "EFFECTIVELYONCE" => Ok(ProcessingGuarantee::EffectivelyOnce),
            _ => Err(Error::Config(format!(
                "Unsupported processing guarantee: {value}"
            ))),
        }
    }
}

impl fmt::Display for ProcessingGuarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingGuarantee::AtMostOnce => write!(f, "ATMOST_ONCE"),
            ProcessingGuarantee::AtLeastOnce => write!(f, "ATLEAST_ONCE"),
            ProcessingGuarantee::EffectivelyOnce => write!(f, "EFFECTIVELY_ONCE"),
        }
    }
}

/// JSON form of the sink configuration, as delivered in [ENV_SINK_OBJ].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SinkSpec {
    pub processing_guarantee: Option<String>,
    pub topic: Option<String>,
    pub tenant: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub instance_id: Option<String>,
    pub output_type: Option<String>,
    pub output_serde: Option<String>,
    pub producer: Option<producer::ProducerSpec>,
}

/// Immutable sink configuration, read once at open.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub processing_guarantee: ProcessingGuarantee,
    /// Default output topic, used when a record carries no topic of its own.
    pub topic: Option<String>,
    /// Fully qualified function name, `tenant/namespace/name`.
    pub fqfn: String,
    pub instance_id: String,
    /// Declared type of the values written to the sink.
    pub output_type: String,
    /// Name of the serde used for the values. Empty selects the default serde.
    pub output_serde: String,
    pub producer: ProducerConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            processing_guarantee: ProcessingGuarantee::default(),
            topic: None,
            fqfn: format!("{DEFAULT_TENANT}/{DEFAULT_NAMESPACE}/sink"),
            instance_id: DEFAULT_INSTANCE_ID.to_string(),
            output_type: "bytes".to_string(),
            output_serde: String::new(),
            producer: ProducerConfig::default(),
        }
    }
}

impl SinkConfig {
    /// Loads the configuration from the base64 encoded JSON object in [ENV_SINK_OBJ].
    pub fn from_env() -> Result<Self> {
        let sink_obj = env::var(ENV_SINK_OBJ)
            .map_err(|e| Error::Config(format!("{ENV_SINK_OBJ} is not set: {e:?}")))?;
        Self::load(sink_obj)
    }

    /// Decodes a base64 encoded JSON [SinkSpec].
    pub fn load(sink_spec_obj: String) -> Result<Self> {
        let decoded_spec = BASE64_STANDARD
            .decode(sink_spec_obj.as_bytes())
            .map_err(|e| Error::Config(format!("Failed to decode sink spec: {e:?}")))?;

        let spec: SinkSpec = from_slice(&decoded_spec)
            .map_err(|e| Error::Config(format!("Failed to parse sink spec: {e:?}")))?;

        SinkConfig::try_from(spec)
    }

    /// Properties attached to every producer. The sink's identity properties override
    /// user supplied ones with the same key.
    pub(crate) fn producer_properties(&self) -> HashMap<String, String> {
        let mut properties = self.producer.properties.clone();
        properties.insert(
            PROPERTY_APPLICATION.to_string(),
            APPLICATION_NAME.to_string(),
        );
        properties.insert(PROPERTY_ID.to_string(), self.fqfn.clone());
        properties.insert(PROPERTY_INSTANCE_ID.to_string(), self.instance_id.clone());
        properties
    }
}

impl TryFrom<SinkSpec> for SinkConfig {
    type Error = Error;

    fn try_from(spec: SinkSpec) -> Result<Self> {
        let defaults = SinkConfig::default();

        let processing_guarantee = spec
            .processing_guarantee
            .as_deref()
            .map(ProcessingGuarantee::try_from)
            .transpose()?
            .unwrap_or_default();

        let name = spec
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Config("Sink name is required".to_string()))?;
        let fqfn = format!(
            "{}/{}/{}",
            spec.tenant.as_deref().unwrap_or(DEFAULT_TENANT),
            spec.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
            name
        );

        let producer = spec
            .producer
            .map(ProducerConfig::try_from)
            .transpose()?
            .unwrap_or_default();

        Ok(SinkConfig {
            processing_guarantee,
            topic: spec.topic.filter(|t| !t.is_empty()),
            fqfn,
            instance_id: spec.instance_id.unwrap_or(defaults.instance_id),
            output_type: spec.output_type.unwrap_or(defaults.output_type),
            output_serde: spec.output_serde.unwrap_or(defaults.output_serde),
            producer,
        })
    }
}
