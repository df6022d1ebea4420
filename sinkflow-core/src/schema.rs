//! Start-up check that the declared output type of the sink can be written with the
//! configured serde.

use std::collections::HashMap;
use std::fmt;

use crate::Error;
use crate::Result;

const DEFAULT_SERDE: &str = "default";

/// Declared type of the values a sink writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputType {
    /// The sink writes no values of its own.
    Void,
    String,
    Bytes,
    Bool,
    I32,
    I64,
    F32,
    F64,
    /// A user defined type, only writable through a registered serde.
    Custom(String),
}

impl OutputType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "void" => OutputType::Void,
            "string" | "str" => OutputType::String,
            "bytes" | "byte[]" => OutputType::Bytes,
            "bool" | "boolean" => OutputType::Bool,
            "i32" | "int" | "integer" => OutputType::I32,
            "i64" | "long" => OutputType::I64,
            "f32" | "float" => OutputType::F32,
            "f64" | "double" => OutputType::F64,
            _ => OutputType::Custom(value.trim().to_string()),
        }
    }

    fn is_primitive(&self) -> bool {
        !matches!(self, OutputType::Void | OutputType::Custom(_))
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputType::Void => write!(f, "void"),
            OutputType::String => write!(f, "string"),
            OutputType::Bytes => write!(f, "bytes"),
            OutputType::Bool => write!(f, "bool"),
            OutputType::I32 => write!(f, "i32"),
            OutputType::I64 => write!(f, "i64"),
            OutputType::F32 => write!(f, "f32"),
            OutputType::F64 => write!(f, "f64"),
            OutputType::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Known serdes and the type each of them writes.
#[derive(Debug, Clone, Default)]
pub struct SerdeRegistry {
    serdes: HashMap<String, OutputType>,
}

impl SerdeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, serde_name: impl Into<String>, output_type: OutputType) -> Self {
        self.serdes.insert(serde_name.into(), output_type);
        self
    }

    fn get(&self, serde_name: &str) -> Option<&OutputType> {
        self.serdes.get(serde_name)
    }
}

/// The validated output schema of a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub output_type: OutputType,
    /// `None` for the default serde.
    pub serde: Option<String>,
}

/// Validates that `output_type` is writable with `output_serde`.
pub fn initialize(
    output_type: &str,
    output_serde: &str,
    registry: &SerdeRegistry,
) -> Result<Schema> {
    let output_type = OutputType::parse(output_type);

    if output_serde.is_empty() || output_serde == DEFAULT_SERDE {
        if output_type == OutputType::Void || output_type.is_primitive() {
            return Ok(Schema {
                output_type,
                serde: None,
            });
        }
        return Err(Error::Config(format!(
            "Default serde cannot write type {output_type}. Configure a serde for it"
        )));
    }

    let Some(serde_type) = registry.get(output_serde) else {
        return Err(Error::Config(format!("Unknown serde: {output_serde}")));
    };

    if output_type != OutputType::Void && *serde_type != output_type {
        return Err(Error::Config(format!(
            "Inconsistent types found between function output type and serde type: \
             function type = {output_type}, serde type = {serde_type}"
        )));
    }

    Ok(Schema {
        output_type,
        serde: Some(output_serde.to_string()),
    })
}
