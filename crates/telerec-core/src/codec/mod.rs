//! Value codecs
//!
//! Maps a data-type name to the functions that turn a [`Value`] into payload
//! bytes and back. The recording format treats payloads as opaque: the only
//! way to know how long a payload is, is to ask its codec.

mod adapters;

pub use adapters::{
    BooleanArrayCodec, BooleanCodec, NumberArrayCodec, NumberCodec, RawCodec, StringArrayCodec,
    StringCodec,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{RecordingError, Result};

/// Names of the built-in data types
pub mod types {
    /// 64-bit floating point number
    pub const NUMBER: &str = "Number";
    /// Single boolean
    pub const BOOLEAN: &str = "Boolean";
    /// UTF-8 string
    pub const STRING: &str = "String";
    /// Array of numbers
    pub const NUMBER_ARRAY: &str = "NumberArray";
    /// Array of booleans
    pub const BOOLEAN_ARRAY: &str = "BooleanArray";
    /// Array of strings
    pub const STRING_ARRAY: &str = "StringArray";
    /// Opaque byte blob
    pub const RAW: &str = "Raw";
}

/// A recorded telemetry value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric value
    Number(f64),
    /// Boolean value
    Boolean(bool),
    /// String value
    String(String),
    /// Array of numbers
    NumberArray(Vec<f64>),
    /// Array of booleans
    BooleanArray(Vec<bool>),
    /// Array of strings
    StringArray(Vec<String>),
    /// Raw bytes, interpreted only by a user-supplied codec
    Raw(Vec<u8>),
}

impl Value {
    /// Name of the built-in data type that can encode this value
    pub fn default_data_type(&self) -> &'static str {
        match self {
            Value::Number(_) => types::NUMBER,
            Value::Boolean(_) => types::BOOLEAN,
            Value::String(_) => types::STRING,
            Value::NumberArray(_) => types::NUMBER_ARRAY,
            Value::BooleanArray(_) => types::BOOLEAN_ARRAY,
            Value::StringArray(_) => types::STRING_ARRAY,
            Value::Raw(_) => types::RAW,
        }
    }

    /// Get as number, returning None if not a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as bool, returning None if not a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the variant, used in mismatch errors
    pub(crate) fn kind(&self) -> &'static str {
        self.default_data_type()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, "]")
        }

        match self {
            Value::Number(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::NumberArray(v) => list(f, v),
            Value::BooleanArray(v) => list(f, v),
            Value::StringArray(v) => list(f, v),
            Value::Raw(v) => {
                for b in v {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Errors raised by an individual codec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("expected a {expected} value, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("payload truncated: needed {needed} bytes at offset {offset}, buffer has {len}")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("payload string is not valid UTF-8")]
    InvalidUtf8,
}

/// Encodes and decodes the payload of one data type
pub trait Codec: Send + Sync {
    /// Data-type name this codec handles
    fn data_type(&self) -> &str;

    /// Encode a value into its payload bytes
    fn encode(&self, value: &Value) -> std::result::Result<Vec<u8>, CodecError>;

    /// Decode a value whose payload starts at `offset` in `buffer`
    fn decode(&self, buffer: &[u8], offset: usize) -> std::result::Result<Value, CodecError>;

    /// Number of payload bytes `value` occupies when encoded
    fn serialized_size(&self, value: &Value) -> usize;
}

/// Registry of codecs keyed by data-type name
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Create a registry with no codecs at all
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Create a registry with every built-in codec registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(NumberCodec);
        registry.register(BooleanCodec);
        registry.register(StringCodec);
        registry.register(NumberArrayCodec);
        registry.register(BooleanArrayCodec);
        registry.register(StringArrayCodec);
        registry.register(RawCodec);
        registry
    }

    /// Register a codec, replacing any codec already registered for its data type
    pub fn register<C: Codec + 'static>(&mut self, codec: C) {
        self.register_arc(Arc::new(codec));
    }

    /// Register a shared codec
    pub fn register_arc(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.data_type().to_string(), codec);
    }

    /// Look up the codec for a data type
    pub fn get(&self, data_type: &str) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(data_type)
    }

    /// Look up the codec for a data type, failing with `MissingCodec`
    pub fn require(&self, data_type: &str) -> Result<&Arc<dyn Codec>> {
        self.get(data_type)
            .ok_or_else(|| RecordingError::MissingCodec(data_type.to_string()))
    }

    /// Check whether a codec is registered for a data type
    pub fn contains(&self, data_type: &str) -> bool {
        self.codecs.contains_key(data_type)
    }

    /// Registered data-type names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Encode a value with the codec for `data_type`
    pub fn encode(&self, data_type: &str, value: &Value) -> Result<Vec<u8>> {
        self.require(data_type)?
            .encode(value)
            .map_err(|source| RecordingError::Codec {
                data_type: data_type.to_string(),
                source,
            })
    }

    /// Decode a value with the codec for `data_type`, returning it with its payload length
    pub fn decode(&self, data_type: &str, buffer: &[u8], offset: usize) -> Result<(Value, usize)> {
        let codec = self.require(data_type)?;
        let value = codec
            .decode(buffer, offset)
            .map_err(|source| RecordingError::Codec {
                data_type: data_type.to_string(),
                source,
            })?;
        let size = codec.serialized_size(&value);
        Ok((value, size))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.names())
            .finish()
    }
}
