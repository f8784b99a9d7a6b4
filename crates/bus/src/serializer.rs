use crate::error::SerializerError;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Wire format for message bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// JSON via `serde_json`.
    #[default]
    Json,

    /// CBOR via `ciborium`.
    Cbor,
}

impl SerializationFormat {
    /// MIME type stamped on envelopes.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Cbor => "application/cbor",
        }
    }
}

/// Serializer configuration, fixed at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Wire format.
    pub format: SerializationFormat,
}

/// Converts messages to and from opaque byte payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageSerializer {
    config: SerializerConfig,
}

impl MessageSerializer {
    /// Creates a serializer with the given configuration.
    #[must_use]
    pub const fn new(config: SerializerConfig) -> Self {
        Self { config }
    }

    /// The serializer's configuration.
    #[must_use]
    pub const fn config(&self) -> SerializerConfig {
        self.config
    }

    /// MIME type of the payloads this serializer produces.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        self.config.format.content_type()
    }

    /// Serializes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in the wire format.
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Bytes, SerializerError> {
        match self.config.format {
            SerializationFormat::Json => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| SerializerError::Serialize(e.to_string())),
            SerializationFormat::Cbor => {
                let mut payload = Vec::new();
                ciborium::ser::into_writer(value, &mut payload)
                    .map_err(|e| SerializerError::Serialize(e.to_string()))?;
                Ok(Bytes::from(payload))
            }
        }
    }

    /// Deserializes a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, SerializerError> {
        match self.config.format {
            SerializationFormat::Json => serde_json::from_slice(payload)
                .map_err(|e| SerializerError::Deserialize(e.to_string())),
            SerializationFormat::Cbor => ciborium::de::from_reader(payload)
                .map_err(|e| SerializerError::Deserialize(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    // Fields are private and only readable through accessors.
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: String,
        lines: Vec<(String, u32)>,
        note: Option<String>,
    }

    impl OrderPlaced {
        fn new(order_id: &str) -> Self {
            Self {
                order_id: order_id.to_string(),
                lines: vec![("beer".to_string(), 6), ("crisps".to_string(), 2)],
                note: None,
            }
        }

        fn order_id(&self) -> &str {
            &self.order_id
        }
    }

    #[test]
    fn test_json_round_trip() {
        let serializer = MessageSerializer::default();
        let order = OrderPlaced::new("X-1");

        let payload = serializer.serialize(&order).unwrap();
        let decoded: OrderPlaced = serializer.deserialize(&payload).unwrap();

        assert_eq!(decoded, order);
        assert_eq!(decoded.order_id(), "X-1");
        assert_eq!(serializer.content_type(), "application/json");
    }

    #[test]
    fn test_cbor_round_trip() {
        let serializer = MessageSerializer::new(SerializerConfig {
            format: SerializationFormat::Cbor,
        });
        let order = OrderPlaced::new("X-2");

        let payload = serializer.serialize(&order).unwrap();
        let decoded: OrderPlaced = serializer.deserialize(&payload).unwrap();

        assert_eq!(decoded, order);
        assert_eq!(serializer.content_type(), "application/cbor");
    }

    #[test]
    fn test_malformed_payload_fails() {
        let serializer = MessageSerializer::default();

        assert_matches!(
            serializer.deserialize::<OrderPlaced>(b"{\"order_id\": 12"),
            Err(SerializerError::Deserialize(_))
        );
        assert_matches!(
            serializer.deserialize::<OrderPlaced>(b"{}"),
            Err(SerializerError::Deserialize(_))
        );
    }

    #[test]
    fn test_config_from_json() {
        let config: SerializerConfig = serde_json::from_str(r#"{"format":"cbor"}"#).unwrap();

        assert_eq!(config.format, SerializationFormat::Cbor);
        assert_eq!(
            serde_json::from_str::<SerializerConfig>("{}").unwrap(),
            SerializerConfig::default()
        );
    }
}
