use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;

/// Opaque key, value or header payload carried by a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

/// One entry of a change event's ordered header list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    #[serde(default)]
    pub value: Option<Payload>,
}

/// One captured change, as handed over by the upstream engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Internal source identifier, e.g. `inventory.customers`.
    pub destination: String,
    #[serde(default)]
    pub key: Option<Payload>,
    #[serde(default)]
    pub value: Option<Payload>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Binary(b) => &b[..],
        }
    }

    /// Binary payloads are decoded as UTF-8, replacing invalid sequences.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(s) => Cow::Borrowed(s.as_str()),
            Payload::Binary(b) => String::from_utf8_lossy(b),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(b))
    }
}

// On the wire text is a plain JSON string and binary is `{"base64": "..."}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PayloadRepr {
    Text(String),
    Binary { base64: String },
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            Payload::Text(s) => PayloadRepr::Text(s.clone()),
            Payload::Binary(b) => PayloadRepr::Binary {
                base64: STANDARD.encode(b),
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match PayloadRepr::deserialize(deserializer)? {
            PayloadRepr::Text(s) => Ok(Payload::Text(s)),
            PayloadRepr::Binary { base64 } => STANDARD
                .decode(base64.as_bytes())
                .map(Payload::from)
                .map_err(serde::de::Error::custom),
        }
    }
}

impl ChangeEvent {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            key: None,
            value: None,
            headers: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Payload>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Payload>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.headers.push(Header {
            key: key.into(),
            value: Some(value.into()),
        });
        self
    }
}
