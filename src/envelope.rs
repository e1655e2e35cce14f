//! The protocol envelope: the JSON document exchanged on the wire.

use crate::headers::Headers;
use crate::topic::Topic;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

fn headers_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Headers, D::Error> {
    Ok(Option::<Headers>::deserialize(deserializer)?.unwrap_or_default())
}

/// A protocol envelope.
///
/// `value` carries whatever `path` addresses (a whole thing, a feature, a
/// single property value, a message payload...). No consistency between the
/// two is checked here.
///
/// # Example
///
/// ```
/// use ditto_rs::{Envelope, Topic};
/// use serde_json::json;
///
/// let topic = Topic::parse("ns/thing1/things/twin/events/modified")?;
/// let envelope = Envelope::new()
///     .with_topic(topic)
///     .with_path("/attributes/location")
///     .with_value(json!("kitchen"))
///     .with_revision(7);
///
/// let wire = serde_json::to_value(&envelope)?;
/// assert_eq!(wire["topic"], "ns/thing1/things/twin/events/modified");
/// assert!(wire.get("status").is_none());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The topic.
    pub topic: Topic,
    /// The headers (empty when none were attached or sent as `null`).
    #[serde(default, deserialize_with = "headers_or_empty")]
    pub headers: Headers,
    /// JSON-pointer-like path addressing part of the entity.
    #[serde(default)]
    pub path: String,
    /// The payload addressed by `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Field selector.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fields: String,
    /// Extra data enriched by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    /// Status code for responses.
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub status: i32,
    /// Entity revision.
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub revision: i64,
    /// Modification timestamp.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
}

impl Envelope {
    /// Creates an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the topic.
    #[must_use]
    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }

    /// Sets the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the field selector.
    #[must_use]
    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = fields.into();
        self
    }

    /// Sets the extra data.
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<Value>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    /// Sets the revision.
    #[must_use]
    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }
}
