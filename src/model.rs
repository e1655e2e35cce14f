//! Identifier and domain model types for things.
//!
//! Identifiers use compact colon-delimited string forms:
//! - `NamespacedId`: `{namespace}:{name}` (the name may itself contain colons)
//! - `DefinitionId`: `{namespace}:{name}:{version}`

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static DEFINITION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-]+)$")
        .expect("definition id pattern is valid")
});

/// Returns true if `segment` can appear as a namespace or entity name on the
/// wire: non-empty, no control characters and no `/`. Namespaces additionally
/// must not contain `:`.
pub(crate) fn is_safe_segment(segment: &str, is_namespace: bool) -> bool {
    !segment.is_empty()
        && !segment
            .chars()
            .any(|c| c.is_control() || c == '/' || (is_namespace && c == ':'))
}

/// A namespaced identifier such as `org.example:my-thing`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedId {
    /// The namespace (text up to the first colon).
    pub namespace: String,
    /// The name (everything after the first colon).
    pub name: String,
}

impl NamespacedId {
    /// Creates a namespaced ID, returning `None` if either part is not a safe
    /// identifier segment.
    ///
    /// ```
    /// use ditto_rs::NamespacedId;
    ///
    /// let id = NamespacedId::new("org.example", "sensor:1").unwrap();
    /// assert_eq!(id.to_string(), "org.example:sensor:1");
    /// assert!(NamespacedId::new("bad:ns", "name").is_none());
    /// ```
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Option<Self> {
        let id = Self {
            namespace: namespace.into(),
            name: name.into(),
        };
        id.is_valid().then_some(id)
    }

    /// Parses `namespace:name`. Empty or malformed input yields `None`.
    pub fn parse(id: &str) -> Option<Self> {
        let (namespace, name) = id.split_once(':')?;
        Self::new(namespace, name)
    }

    /// Replaces the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replaces the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn is_valid(&self) -> bool {
        is_safe_segment(&self.namespace, true) && is_safe_segment(&self.name, false)
    }
}

impl std::fmt::Display for NamespacedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for NamespacedId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidNamespacedId(s.to_string()))
    }
}

impl Serialize for NamespacedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NamespacedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A definition identifier such as `org.example:thermometer:1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinitionId {
    /// The namespace segment.
    pub namespace: String,
    /// The name segment.
    pub name: String,
    /// The version segment.
    pub version: String,
}

impl DefinitionId {
    /// Creates a definition ID, returning `None` unless every segment matches
    /// `[A-Za-z0-9_.-]+`.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Option<Self> {
        let id = Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        };
        DEFINITION_ID.is_match(&id.to_string()).then_some(id)
    }

    /// Parses `namespace:name:version`.
    ///
    /// ```
    /// use ditto_rs::DefinitionId;
    ///
    /// let id = DefinitionId::parse("org.example:thermometer:1.0.0").unwrap();
    /// assert_eq!(id.version, "1.0.0");
    /// assert!(DefinitionId::parse("org.example:thermometer").is_none());
    /// ```
    pub fn parse(id: &str) -> Option<Self> {
        let captures = DEFINITION_ID.captures(id)?;
        Some(Self {
            namespace: captures[1].to_string(),
            name: captures[2].to_string(),
            version: captures[3].to_string(),
        })
    }

    /// Replaces the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replaces the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.name, self.version)
    }
}

impl std::str::FromStr for DefinitionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidDefinitionId(s.to_string()))
    }
}

impl Serialize for DefinitionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let text = self.to_string();
        if !DEFINITION_ID.is_match(&text) {
            return Err(serde::ser::Error::custom(Error::InvalidDefinitionId(text)));
        }
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for DefinitionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A feature of a thing: definitions plus reported and desired properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// The definitions this feature conforms to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Vec<DefinitionId>>,
    /// Reported properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    /// Desired properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_properties: Option<Map<String, Value>>,
}

impl Feature {
    /// Creates an empty feature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a definition.
    #[must_use]
    pub fn with_definition(mut self, definition: DefinitionId) -> Self {
        self.definition.get_or_insert_with(Vec::new).push(definition);
        self
    }

    /// Sets a single reported property.
    #[must_use]
    pub fn with_property(mut self, id: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties
            .get_or_insert_with(Map::new)
            .insert(id.into(), value.into());
        self
    }

    /// Sets a single desired property.
    #[must_use]
    pub fn with_desired_property(mut self, id: impl Into<String>, value: impl Into<Value>) -> Self {
        self.desired_properties
            .get_or_insert_with(Map::new)
            .insert(id.into(), value.into());
        self
    }
}

/// A thing: the digital twin of a device or entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thing {
    /// The thing ID.
    pub thing_id: NamespacedId,
    /// The policy governing access to this thing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<NamespacedId>,
    /// The thing definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<DefinitionId>,
    /// Free-form attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    /// Features keyed by feature ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, Feature>>,
    /// Server-side revision.
    #[serde(rename = "_revision", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
    /// Server-side modification timestamp.
    #[serde(rename = "_modified", default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl Thing {
    /// Creates a thing with only its ID set.
    pub fn new(thing_id: NamespacedId) -> Self {
        Self {
            thing_id,
            policy_id: None,
            definition: None,
            attributes: None,
            features: None,
            revision: None,
            modified: None,
        }
    }

    /// Sets the policy ID.
    #[must_use]
    pub fn with_policy_id(mut self, policy_id: NamespacedId) -> Self {
        self.policy_id = Some(policy_id);
        self
    }

    /// Sets the definition.
    #[must_use]
    pub fn with_definition(mut self, definition: DefinitionId) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Sets a single attribute.
    #[must_use]
    pub fn with_attribute(mut self, id: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes
            .get_or_insert_with(Map::new)
            .insert(id.into(), value.into());
        self
    }

    /// Adds or replaces a feature.
    #[must_use]
    pub fn with_feature(mut self, id: impl Into<String>, feature: Feature) -> Self {
        self.features
            .get_or_insert_with(BTreeMap::new)
            .insert(id.into(), feature);
        self
    }
}
