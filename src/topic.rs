//! Protocol topic parsing and construction.
//!
//! Topics follow the format:
//! - `{namespace}/{entity}/things/{channel}/{criterion}[/{action}]`
//! - `{namespace}/{entity}/policies/{criterion}/{action}`
//!
//! `namespace` and `entity` may be the placeholder `_`.

use crate::error::{Error, Result};
use crate::model::is_safe_segment;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Placeholder segment meaning "any namespace" or "any entity".
pub const TOPIC_PLACEHOLDER: &str = "_";

/// Topic groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicGroup {
    /// Things (digital twins)
    Things,
    /// Policies
    Policies,
}

impl TopicGroup {
    /// Returns the string representation used in topics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicGroup::Things => "things",
            TopicGroup::Policies => "policies",
        }
    }
}

impl std::fmt::Display for TopicGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TopicGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "things" => Ok(TopicGroup::Things),
            "policies" => Ok(TopicGroup::Policies),
            _ => Err(Error::InvalidTopic(format!("unknown group: {}", s))),
        }
    }
}

/// Topic channels (only used by the things group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicChannel {
    /// The persisted twin
    Twin,
    /// Live communication with the device
    Live,
}

impl TopicChannel {
    /// Returns the string representation used in topics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicChannel::Twin => "twin",
            TopicChannel::Live => "live",
        }
    }
}

impl std::fmt::Display for TopicChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TopicChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "twin" => Ok(TopicChannel::Twin),
            "live" => Ok(TopicChannel::Live),
            _ => Err(Error::InvalidTopic(format!("unknown channel: {}", s))),
        }
    }
}

/// Topic criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicCriterion {
    /// Commands
    Commands,
    /// Events
    Events,
    /// Search
    Search,
    /// Messages
    Messages,
    /// Errors
    Errors,
}

impl TopicCriterion {
    /// Returns the string representation used in topics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicCriterion::Commands => "commands",
            TopicCriterion::Events => "events",
            TopicCriterion::Search => "search",
            TopicCriterion::Messages => "messages",
            TopicCriterion::Errors => "errors",
        }
    }
}

impl std::fmt::Display for TopicCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TopicCriterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "commands" => Ok(TopicCriterion::Commands),
            "events" => Ok(TopicCriterion::Events),
            "search" => Ok(TopicCriterion::Search),
            "messages" => Ok(TopicCriterion::Messages),
            "errors" => Ok(TopicCriterion::Errors),
            _ => Err(Error::InvalidTopic(format!("unknown criterion: {}", s))),
        }
    }
}

/// Well-known topic actions.
pub mod action {
    /// `create`
    pub const CREATE: &str = "create";
    /// `created`
    pub const CREATED: &str = "created";
    /// `modify`
    pub const MODIFY: &str = "modify";
    /// `modified`
    pub const MODIFIED: &str = "modified";
    /// `merge`
    pub const MERGE: &str = "merge";
    /// `merged`
    pub const MERGED: &str = "merged";
    /// `delete`
    pub const DELETE: &str = "delete";
    /// `deleted`
    pub const DELETED: &str = "deleted";
    /// `retrieve`
    pub const RETRIEVE: &str = "retrieve";
    /// `subscribe`
    pub const SUBSCRIBE: &str = "subscribe";
}

/// A protocol topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Topic {
    /// Namespace of the addressed entity, or `_`.
    pub namespace: String,
    /// Name of the addressed entity, or `_`.
    pub entity_name: String,
    /// The group.
    pub group: Option<TopicGroup>,
    /// The channel (things only).
    pub channel: Option<TopicChannel>,
    /// The criterion.
    pub criterion: Option<TopicCriterion>,
    /// The action (optional for things).
    pub action: String,
}

impl Topic {
    /// Creates an empty topic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the entity name.
    #[must_use]
    pub fn with_entity_name(mut self, entity_name: impl Into<String>) -> Self {
        self.entity_name = entity_name.into();
        self
    }

    /// Sets the group.
    #[must_use]
    pub fn with_group(mut self, group: TopicGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Sets the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: TopicChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Sets the criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: TopicCriterion) -> Self {
        self.criterion = Some(criterion);
        self
    }

    /// Sets the action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Parses a topic string.
    ///
    /// # Examples
    ///
    /// ```
    /// use ditto_rs::{Topic, TopicChannel, TopicGroup};
    ///
    /// let topic = Topic::parse("org.example/sensor-1/things/twin/commands/modify")?;
    /// assert_eq!(topic.group, Some(TopicGroup::Things));
    /// assert_eq!(topic.channel, Some(TopicChannel::Twin));
    /// assert_eq!(topic.action, "modify");
    ///
    /// let topic = Topic::parse("_/_/things/twin/search")?;
    /// assert!(topic.action.is_empty());
    /// # Ok::<(), ditto_rs::Error>(())
    /// ```
    pub fn parse(topic: &str) -> Result<Self> {
        let invalid = || Error::InvalidTopic(topic.to_string());

        let mut head = topic.splitn(3, '/');
        let namespace = head.next().ok_or_else(invalid)?;
        let entity_name = head.next().ok_or_else(invalid)?;
        let rest = head.next().ok_or_else(invalid)?;
        if !is_valid_segment(namespace, true) || !is_valid_segment(entity_name, false) {
            return Err(invalid());
        }

        let (group, rest) = rest.split_once('/').ok_or_else(invalid)?;
        let group: TopicGroup = group.parse()?;

        let (channel, rest) = match group {
            TopicGroup::Things => {
                let (channel, rest) = rest.split_once('/').ok_or_else(invalid)?;
                (Some(channel.parse::<TopicChannel>()?), rest)
            }
            TopicGroup::Policies => (None, rest),
        };

        // The action is the remainder and may itself contain '/'.
        let (criterion, action) = match rest.split_once('/') {
            Some((criterion, action)) if !action.is_empty() => (criterion, action),
            Some(_) => return Err(invalid()),
            None => (rest, ""),
        };
        let criterion: TopicCriterion = criterion.parse()?;

        if group == TopicGroup::Policies && action.is_empty() {
            return Err(Error::InvalidTopic(format!(
                "policies topics require an action: {}",
                topic
            )));
        }

        Ok(Topic {
            namespace: namespace.to_string(),
            entity_name: entity_name.to_string(),
            group: Some(group),
            channel,
            criterion: Some(criterion),
            action: action.to_string(),
        })
    }

    /// Converts the topic to its string form.
    ///
    /// Fails with [`Error::InvalidTopic`] carrying the positional string if a
    /// mandatory segment is missing or a segment is not allowed for the group.
    pub fn to_topic_string(&self) -> Result<String> {
        let invalid = || Error::InvalidTopic(self.positional_string());

        if !is_valid_segment(&self.namespace, true) || !is_valid_segment(&self.entity_name, false)
        {
            return Err(invalid());
        }
        let criterion = self.criterion.ok_or_else(invalid)?;

        let mut segments = vec![self.namespace.as_str(), self.entity_name.as_str()];
        match self.group {
            Some(TopicGroup::Things) => {
                let channel = self.channel.ok_or_else(invalid)?;
                segments.extend([TopicGroup::Things.as_str(), channel.as_str(), criterion.as_str()]);
            }
            Some(TopicGroup::Policies) => {
                if self.channel.is_some() || self.action.is_empty() {
                    return Err(invalid());
                }
                segments.extend([TopicGroup::Policies.as_str(), criterion.as_str()]);
            }
            None => return Err(invalid()),
        }
        if !self.action.is_empty() {
            segments.push(&self.action);
        }
        Ok(segments.join("/"))
    }

    /// All six segments joined by `/`, with absent segments left empty.
    fn positional_string(&self) -> String {
        [
            self.namespace.as_str(),
            self.entity_name.as_str(),
            self.group.map(|g| g.as_str()).unwrap_or_default(),
            self.channel.map(|c| c.as_str()).unwrap_or_default(),
            self.criterion.map(|c| c.as_str()).unwrap_or_default(),
            self.action.as_str(),
        ]
        .join("/")
    }
}

fn is_valid_segment(segment: &str, is_namespace: bool) -> bool {
    segment == TOPIC_PLACEHOLDER || is_safe_segment(segment, is_namespace)
}

impl std::str::FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Topic::parse(s)
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let topic = self.to_topic_string().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&topic)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Topic::parse(&raw).map_err(serde::de::Error::custom)
    }
}
