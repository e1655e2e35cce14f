//! Builders for commands, events and live messages on things.
//!
//! Builders chain through `&mut Self`. Within each category (channel, path,
//! action) only the last call takes effect; conflicting calls are not
//! rejected.
//!
//! # Example
//!
//! ```
//! use ditto_rs::headers;
//! use ditto_rs::things::Command;
//! use ditto_rs::NamespacedId;
//!
//! let thing_id = NamespacedId::parse("ns:thing1").unwrap();
//! let envelope = Command::new(&thing_id)
//!     .twin()
//!     .feature("temp")
//!     .modify(21.5)
//!     .envelope([headers::with_response_required(false)]);
//!
//! assert_eq!(envelope.topic.to_topic_string()?, "ns/thing1/things/twin/commands/modify");
//! assert_eq!(envelope.path, "/features/temp");
//! # Ok::<(), ditto_rs::Error>(())
//! ```

use crate::envelope::Envelope;
use crate::headers::{self, HeaderOpt, Headers};
use crate::model::NamespacedId;
use crate::topic::{action, Topic, TopicChannel, TopicCriterion, TopicGroup};
use serde_json::{json, Value};

/// Content type recorded on merge commands and events.
pub const CONTENT_TYPE_MERGE_PATCH: &str = "application/merge-patch+json";

const PATH_THING: &str = "/";
const PATH_DEFINITION: &str = "/definition";
const PATH_POLICY_ID: &str = "/policyId";
const PATH_ATTRIBUTES: &str = "/attributes";
const PATH_FEATURES: &str = "/features";

fn thing_topic(thing_id: &NamespacedId, channel: TopicChannel, criterion: TopicCriterion) -> Topic {
    Topic::new()
        .with_namespace(&thing_id.namespace)
        .with_entity_name(&thing_id.name)
        .with_group(TopicGroup::Things)
        .with_channel(channel)
        .with_criterion(criterion)
}

/// Snapshots topic, path and payload into an envelope. Headers are attached
/// only when at least one option is given.
fn build_envelope(
    topic: &Topic,
    path: &str,
    payload: &Option<Value>,
    opts: Vec<HeaderOpt>,
) -> Envelope {
    let mut envelope = Envelope::new()
        .with_topic(topic.clone())
        .with_path(path);
    envelope.value = payload.clone();
    if !opts.is_empty() {
        let mut all = Vec::with_capacity(opts.len() + 1);
        if topic.action == action::MERGE || topic.action == action::MERGED {
            all.push(headers::with_content_type(CONTENT_TYPE_MERGE_PATCH));
        }
        all.extend(opts);
        envelope.headers = Headers::new(all);
    }
    envelope
}

macro_rules! thing_paths {
    ($builder:ty) => {
        impl $builder {
            /// Switches to the live channel.
            pub fn live(&mut self) -> &mut Self {
                self.topic.channel = Some(TopicChannel::Live);
                self
            }

            /// Switches to the twin channel.
            pub fn twin(&mut self) -> &mut Self {
                self.topic.channel = Some(TopicChannel::Twin);
                self
            }

            /// Addresses the whole thing.
            pub fn thing(&mut self) -> &mut Self {
                self.path = PATH_THING.to_string();
                self
            }

            /// Addresses the thing definition.
            pub fn definition(&mut self) -> &mut Self {
                self.path = PATH_DEFINITION.to_string();
                self
            }

            /// Addresses the policy ID.
            pub fn policy_id(&mut self) -> &mut Self {
                self.path = PATH_POLICY_ID.to_string();
                self
            }

            /// Addresses all attributes.
            pub fn attributes(&mut self) -> &mut Self {
                self.path = PATH_ATTRIBUTES.to_string();
                self
            }

            /// Addresses one attribute.
            pub fn attribute(&mut self, id: &str) -> &mut Self {
                self.path = format!("{}/{}", PATH_ATTRIBUTES, id);
                self
            }

            /// Addresses all features.
            pub fn features(&mut self) -> &mut Self {
                self.path = PATH_FEATURES.to_string();
                self
            }

            /// Addresses one feature.
            pub fn feature(&mut self, id: &str) -> &mut Self {
                self.path = format!("{}/{}", PATH_FEATURES, id);
                self
            }

            /// Addresses a feature definition.
            pub fn feature_definition(&mut self, id: &str) -> &mut Self {
                self.path = format!("{}/{}/definition", PATH_FEATURES, id);
                self
            }

            /// Addresses all properties of a feature.
            pub fn feature_properties(&mut self, id: &str) -> &mut Self {
                self.path = format!("{}/{}/properties", PATH_FEATURES, id);
                self
            }

            /// Addresses one property of a feature.
            pub fn feature_property(&mut self, id: &str, property: &str) -> &mut Self {
                self.path = format!("{}/{}/properties/{}", PATH_FEATURES, id, property);
                self
            }

            /// Addresses all desired properties of a feature.
            pub fn feature_desired_properties(&mut self, id: &str) -> &mut Self {
                self.path = format!("{}/{}/desiredProperties", PATH_FEATURES, id);
                self
            }

            /// Addresses one desired property of a feature.
            pub fn feature_desired_property(&mut self, id: &str, property: &str) -> &mut Self {
                self.path = format!("{}/{}/desiredProperties/{}", PATH_FEATURES, id, property);
                self
            }

            /// The topic built so far.
            pub fn topic(&self) -> &Topic {
                &self.topic
            }

            /// The path built so far.
            pub fn path(&self) -> &str {
                &self.path
            }

            /// The payload built so far.
            pub fn payload(&self) -> Option<&Value> {
                self.payload.as_ref()
            }

            /// Creates an envelope from the current state.
            pub fn envelope(&self, opts: impl IntoIterator<Item = HeaderOpt>) -> Envelope {
                build_envelope(&self.topic, &self.path, &self.payload, opts.into_iter().collect())
            }
        }
    };
}

/// A command on a thing (`things/{channel}/commands`).
#[derive(Debug, Clone)]
pub struct Command {
    topic: Topic,
    path: String,
    payload: Option<Value>,
}

impl Command {
    /// Creates a twin command addressing the whole thing.
    pub fn new(thing_id: &NamespacedId) -> Self {
        Self {
            topic: thing_topic(thing_id, TopicChannel::Twin, TopicCriterion::Commands),
            path: PATH_THING.to_string(),
            payload: None,
        }
    }

    fn set_action(&mut self, name: &str, payload: Option<Value>) -> &mut Self {
        self.topic.action = name.to_string();
        self.payload = payload;
        self
    }

    /// Creates the addressed entity.
    pub fn create(&mut self, value: impl Into<Value>) -> &mut Self {
        self.set_action(action::CREATE, Some(value.into()))
    }

    /// Creates or replaces the addressed entity.
    pub fn modify(&mut self, value: impl Into<Value>) -> &mut Self {
        self.set_action(action::MODIFY, Some(value.into()))
    }

    /// Merges `value` into the addressed entity (JSON merge patch).
    pub fn merge(&mut self, value: impl Into<Value>) -> &mut Self {
        self.set_action(action::MERGE, Some(value.into()))
    }

    /// Retrieves the addressed entity, or the listed things.
    ///
    /// With no IDs no payload is sent; otherwise the payload is
    /// `{"thingIds": [...]}`.
    pub fn retrieve(&mut self, thing_ids: &[NamespacedId]) -> &mut Self {
        let payload = (!thing_ids.is_empty()).then(|| {
            let ids: Vec<String> = thing_ids.iter().map(ToString::to_string).collect();
            json!({ "thingIds": ids })
        });
        self.set_action(action::RETRIEVE, payload)
    }

    /// Deletes the addressed entity.
    pub fn delete(&mut self) -> &mut Self {
        self.set_action(action::DELETE, None)
    }
}

thing_paths!(Command);

/// An event about a thing (`things/{channel}/events`).
#[derive(Debug, Clone)]
pub struct Event {
    topic: Topic,
    path: String,
    payload: Option<Value>,
}

impl Event {
    /// Creates a twin event addressing the whole thing.
    pub fn new(thing_id: &NamespacedId) -> Self {
        Self {
            topic: thing_topic(thing_id, TopicChannel::Twin, TopicCriterion::Events),
            path: PATH_THING.to_string(),
            payload: None,
        }
    }

    fn set_action(&mut self, name: &str, payload: Option<Value>) -> &mut Self {
        self.topic.action = name.to_string();
        self.payload = payload;
        self
    }

    /// The addressed entity was created.
    pub fn created(&mut self, value: impl Into<Value>) -> &mut Self {
        self.set_action(action::CREATED, Some(value.into()))
    }

    /// The addressed entity was modified.
    pub fn modified(&mut self, value: impl Into<Value>) -> &mut Self {
        self.set_action(action::MODIFIED, Some(value.into()))
    }

    /// `value` was merged into the addressed entity.
    pub fn merged(&mut self, value: impl Into<Value>) -> &mut Self {
        self.set_action(action::MERGED, Some(value.into()))
    }

    /// The addressed entity was deleted.
    pub fn deleted(&mut self) -> &mut Self {
        self.set_action(action::DELETED, None)
    }
}

thing_paths!(Event);

/// Live message mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mailbox {
    /// Messages sent to the thing
    Inbox,
    /// Messages sent by the thing
    Outbox,
}

impl Mailbox {
    /// Returns the path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mailbox::Inbox => "inbox",
            Mailbox::Outbox => "outbox",
        }
    }
}

/// A live message to or from a thing (`things/live/messages/{subject}`).
///
/// ```
/// use ditto_rs::things::Message;
/// use ditto_rs::NamespacedId;
///
/// let thing_id = NamespacedId::parse("ns:thing1").unwrap();
/// let envelope = Message::new(&thing_id)
///     .feature("lamp")
///     .inbox("switch-on")
///     .with_payload(true)
///     .envelope([]);
///
/// assert_eq!(envelope.path, "/features/lamp/inbox/messages/switch-on");
/// assert_eq!(envelope.topic.action, "switch-on");
/// ```
#[derive(Debug, Clone)]
pub struct Message {
    topic: Topic,
    addressed_part: String,
    mailbox: Option<Mailbox>,
    payload: Option<Value>,
}

impl Message {
    /// Creates a message addressing the thing itself.
    pub fn new(thing_id: &NamespacedId) -> Self {
        Self {
            topic: thing_topic(thing_id, TopicChannel::Live, TopicCriterion::Messages),
            addressed_part: String::new(),
            mailbox: None,
            payload: None,
        }
    }

    /// Addresses a feature of the thing instead of the thing itself.
    pub fn feature(&mut self, id: &str) -> &mut Self {
        self.addressed_part = format!("{}/{}", PATH_FEATURES, id);
        self
    }

    /// Sends `subject` to the inbox.
    pub fn inbox(&mut self, subject: &str) -> &mut Self {
        self.mailbox = Some(Mailbox::Inbox);
        self.topic.action = subject.to_string();
        self
    }

    /// Sends `subject` from the outbox.
    pub fn outbox(&mut self, subject: &str) -> &mut Self {
        self.mailbox = Some(Mailbox::Outbox);
        self.topic.action = subject.to_string();
        self
    }

    /// Sets the message payload.
    pub fn with_payload(&mut self, payload: impl Into<Value>) -> &mut Self {
        self.payload = Some(payload.into());
        self
    }

    /// The topic built so far.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The message path: `{addressed}/{mailbox}/messages/{subject}`, or `/`
    /// before a mailbox is chosen.
    pub fn path(&self) -> String {
        match self.mailbox {
            Some(mailbox) => format!(
                "{}/{}/messages/{}",
                self.addressed_part,
                mailbox.as_str(),
                self.topic.action
            ),
            None => PATH_THING.to_string(),
        }
    }

    /// Creates an envelope from the current state.
    pub fn envelope(&self, opts: impl IntoIterator<Item = HeaderOpt>) -> Envelope {
        build_envelope(&self.topic, &self.path(), &self.payload, opts.into_iter().collect())
    }
}
