//! Protocol headers.
//!
//! Headers are stored case-sensitively, but every named accessor resolves its
//! key case-insensitively:
//!
//! 1. the canonical key (e.g. `correlation-id`) wins if present;
//! 2. otherwise keys are scanned in ascending byte order and the first one
//!    equal to the canonical key ignoring ASCII case is used;
//! 3. otherwise (or if the value has the wrong JSON type) the accessor's
//!    default applies.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// `correlation-id`
pub const HEADER_CORRELATION_ID: &str = "correlation-id";
/// `response-required`
pub const HEADER_RESPONSE_REQUIRED: &str = "response-required";
/// `ditto-channel`
pub const HEADER_CHANNEL: &str = "ditto-channel";
/// `ditto-dry-run`
pub const HEADER_DRY_RUN: &str = "ditto-dry-run";
/// `origin`
pub const HEADER_ORIGIN: &str = "origin";
/// `ditto-originator`
pub const HEADER_ORIGINATOR: &str = "ditto-originator";
/// `etag`
pub const HEADER_ETAG: &str = "etag";
/// `if-match`
pub const HEADER_IF_MATCH: &str = "if-match";
/// `if-none-match`
pub const HEADER_IF_NONE_MATCH: &str = "if-none-match";
/// `ditto-reply-target`
pub const HEADER_REPLY_TARGET: &str = "ditto-reply-target";
/// `reply-to`
pub const HEADER_REPLY_TO: &str = "reply-to";
/// `timeout`
pub const HEADER_TIMEOUT: &str = "timeout";
/// `version`
pub const HEADER_VERSION: &str = "version";
/// `content-type`
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// Timeout used when the `timeout` header is absent or invalid.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Protocol version used when the `version` header is absent.
pub const DEFAULT_VERSION: i64 = 2;

/// Upper bound accepted by [`parse_timeout`].
const MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// Parses a timeout header value.
///
/// The grammar is an integer followed by an optional unit: `ms`
/// (milliseconds), `m` (minutes), `s` or nothing (seconds). Values outside
/// `[0, 60s]` are rejected.
///
/// ```
/// use ditto_rs::headers::parse_timeout;
/// use std::time::Duration;
///
/// assert_eq!(parse_timeout("500ms")?, Duration::from_millis(500));
/// assert_eq!(parse_timeout("1m")?, Duration::from_secs(60));
/// assert!(parse_timeout("3600").is_err());
/// # Ok::<(), ditto_rs::Error>(())
/// ```
pub fn parse_timeout(value: &str) -> Result<Duration> {
    let invalid = || Error::InvalidTimeout(value.to_string());

    let (digits, unit_millis) = if let Some(digits) = value.strip_suffix("ms") {
        (digits, 1)
    } else if let Some(digits) = value.strip_suffix('m') {
        (digits, 60_000)
    } else if let Some(digits) = value.strip_suffix('s') {
        (digits, 1_000)
    } else {
        (value, 1_000)
    };

    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    if amount < 0 {
        return Err(invalid());
    }
    let millis = amount.checked_mul(unit_millis).ok_or_else(invalid)?;
    let timeout = Duration::from_millis(millis.unsigned_abs());
    if timeout > MAX_TIMEOUT {
        return Err(invalid());
    }
    Ok(timeout)
}

fn format_timeout(timeout: Duration) -> String {
    let millis = timeout.as_millis();
    if millis % 1_000 == 0 {
        format!("{}s", millis / 1_000)
    } else {
        format!("{}ms", millis)
    }
}

/// A single header mutation applied by [`Headers::new`] or [`Headers::with`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderOpt {
    key: String,
    value: Value,
    literal: bool,
}

impl HeaderOpt {
    fn named(key: &str, value: impl Into<Value>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
            literal: false,
        }
    }
}

/// Sets `correlation-id`.
pub fn with_correlation_id(id: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_CORRELATION_ID, id.into())
}

/// Sets `timeout`, formatted as whole seconds (`"10s"`) or milliseconds
/// (`"1500ms"`).
pub fn with_timeout(timeout: Duration) -> HeaderOpt {
    HeaderOpt::named(HEADER_TIMEOUT, format_timeout(timeout))
}

/// Sets `response-required`.
pub fn with_response_required(required: bool) -> HeaderOpt {
    HeaderOpt::named(HEADER_RESPONSE_REQUIRED, required)
}

/// Sets `ditto-channel`.
pub fn with_channel(channel: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_CHANNEL, channel.into())
}

/// Sets `ditto-dry-run`.
pub fn with_dry_run(dry_run: bool) -> HeaderOpt {
    HeaderOpt::named(HEADER_DRY_RUN, dry_run)
}

/// Sets `origin`.
pub fn with_origin(origin: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_ORIGIN, origin.into())
}

/// Sets `ditto-originator`.
pub fn with_originator(originator: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_ORIGINATOR, originator.into())
}

/// Sets `etag`.
pub fn with_etag(etag: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_ETAG, etag.into())
}

/// Sets `if-match`.
pub fn with_if_match(value: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_IF_MATCH, value.into())
}

/// Sets `if-none-match`.
pub fn with_if_none_match(value: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_IF_NONE_MATCH, value.into())
}

/// Sets `ditto-reply-target`.
pub fn with_reply_target(target: i64) -> HeaderOpt {
    HeaderOpt::named(HEADER_REPLY_TARGET, target)
}

/// Sets `reply-to`.
pub fn with_reply_to(reply_to: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_REPLY_TO, reply_to.into())
}

/// Sets `version`.
pub fn with_version(version: i64) -> HeaderOpt {
    HeaderOpt::named(HEADER_VERSION, version)
}

/// Sets `content-type`.
pub fn with_content_type(content_type: impl Into<String>) -> HeaderOpt {
    HeaderOpt::named(HEADER_CONTENT_TYPE, content_type.into())
}

/// Writes `key` exactly as given, without case-insensitive resolution.
pub fn with_generic(key: impl Into<String>, value: impl Into<Value>) -> HeaderOpt {
    HeaderOpt {
        key: key.into(),
        value: value.into(),
        literal: true,
    }
}

/// Protocol headers: a string-keyed map of JSON values.
///
/// # Example
///
/// ```
/// use ditto_rs::headers::{self, Headers};
///
/// let mut h = Headers::new([headers::with_response_required(false)]);
/// assert!(!h.is_response_required());
/// assert_eq!(h.version(), 2);
///
/// let id = h.correlation_id();
/// assert_eq!(h.correlation_id(), id);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    // Ordered by key bytes, which the case-insensitive lookup relies on.
    values: BTreeMap<String, Value>,
}

impl Headers {
    /// Creates headers from a set of options.
    pub fn new(opts: impl IntoIterator<Item = HeaderOpt>) -> Self {
        let mut headers = Self::default();
        headers.apply(opts);
        headers
    }

    /// Creates headers from a copy of `values`, then applies `opts`.
    pub fn from_map(values: &BTreeMap<String, Value>, opts: impl IntoIterator<Item = HeaderOpt>) -> Self {
        let mut headers = Self {
            values: values.clone(),
        };
        headers.apply(opts);
        headers
    }

    /// Returns a copy of these headers with `opts` applied. `self` is left
    /// untouched.
    #[must_use]
    pub fn with(&self, opts: impl IntoIterator<Item = HeaderOpt>) -> Self {
        let mut headers = self.clone();
        headers.apply(opts);
        headers
    }

    fn apply(&mut self, opts: impl IntoIterator<Item = HeaderOpt>) {
        for opt in opts {
            let key = if opt.literal {
                opt.key
            } else {
                self.resolve_key(&opt.key)
                    .map(str::to_string)
                    .unwrap_or(opt.key)
            };
            self.values.insert(key, opt.value);
        }
    }

    /// Finds the stored key that answers for `canonical`.
    fn resolve_key(&self, canonical: &str) -> Option<&str> {
        if let Some((key, _)) = self.values.get_key_value(canonical) {
            return Some(key);
        }
        self.values
            .keys()
            .find(|key| key.eq_ignore_ascii_case(canonical))
            .map(String::as_str)
    }

    /// Returns the value for `key`, resolved case-insensitively.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.resolve_key(key).and_then(|k| self.values.get(k))
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    /// Returns the correlation ID if a string value is present.
    pub fn lookup_correlation_id(&self) -> Option<&str> {
        self.get_str(HEADER_CORRELATION_ID)
    }

    /// Returns the correlation ID, generating and storing a random one under
    /// the canonical key if none is present. Repeated calls return the same
    /// value.
    pub fn correlation_id(&mut self) -> String {
        if let Some(id) = self.lookup_correlation_id() {
            return id.to_string();
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.values
            .insert(HEADER_CORRELATION_ID.to_string(), Value::String(id.clone()));
        id
    }

    /// Returns the `timeout` header, or 60s if absent or invalid.
    pub fn timeout(&self) -> Duration {
        self.get_str(HEADER_TIMEOUT)
            .and_then(|value| parse_timeout(value).ok())
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Returns `response-required`, defaulting to true.
    pub fn is_response_required(&self) -> bool {
        self.get(HEADER_RESPONSE_REQUIRED)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Returns `ditto-channel`.
    pub fn channel(&self) -> String {
        self.get_string(HEADER_CHANNEL)
    }

    /// Returns `ditto-dry-run`, defaulting to false.
    pub fn is_dry_run(&self) -> bool {
        self.get(HEADER_DRY_RUN)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Returns `origin`.
    pub fn origin(&self) -> String {
        self.get_string(HEADER_ORIGIN)
    }

    /// Returns `ditto-originator`.
    pub fn originator(&self) -> String {
        self.get_string(HEADER_ORIGINATOR)
    }

    /// Returns `etag`.
    pub fn etag(&self) -> String {
        self.get_string(HEADER_ETAG)
    }

    /// Returns `if-match`.
    pub fn if_match(&self) -> String {
        self.get_string(HEADER_IF_MATCH)
    }

    /// Returns `if-none-match`.
    pub fn if_none_match(&self) -> String {
        self.get_string(HEADER_IF_NONE_MATCH)
    }

    /// Returns `ditto-reply-target`, defaulting to 0.
    pub fn reply_target(&self) -> i64 {
        self.get(HEADER_REPLY_TARGET)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Returns `reply-to`.
    pub fn reply_to(&self) -> String {
        self.get_string(HEADER_REPLY_TO)
    }

    /// Returns `version`, defaulting to 2.
    pub fn version(&self) -> i64 {
        self.get(HEADER_VERSION)
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_VERSION)
    }

    /// Returns `content-type`.
    pub fn content_type(&self) -> String {
        self.get_string(HEADER_CONTENT_TYPE)
    }

    /// Number of stored entries (case variants counted separately).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no header is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates the stored entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

impl From<BTreeMap<String, Value>> for Headers {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}
