//! Idempotency keys, resource actions and the replayable response snapshot.

use crate::MAX_IDEMPOTENCY_FIELD_LEN;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Namespace prefix of every cache key written by the coordinator.
pub const CACHE_KEY_PREFIX: &str = "idempotency";

/// Client-supplied opaque key identifying one logical, retryable attempt.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Parse a key taken from a request header.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidIdempotencyKey(
                "key must not be empty".to_string(),
            ));
        }
        if s.len() > MAX_IDEMPOTENCY_FIELD_LEN {
            return Err(crate::Error::InvalidIdempotencyKey(format!(
                "key is {} bytes (max: {})",
                s.len(),
                MAX_IDEMPOTENCY_FIELD_LEN
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl fmt::Debug for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdempotencyKey({})", self.0)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The verb and logical path a key is scoped to, e.g. `POST:/api/articles`.
///
/// The same key used against two different actions forms two unrelated claims.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceAction(String);

impl ResourceAction {
    /// Compose an action from a verb and a path.
    pub fn new(verb: &str, path: &str) -> crate::Result<Self> {
        if verb.is_empty() || verb.contains(':') {
            return Err(crate::Error::InvalidResourceAction(format!(
                "invalid verb '{verb}'"
            )));
        }
        if path.is_empty() {
            return Err(crate::Error::InvalidResourceAction(
                "path must not be empty".to_string(),
            ));
        }
        Self::parse(&format!("{verb}:{path}"))
    }

    /// Parse an already composed `VERB:path` string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let Some((verb, path)) = s.split_once(':') else {
            return Err(crate::Error::InvalidResourceAction(format!(
                "'{s}' is not of the form VERB:path"
            )));
        };
        if verb.is_empty() || path.is_empty() {
            return Err(crate::Error::InvalidResourceAction(format!(
                "'{s}' has an empty verb or path"
            )));
        }
        if s.len() > MAX_IDEMPOTENCY_FIELD_LEN {
            return Err(crate::Error::InvalidResourceAction(format!(
                "action is {} bytes (max: {})",
                s.len(),
                MAX_IDEMPOTENCY_FIELD_LEN
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The verb part (before the first `:`).
    pub fn verb(&self) -> &str {
        self.0.split_once(':').map(|(verb, _)| verb).unwrap_or("")
    }

    /// The path part (after the first `:`).
    pub fn path(&self) -> &str {
        self.0.split_once(':').map(|(_, path)| path).unwrap_or("")
    }
}

impl TryFrom<String> for ResourceAction {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceAction> for String {
    fn from(action: ResourceAction) -> Self {
        action.0
    }
}

impl fmt::Debug for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceAction({})", self.0)
    }
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (key, resource action) pair: the unit of admission.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdempotencyScope {
    pub key: IdempotencyKey,
    pub resource_action: ResourceAction,
}

impl IdempotencyScope {
    pub fn new(key: IdempotencyKey, resource_action: ResourceAction) -> Self {
        Self {
            key,
            resource_action,
        }
    }

    /// Key used for this scope in the volatile cache.
    ///
    /// Format is `idempotency:{resourceAction}:{idempotencyKey}`; other
    /// instances read the same keys, so the composition must not change.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}",
            CACHE_KEY_PREFIX, self.resource_action, self.key
        )
    }
}

impl fmt::Display for IdempotencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_action, self.key)
    }
}

/// Persisted status of an idempotency record.
///
/// There is no failed state: a failed attempt deletes its record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

impl FromStr for IdempotencyStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the first successful response, replayed verbatim on duplicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status_code: u16,
    pub body: Option<Value>,
}

impl StoredResponse {
    pub fn new(status_code: u16, body: Option<Value>) -> Self {
        Self { status_code, body }
    }
}

/// Value stored in the volatile cache: a projection of the durable record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub status: IdempotencyStatus,
    #[serde(default)]
    pub response_code: Option<u16>,
    #[serde(default)]
    pub response_body: Option<Value>,
}

impl CacheEntry {
    pub fn in_progress() -> Self {
        Self {
            status: IdempotencyStatus::InProgress,
            response_code: None,
            response_body: None,
        }
    }

    pub fn completed(response: &StoredResponse) -> Self {
        Self {
            status: IdempotencyStatus::Completed,
            response_code: Some(response.status_code),
            response_body: response.body.clone(),
        }
    }

    /// Serialize to the JSON shape shared by all instances.
    pub fn encode(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The replayable response, if this entry is completed.
    ///
    /// A completed entry without a response code replays as 200.
    pub fn into_response(self) -> Option<StoredResponse> {
        match self.status {
            IdempotencyStatus::Completed => Some(StoredResponse {
                status_code: self.response_code.unwrap_or(200),
                body: self.response_body,
            }),
            IdempotencyStatus::InProgress => None,
        }
    }
}
