//! Event-log types shared by the order and dispute streams.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Default page size for event queries.
pub const DEFAULT_EVENT_LIMIT: u32 = 10;
/// Largest page an event query may request.
pub const MAX_EVENT_LIMIT: u32 = 1000;

/// Closed set of event kinds for one stream.
pub trait EventKind:
    Copy
    + Eq
    + Hash
    + Debug
    + Display
    + FromStr<Err = UnknownVariant>
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn as_str(&self) -> &'static str;
}

/// An appended, immutable event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<K> {
    pub event_id: Uuid,
    pub entity_id: String,
    pub kind: K,
    /// Empty for internally originated events.
    pub provider_event_id: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An event awaiting append. The sink assigns `event_id`.
#[derive(Debug, Clone)]
pub struct NewEvent<K> {
    pub entity_id: String,
    pub kind: K,
    pub provider_event_id: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl<K: EventKind> NewEvent<K> {
    /// Event triggered by a provider notification, deduplicated on `provider_event_id`.
    pub fn external(
        entity_id: impl Into<String>,
        kind: K,
        provider_event_id: impl Into<String>,
        data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            provider_event_id: provider_event_id.into(),
            data,
            created_at,
        }
    }

    /// Event triggered by an operator action; never deduplicated.
    pub fn internal(
        entity_id: impl Into<String>,
        kind: K,
        data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::external(entity_id, kind, String::new(), data, created_at)
    }
}

/// Keyset sort direction over `(created_at, event_id)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Immutable filter for an event-log query. Build with [`EventQuery::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery<K> {
    pub entity_ids: Vec<String>,
    pub kinds: Vec<K>,
    /// Inclusive lower bound on `created_at`.
    pub time_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub time_to: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub direction: SortDirection,
    pub limit: u32,
}

impl<K: EventKind> EventQuery<K> {
    pub fn builder() -> EventQueryBuilder<K> {
        EventQueryBuilder::default()
    }
}

impl<K: EventKind> Default for EventQuery<K> {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone)]
pub struct EventQueryBuilder<K> {
    query: EventQuery<K>,
}

impl<K> Default for EventQueryBuilder<K> {
    fn default() -> Self {
        Self {
            query: EventQuery {
                entity_ids: Vec::new(),
                kinds: Vec::new(),
                time_from: None,
                time_to: None,
                cursor: None,
                direction: SortDirection::Desc,
                limit: DEFAULT_EVENT_LIMIT,
            },
        }
    }
}

impl<K: EventKind> EventQueryBuilder<K> {
    pub fn entity_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.entity_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = K>) -> Self {
        self.query.kinds = kinds.into_iter().collect();
        self
    }

    pub fn time_from(mut self, from: DateTime<Utc>) -> Self {
        self.query.time_from = Some(from);
        self
    }

    pub fn time_to(mut self, to: DateTime<Utc>) -> Self {
        self.query.time_to = Some(to);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        let cursor = cursor.into();
        self.query.cursor = (!cursor.is_empty()).then_some(cursor);
        self
    }

    pub fn direction(mut self, direction: SortDirection) -> Self {
        self.query.direction = direction;
        self
    }

    pub fn ascending(self, asc: bool) -> Self {
        self.direction(if asc {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        })
    }

    /// Zero selects the default page size; values above the maximum are clamped.
    pub fn limit(mut self, limit: u32) -> Self {
        self.query.limit = match limit {
            0 => DEFAULT_EVENT_LIMIT,
            n => n.min(MAX_EVENT_LIMIT),
        };
        self
    }

    pub fn build(self) -> EventQuery<K> {
        self.query
    }
}

/// One page of a keyset-paginated event query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPage<K> {
    pub items: Vec<Event<K>>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<K> EventPage<K> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}
