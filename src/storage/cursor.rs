//! Keyset cursor codec and page assembly.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Result, StorageError};
use crate::domain::{Event, EventPage};

/// Position after the last row of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Cursor {
    pub fn after<K>(event: &Event<K>) -> Self {
        Self {
            event_id: event.event_id,
            created_at: event.created_at,
        }
    }

    /// URL-safe base64 of the JSON form.
    pub fn encode(&self) -> String {
        // Serializing two plain fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|_| StorageError::BadCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StorageError::BadCursor)
    }

    /// Keyset ordering key.
    pub fn key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.event_id)
    }
}

/// Turns up to `limit + 1` fetched rows into a page.
pub fn paginate<K>(mut rows: Vec<Event<K>>, limit: u32) -> EventPage<K> {
    let limit = limit as usize;
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    let next_cursor = if has_more {
        rows.last().map(|last| Cursor::after(last).encode())
    } else {
        None
    };
    EventPage {
        items: rows,
        next_cursor,
        has_more,
    }
}
