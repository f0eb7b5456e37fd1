//! Record store adapter: a narrow query/command surface over the four record
//! kinds, with memory, sqlite and hosted PostgREST backends.

mod memory;
mod rest;
mod sqlite;

use std::sync::Arc;

use agenda_config::Config;
use agenda_contracts::{
    Contact, ContactKind, Event, EventId, EventUpdate, NewContact, NewEvent, NotificationLog,
    Subscriber,
};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// Filter for event listings. Empty fields do not constrain the result.
/// Results are ordered by date, then id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub owner: Option<String>,
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    /// OR-matched, case-insensitive substrings of title or description.
    pub terms: Vec<String>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn owned_by(owner: Option<&str>) -> Self {
        Self {
            owner: owner.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn from_date(mut self, date: NaiveDate) -> Self {
        self.from_date = Some(date);
        self
    }

    pub fn matching(mut self, terms: Vec<String>) -> Self {
        self.terms = terms;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn accepts(&self, event: &Event) -> bool {
        if self.owner.as_deref().is_some_and(|o| o != event.owner) {
            return false;
        }
        if self.date.is_some_and(|d| d != event.date) {
            return false;
        }
        if self.from_date.is_some_and(|d| event.date < d) {
            return false;
        }
        self.terms.is_empty()
            || agenda_kernel::search::matches_any(&self.terms, &[&event.title, &event.description])
    }
}

/// Filter for contact/note searches, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactQuery {
    pub kind: ContactKind,
    pub owner: Option<String>,
    /// OR-matched, case-insensitive substrings of name or payload.
    pub terms: Vec<String>,
    pub limit: Option<usize>,
}

impl ContactQuery {
    pub(crate) fn accepts(&self, contact: &Contact) -> bool {
        if contact.kind != self.kind {
            return false;
        }
        if self.owner.as_deref().is_some_and(|o| o != contact.owner) {
            return false;
        }
        self.terms.is_empty()
            || agenda_kernel::search::matches_any(&self.terms, &[&contact.name, &contact.payload])
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name reported by the health endpoint.
    fn kind(&self) -> &'static str;

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError>;
    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError>;
    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), StoreError>;
    async fn delete_event(&self, id: EventId) -> Result<(), StoreError>;
    async fn list_events(&self, query: EventQuery) -> Result<Vec<Event>, StoreError>;

    async fn insert_contact(&self, contact: NewContact) -> Result<Contact, StoreError>;
    async fn search_contacts(&self, query: ContactQuery) -> Result<Vec<Contact>, StoreError>;

    async fn get_subscriber(&self, user_id: &str) -> Result<Option<Subscriber>, StoreError>;
    async fn insert_subscriber(&self, subscriber: Subscriber) -> Result<(), StoreError>;

    /// Whether a reminder for `event_id` was already delivered.
    async fn notification_sent(&self, event_id: EventId) -> Result<bool, StoreError>;
    async fn insert_notification(&self, log: NotificationLog) -> Result<(), StoreError>;
}

pub fn open_store(cfg: &Config) -> Result<Arc<dyn RecordStore>, String> {
    match cfg.store.kind.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::default())),
        "sqlite" => {
            let sqlite_path = cfg
                .store
                .sqlite_path
                .clone()
                .ok_or_else(|| "store.sqlite_path is required for sqlite store".to_string())?;
            Ok(Arc::new(
                SqliteStore::open(&sqlite_path).map_err(|e| e.to_string())?,
            ))
        }
        "rest" => {
            let url = cfg
                .store
                .url
                .clone()
                .ok_or_else(|| "store url is required for rest store".to_string())?;
            let key = cfg
                .store
                .service_key
                .clone()
                .ok_or_else(|| "store service key is required for rest store".to_string())?;
            Ok(Arc::new(
                RestStore::new(&url, &key, cfg.line.timeout_ms).map_err(|e| e.to_string())?,
            ))
        }
        other => Err(format!("unsupported store type: {other}")),
    }
}
