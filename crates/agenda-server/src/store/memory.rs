use std::collections::HashMap;

use agenda_contracts::{
    Contact, ContactId, Event, EventId, EventUpdate, NewContact, NewEvent, NotificationLog,
    Subscriber,
};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ContactQuery, EventQuery, RecordStore};
use crate::error::StoreError;

#[derive(Default)]
struct Tables {
    next_event_id: EventId,
    next_contact_id: ContactId,
    events: HashMap<EventId, Event>,
    contacts: HashMap<ContactId, Contact>,
    subscribers: HashMap<String, Subscriber>,
    notifications: Vec<NotificationLog>,
}

/// Process-local store for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub async fn notifications(&self) -> Vec<NotificationLog> {
        self.tables.lock().await.notifications.clone()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.tables.lock().await.subscribers.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_event_id += 1;
        let event = event.into_event(tables.next_event_id);
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }

    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let event = tables
            .events
            .get_mut(&id)
            .ok_or(StoreError::NotFound("event"))?;
        event.title = update.title;
        event.description = update.description;
        event.date = update.date;
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> Result<(), StoreError> {
        self.tables.lock().await.events.remove(&id);
        Ok(())
    }

    async fn list_events(&self, query: EventQuery) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.lock().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| query.accepts(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn insert_contact(&self, contact: NewContact) -> Result<Contact, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_contact_id += 1;
        let contact = contact.into_contact(tables.next_contact_id);
        tables.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn search_contacts(&self, query: ContactQuery) -> Result<Vec<Contact>, StoreError> {
        let tables = self.tables.lock().await;
        let mut contacts: Vec<Contact> = tables
            .contacts
            .values()
            .filter(|c| query.accepts(c))
            .cloned()
            .collect();
        contacts.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = query.limit {
            contacts.truncate(limit);
        }
        Ok(contacts)
    }

    async fn get_subscriber(&self, user_id: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.tables.lock().await.subscribers.get(user_id).cloned())
    }

    async fn insert_subscriber(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .subscribers
            .entry(subscriber.user_id.clone())
            .or_insert(subscriber);
        Ok(())
    }

    async fn notification_sent(&self, event_id: EventId) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .notifications
            .iter()
            .any(|n| n.event_id == event_id && n.sent))
    }

    async fn insert_notification(&self, log: NotificationLog) -> Result<(), StoreError> {
        self.tables.lock().await.notifications.push(log);
        Ok(())
    }
}
