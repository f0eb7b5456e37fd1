use agenda_contracts::{
    Contact, ContactKind, Event, EventId, EventUpdate, NewContact, NewEvent, NotificationLog,
    Subscriber,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use super::{ContactQuery, EventQuery, RecordStore};
use crate::error::StoreError;

/// Single-file store with the same column names as the hosted tables.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_title TEXT NOT NULL,
                event_description TEXT NOT NULL DEFAULT '',
                event_date TEXT NOT NULL,
                created_by TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS events_by_date ON events(event_date);
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'contact',
                created_by TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS subscribers (
                user_id TEXT PRIMARY KEY,
                subscribed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                message TEXT NOT NULL,
                sent INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Appends `(lower(a) LIKE ? OR lower(b) LIKE ? ...)` for every term.
fn push_terms(clauses: &mut Vec<String>, values: &mut Vec<Value>, columns: &[&str], terms: &[String]) {
    if terms.is_empty() {
        return;
    }
    let mut alternatives = Vec::new();
    for term in terms {
        for column in columns {
            alternatives.push(format!("lower({column}) LIKE ? ESCAPE '\\'"));
            values.push(Value::Text(like_pattern(term)));
        }
    }
    clauses.push(format!("({})", alternatives.join(" OR ")));
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn text_column<T, E>(row: &Row<'_>, idx: usize, parse: impl Fn(&str) -> Result<T, E>) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: text_column(row, 3, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))?,
        owner: row.get(4)?,
    })
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let kind: String = row.get(3)?;
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        payload: row.get(2)?,
        kind: ContactKind::parse(&kind).unwrap_or_default(),
        owner: row.get(4)?,
    })
}

const EVENT_COLUMNS: &str = "id, event_title, event_description, event_date, created_by";

#[async_trait]
impl RecordStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events(event_title, event_description, event_date, created_by) VALUES (?1, ?2, ?3, ?4)",
            params![event.title, event.description, event.date.to_string(), event.owner],
        )?;
        Ok(event.into_event(conn.last_insert_rowid()))
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let conn = self.conn.lock().await;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![id],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE events SET event_title = ?1, event_description = ?2, event_date = ?3 WHERE id = ?4",
            params![update.title, update.description, update.date.to_string(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("event"));
        }
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn list_events(&self, query: EventQuery) -> Result<Vec<Event>, StoreError> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(owner) = &query.owner {
            clauses.push("created_by = ?".to_string());
            values.push(Value::Text(owner.clone()));
        }
        if let Some(date) = query.date {
            clauses.push("event_date = ?".to_string());
            values.push(Value::Text(date.to_string()));
        }
        if let Some(from) = query.from_date {
            clauses.push("event_date >= ?".to_string());
            values.push(Value::Text(from.to_string()));
        }
        push_terms(
            &mut clauses,
            &mut values,
            &["event_title", "event_description"],
            &query.terms,
        );
        let mut sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events{} ORDER BY event_date ASC, id ASC",
            where_clause(&clauses)
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(values.iter()), event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn insert_contact(&self, contact: NewContact) -> Result<Contact, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO contacts(name, phone_number, kind, created_by) VALUES (?1, ?2, ?3, ?4)",
            params![contact.name, contact.payload, contact.kind.as_str(), contact.owner],
        )?;
        Ok(contact.into_contact(conn.last_insert_rowid()))
    }

    async fn search_contacts(&self, query: ContactQuery) -> Result<Vec<Contact>, StoreError> {
        let mut clauses = vec!["kind = ?".to_string()];
        let mut values = vec![Value::Text(query.kind.as_str().to_string())];
        if let Some(owner) = &query.owner {
            clauses.push("created_by = ?".to_string());
            values.push(Value::Text(owner.clone()));
        }
        push_terms(
            &mut clauses,
            &mut values,
            &["name", "phone_number"],
            &query.terms,
        );
        let mut sql = format!(
            "SELECT id, name, phone_number, kind, created_by FROM contacts{} ORDER BY id DESC",
            where_clause(&clauses)
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let contacts = stmt
            .query_map(params_from_iter(values.iter()), contact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contacts)
    }

    async fn get_subscriber(&self, user_id: &str) -> Result<Option<Subscriber>, StoreError> {
        let conn = self.conn.lock().await;
        let subscriber = conn
            .query_row(
                "SELECT user_id, subscribed_at FROM subscribers WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Subscriber {
                        user_id: row.get(0)?,
                        subscribed_at: text_column(row, 1, DateTime::parse_from_rfc3339)?,
                    })
                },
            )
            .optional()?;
        Ok(subscriber)
    }

    async fn insert_subscriber(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO subscribers(user_id, subscribed_at) VALUES (?1, ?2)",
            params![subscriber.user_id, subscriber.subscribed_at.to_rfc3339()],
        )?;
        Ok(())
    }

    async fn notification_sent(&self, event_id: EventId) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM notifications WHERE event_id = ?1 AND sent = 1 LIMIT 1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert_notification(&self, log: NotificationLog) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO notifications(event_id, user_id, sent_at, message, sent) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                log.event_id,
                log.user_id,
                log.sent_at.to_rfc3339(),
                log.message,
                log.sent
            ],
        )?;
        Ok(())
    }
}
