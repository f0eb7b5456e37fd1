use std::time::Duration;

use agenda_contracts::{
    Contact, Event, EventId, EventUpdate, NewContact, NewEvent, NotificationLog, Subscriber,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ContactQuery, EventQuery, RecordStore};
use crate::error::StoreError;

/// Hosted PostgREST tables (`/rest/v1/<table>`), authenticated with a
/// service key.
pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

type Filters = Vec<(&'static str, String)>;

/// PostgREST `or=(...)` filter: any term as a substring of any column.
fn or_filter(columns: &[&str], terms: &[String]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = terms
        .iter()
        .flat_map(|term| {
            columns
                .iter()
                .map(move |column| format!("{column}.ilike.\"*{term}*\""))
        })
        .collect();
    Some(format!("({})", alternatives.join(",")))
}

fn event_filters(query: &EventQuery) -> Filters {
    let mut filters: Filters = vec![("select", "*".to_string())];
    if let Some(owner) = &query.owner {
        filters.push(("created_by", format!("eq.{owner}")));
    }
    if let Some(date) = query.date {
        filters.push(("event_date", format!("eq.{date}")));
    }
    if let Some(from) = query.from_date {
        filters.push(("event_date", format!("gte.{from}")));
    }
    if let Some(or) = or_filter(&["event_title", "event_description"], &query.terms) {
        filters.push(("or", or));
    }
    filters.push(("order", "event_date.asc,id.asc".to_string()));
    if let Some(limit) = query.limit {
        filters.push(("limit", limit.to_string()));
    }
    filters
}

fn contact_filters(query: &ContactQuery) -> Filters {
    let mut filters: Filters = vec![
        ("select", "*".to_string()),
        ("kind", format!("eq.{}", query.kind.as_str())),
    ];
    if let Some(owner) = &query.owner {
        filters.push(("created_by", format!("eq.{owner}")));
    }
    if let Some(or) = or_filter(&["name", "phone_number"], &query.terms) {
        filters.push(("or", or));
    }
    filters.push(("order", "id.desc".to_string()));
    if let Some(limit) = query.limit {
        filters.push(("limit", limit.to_string()));
    }
    filters
}

impl RestStore {
    pub fn new(base_url: &str, service_key: &str, timeout_ms: u64) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send(request: RequestBuilder) -> Result<String, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, StoreError> {
        let body = Self::send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Inserts one row and returns the stored representation.
    async fn insert_returning<B, T>(&self, table: &str, row: &B) -> Result<T, StoreError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rows: Vec<T> = Self::fetch(
            self.table(Method::POST, table)
                .header("Prefer", "return=representation")
                .json(row),
        )
        .await?;
        rows.into_iter().next().ok_or(StoreError::NotFound("inserted row"))
    }
}

#[async_trait]
impl RecordStore for RestStore {
    fn kind(&self) -> &'static str {
        "rest"
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        self.insert_returning("events", &event).await
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let rows: Vec<Event> = Self::fetch(
            self.table(Method::GET, "events")
                .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), StoreError> {
        let rows: Vec<Value> = Self::fetch(
            self.table(Method::PATCH, "events")
                .query(&[("id", format!("eq.{id}")), ("select", "id".to_string())])
                .header("Prefer", "return=representation")
                .json(&update),
        )
        .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound("event"));
        }
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> Result<(), StoreError> {
        Self::send(
            self.table(Method::DELETE, "events")
                .query(&[("id", format!("eq.{id}"))]),
        )
        .await?;
        Ok(())
    }

    async fn list_events(&self, query: EventQuery) -> Result<Vec<Event>, StoreError> {
        Self::fetch(self.table(Method::GET, "events").query(&event_filters(&query))).await
    }

    async fn insert_contact(&self, contact: NewContact) -> Result<Contact, StoreError> {
        self.insert_returning("contacts", &contact).await
    }

    async fn search_contacts(&self, query: ContactQuery) -> Result<Vec<Contact>, StoreError> {
        Self::fetch(self.table(Method::GET, "contacts").query(&contact_filters(&query))).await
    }

    async fn get_subscriber(&self, user_id: &str) -> Result<Option<Subscriber>, StoreError> {
        let rows: Vec<Subscriber> = Self::fetch(self.table(Method::GET, "subscribers").query(&[
            ("select", "user_id,subscribed_at".to_string()),
            ("user_id", format!("eq.{user_id}")),
        ]))
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_subscriber(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        Self::send(
            self.table(Method::POST, "subscribers")
                .header("Prefer", "resolution=ignore-duplicates")
                .json(&subscriber),
        )
        .await?;
        Ok(())
    }

    async fn notification_sent(&self, event_id: EventId) -> Result<bool, StoreError> {
        let rows: Vec<Value> = Self::fetch(
            self.table(Method::GET, "notifications").query(&[
                ("select", "event_id".to_string()),
                ("event_id", format!("eq.{event_id}")),
                ("sent", "eq.true".to_string()),
                ("limit", "1".to_string()),
            ]),
        )
        .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_notification(&self, log: NotificationLog) -> Result<(), StoreError> {
        Self::send(self.table(Method::POST, "notifications").json(&log)).await?;
        Ok(())
    }
}
