//! Conversation engine: interprets one inbound text or postback against the
//! user's session and produces the replies, mutating the record store on
//! terminal steps.

use std::sync::Arc;

use agenda_config::Config;
use agenda_contracts::{
    ContactKind, Event, EventId, EventUpdate, Message, NewContact, NewEvent, MAX_CAROUSEL_BUBBLES,
};
use agenda_kernel::{
    authorize, format_thai_naive, local_offset, paginate, parse_user_date, split_terms, Access,
    Command, ContactDraft, EditDraft, EventDraft, Flow, Listing, ListingContext, ManageAction,
    MenuCommand, SearchScope, SessionState,
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::render;
use crate::sessions::SessionStore;
use crate::store::{ContactQuery, EventQuery, RecordStore};

/// Inbound user action after wire decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Postback(String),
    Follow,
    /// Stickers, images and anything else without text.
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub admin_ids: Vec<String>,
    pub page_size: usize,
    pub search_limit: usize,
    pub max_search_terms: usize,
    pub cache_limit: usize,
    pub offset: FixedOffset,
}

impl EngineSettings {
    /// A page never holds more events than one carousel can show.
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            admin_ids: cfg.bot.admin_ids.clone(),
            page_size: cfg.bot.page_size.clamp(1, MAX_CAROUSEL_BUBBLES),
            search_limit: cfg.bot.search_limit.max(1),
            max_search_terms: cfg.bot.max_search_terms.max(1),
            cache_limit: cfg.bot.cache_limit,
            offset: local_offset(cfg.bot.utc_offset_minutes),
        }
    }

    fn is_admin(&self, user: &str) -> bool {
        self.admin_ids.iter().any(|id| id == user)
    }
}

enum Removal {
    Removed,
    StillPresent,
}

pub struct Engine {
    store: Arc<dyn RecordStore>,
    sessions: Arc<SessionStore>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sessions: Arc<SessionStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            settings,
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.settings.offset)
    }

    pub async fn respond(&self, user: &str, inbound: Inbound) -> Vec<Message> {
        let today = self.now().date_naive();
        self.respond_on(user, inbound, today).await
    }

    /// Same as [`Engine::respond`] with an explicit local date.
    pub async fn respond_on(&self, user: &str, inbound: Inbound, today: NaiveDate) -> Vec<Message> {
        let (command, typed) = match inbound {
            Inbound::Text(text) => (Some(Command::parse(&text)), Some(text)),
            Inbound::Postback(data) => (Command::from_postback(&data), None),
            Inbound::Follow => (Some(Command::Greeting), None),
            Inbound::Unsupported => (None, None),
        };
        let state = self.sessions.get(user);

        match &command {
            Some(Command::DateSearch(date)) => return self.search_by_date(user, *date).await,
            Some(Command::Greeting) => {
                self.sessions.clear(user);
                return vec![render::with_menu(render::WELCOME)];
            }
            Some(Command::Menu(menu)) => return self.menu(user, *menu, today).await,
            Some(Command::NextPage) => return self.next_page(user, state).await,
            _ => {}
        }

        // Inside a flow, typed text answers the pending prompt.
        if let (Some(flow), Some(text)) = (state.flow.clone(), typed) {
            return self.continue_flow(user, flow, text.trim()).await;
        }

        match command {
            Some(Command::Manage { action, target }) => match target {
                Some(id) => self.manage(user, action, id).await,
                None => vec![render::usage(action)],
            },
            _ => self.fallback(user, state.flow.is_some()),
        }
    }

    fn owner_scope(&self, user: &str) -> Option<String> {
        (!self.settings.is_admin(user)).then(|| user.to_string())
    }

    fn fallback(&self, user: &str, flow_active: bool) -> Vec<Message> {
        if flow_active {
            info!(user, "Unrecognised input mid-flow, resetting session");
            self.sessions.clear(user);
            vec![render::with_menu(render::FLOW_RESET)]
        } else {
            vec![render::with_menu(render::NOT_UNDERSTOOD)]
        }
    }

    fn store_failure(&self, user: &str, operation: &str, err: StoreError) -> Vec<Message> {
        error!(user, operation, error = %err, "Record store operation failed");
        vec![render::with_menu(render::STORE_FAILURE)]
    }

    async fn menu(&self, user: &str, menu: MenuCommand, today: NaiveDate) -> Vec<Message> {
        let (flow, prompt) = match menu {
            MenuCommand::AddEvent => (
                Flow::CreateEvent(EventDraft::Title),
                render::PROMPT_EVENT_TITLE,
            ),
            MenuCommand::AddContact => (
                Flow::CreateContact {
                    kind: ContactKind::Contact,
                    draft: ContactDraft::Name,
                },
                render::PROMPT_CONTACT_NAME,
            ),
            MenuCommand::AddNote => (
                Flow::CreateContact {
                    kind: ContactKind::Note,
                    draft: ContactDraft::Name,
                },
                render::PROMPT_NOTE_NAME,
            ),
            MenuCommand::SearchEvents => (
                Flow::Search(SearchScope::Events),
                render::PROMPT_SEARCH_EVENTS,
            ),
            MenuCommand::SearchContacts => (
                Flow::Search(SearchScope::Contacts),
                render::PROMPT_SEARCH_CONTACTS,
            ),
            MenuCommand::SearchNotes => (
                Flow::Search(SearchScope::Notes),
                render::PROMPT_SEARCH_NOTES,
            ),
            MenuCommand::SearchByDate => {
                self.sessions.clear(user);
                return vec![Message::text_with(
                    render::PROMPT_PICK_DATE,
                    render::date_picker(today),
                )];
            }
            MenuCommand::ListAll => {
                self.sessions.clear(user);
                let query = EventQuery::owned_by(self.owner_scope(user).as_deref());
                return match self.store.list_events(query).await {
                    Ok(events) => self.show_listing(user, ListingContext::All, events),
                    Err(e) => self.store_failure(user, "list_events", e),
                };
            }
        };
        self.sessions.set(user, SessionState::in_flow(flow));
        vec![render::plain(prompt)]
    }

    async fn search_by_date(&self, user: &str, date: Option<NaiveDate>) -> Vec<Message> {
        self.sessions.clear(user);
        let Some(date) = date else {
            return vec![render::with_menu(render::INVALID_DATE)];
        };
        let query = EventQuery::owned_by(self.owner_scope(user).as_deref()).on_date(date);
        match self.store.list_events(query).await {
            Ok(events) => self.show_listing(user, ListingContext::ByDate(date), events),
            Err(e) => self.store_failure(user, "list_events", e),
        }
    }

    async fn requery(&self, user: &str, context: &ListingContext) -> Result<Vec<Event>, StoreError> {
        let query = EventQuery::owned_by(self.owner_scope(user).as_deref());
        let query = match context {
            ListingContext::All => query,
            ListingContext::ByDate(date) => query.on_date(*date),
            ListingContext::Search(text) => query
                .matching(split_terms(text, self.settings.max_search_terms))
                .limit(self.settings.search_limit),
        };
        self.store.list_events(query).await
    }

    fn heading(&self, context: &ListingContext) -> String {
        match context {
            ListingContext::All => "📋 กิจกรรมทั้งหมด".to_string(),
            ListingContext::ByDate(date) => {
                format!("📅 กิจกรรมวันที่: {}", format_thai_naive(*date))
            }
            ListingContext::Search(text) => format!("🔍 ผลการค้นหา: \"{text}\""),
        }
    }

    /// Renders page one of a fresh result set and remembers it for paging.
    /// Any flow in progress is dropped.
    fn show_listing(&self, user: &str, context: ListingContext, events: Vec<Event>) -> Vec<Message> {
        if events.is_empty() {
            self.sessions.clear(user);
            let message = match &context {
                ListingContext::All => render::with_menu(render::NO_EVENTS),
                ListingContext::ByDate(date) => render::no_events_on(*date),
                ListingContext::Search(text) => render::no_search_results(text),
            };
            return vec![message];
        }
        let messages = self.render_page(user, &context, &events, 1);
        let listing = Listing::new(context, events, self.settings.cache_limit);
        self.sessions.set(
            user,
            SessionState {
                flow: None,
                listing: Some(listing),
            },
        );
        messages
    }

    fn render_page(
        &self,
        user: &str,
        context: &ListingContext,
        events: &[Event],
        number: usize,
    ) -> Vec<Message> {
        let Some(page) = paginate(events, number, self.settings.page_size) else {
            return vec![render::with_menu(render::NO_MORE_RESULTS)];
        };
        let is_admin = self.settings.is_admin(user);
        let mut messages = vec![render::page_header(&self.heading(context), &page, is_admin)];
        messages.extend(render::event_carousel(&page.items, user, is_admin));
        messages
    }

    async fn next_page(&self, user: &str, state: SessionState) -> Vec<Message> {
        let mut listing = state.listing.unwrap_or(Listing {
            context: ListingContext::All,
            page: 1,
            cached: None,
        });
        let events = match listing.cached.clone() {
            Some(events) => events,
            None => match self.requery(user, &listing.context).await {
                Ok(events) => events,
                Err(e) => return self.store_failure(user, "list_events", e),
            },
        };
        let next = listing.page + 1;
        let messages = self.render_page(user, &listing.context, &events, next);
        if next <= events.len().div_ceil(self.settings.page_size) {
            listing.page = next;
        }
        self.sessions.set(
            user,
            SessionState {
                flow: None,
                listing: Some(listing),
            },
        );
        messages
    }

    async fn continue_flow(&self, user: &str, flow: Flow, text: &str) -> Vec<Message> {
        if text.is_empty() {
            return vec![render::plain(render::EMPTY_INPUT)];
        }
        match flow {
            Flow::CreateEvent(draft) => self.event_step(user, draft, text).await,
            Flow::CreateContact { kind, draft } => self.contact_step(user, kind, draft, text).await,
            Flow::Search(scope) => self.search(user, scope, text).await,
            Flow::EditEvent(draft) => self.edit_step(user, draft, text).await,
        }
    }

    async fn event_step(&self, user: &str, draft: EventDraft, text: &str) -> Vec<Message> {
        match draft {
            EventDraft::Title => {
                self.advance(
                    user,
                    Flow::CreateEvent(EventDraft::Description {
                        title: text.to_string(),
                    }),
                    render::PROMPT_EVENT_DESCRIPTION,
                )
            }
            EventDraft::Description { title } => self.advance(
                user,
                Flow::CreateEvent(EventDraft::Date {
                    title,
                    description: text.to_string(),
                }),
                render::PROMPT_EVENT_DATE,
            ),
            EventDraft::Date { title, description } => {
                let Some(date) = parse_user_date(text) else {
                    return vec![render::plain(render::INVALID_DATE)];
                };
                let new_event = NewEvent {
                    title,
                    description,
                    date,
                    owner: user.to_string(),
                };
                match self.store.insert_event(new_event).await {
                    Ok(event) => {
                        info!(user, event_id = event.id, "Event created");
                        self.sessions.clear(user);
                        vec![render::event_saved(&event.title, &event.description, event.date)]
                    }
                    Err(e) => self.store_failure(user, "insert_event", e),
                }
            }
        }
    }

    async fn edit_step(&self, user: &str, draft: EditDraft, text: &str) -> Vec<Message> {
        let EditDraft { event_id, stage } = draft;
        match stage {
            EventDraft::Title => self.advance(
                user,
                Flow::EditEvent(EditDraft {
                    event_id,
                    stage: EventDraft::Description {
                        title: text.to_string(),
                    },
                }),
                render::PROMPT_EDIT_DESCRIPTION,
            ),
            EventDraft::Description { title } => self.advance(
                user,
                Flow::EditEvent(EditDraft {
                    event_id,
                    stage: EventDraft::Date {
                        title,
                        description: text.to_string(),
                    },
                }),
                render::PROMPT_EDIT_DATE,
            ),
            EventDraft::Date { title, description } => {
                let Some(date) = parse_user_date(text) else {
                    return vec![render::plain(render::INVALID_DATE)];
                };
                // Rights are checked again against the stored record.
                let event = match self.load_authorized(user, ManageAction::Edit, event_id).await {
                    Ok((event, _)) => event,
                    Err(messages) => {
                        self.sessions.clear(user);
                        return messages;
                    }
                };
                let update = EventUpdate {
                    title,
                    description,
                    date,
                };
                match self.store.update_event(event.id, update.clone()).await {
                    Ok(()) => {
                        info!(user, event_id, "Event updated");
                        self.sessions.clear(user);
                        vec![render::event_updated(&update.title, &update.description, update.date)]
                    }
                    Err(StoreError::NotFound(_)) => {
                        self.sessions.clear(user);
                        vec![render::with_menu(render::NOT_FOUND)]
                    }
                    Err(e) => self.store_failure(user, "update_event", e),
                }
            }
        }
    }

    async fn contact_step(
        &self,
        user: &str,
        kind: ContactKind,
        draft: ContactDraft,
        text: &str,
    ) -> Vec<Message> {
        match draft {
            ContactDraft::Name => {
                let prompt = match kind {
                    ContactKind::Contact => render::PROMPT_CONTACT_PHONE,
                    ContactKind::Note => render::PROMPT_NOTE_BODY,
                };
                self.advance(
                    user,
                    Flow::CreateContact {
                        kind,
                        draft: ContactDraft::Payload {
                            name: text.to_string(),
                        },
                    },
                    prompt,
                )
            }
            ContactDraft::Payload { name } => {
                let new_contact = NewContact {
                    name,
                    payload: text.to_string(),
                    kind,
                    owner: user.to_string(),
                };
                match self.store.insert_contact(new_contact).await {
                    Ok(contact) => {
                        info!(user, contact_id = contact.id, kind = kind.as_str(), "Contact created");
                        self.sessions.clear(user);
                        vec![render::contact_saved(&contact)]
                    }
                    Err(e) => self.store_failure(user, "insert_contact", e),
                }
            }
        }
    }

    fn advance(&self, user: &str, flow: Flow, prompt: &str) -> Vec<Message> {
        self.sessions.set(user, SessionState::in_flow(flow));
        vec![render::plain(prompt)]
    }

    async fn search(&self, user: &str, scope: SearchScope, text: &str) -> Vec<Message> {
        let terms = split_terms(text, self.settings.max_search_terms);
        if terms.is_empty() {
            return vec![render::plain(render::SEARCH_TOO_SHORT)];
        }
        match scope.contact_kind() {
            None => {
                let query = EventQuery::owned_by(self.owner_scope(user).as_deref())
                    .matching(terms)
                    .limit(self.settings.search_limit);
                match self.store.list_events(query).await {
                    Ok(events) => {
                        self.show_listing(user, ListingContext::Search(text.to_string()), events)
                    }
                    Err(e) => {
                        self.sessions.clear(user);
                        self.store_failure(user, "list_events", e)
                    }
                }
            }
            Some(kind) => {
                // Contacts are a shared directory; notes stay private.
                let owner = match kind {
                    ContactKind::Contact => None,
                    ContactKind::Note => self.owner_scope(user),
                };
                let query = ContactQuery {
                    kind,
                    owner,
                    terms,
                    limit: Some(self.settings.search_limit),
                };
                self.sessions.clear(user);
                match self.store.search_contacts(query).await {
                    Ok(contacts) => vec![render::contact_results(kind, text, &contacts)],
                    Err(e) => self.store_failure(user, "search_contacts", e),
                }
            }
        }
    }

    /// Loads `id` and checks `user` may apply `action` to it. The error side
    /// carries the reply to send instead.
    async fn load_authorized(
        &self,
        user: &str,
        action: ManageAction,
        id: EventId,
    ) -> Result<(Event, bool), Vec<Message>> {
        let event = match self.store.get_event(id).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(vec![render::with_menu(render::NOT_FOUND)]),
            Err(e) => return Err(self.store_failure(user, "get_event", e)),
        };
        match authorize(action, user, &event.owner, self.settings.is_admin(user)) {
            Access::Allowed { on_behalf } => Ok((event, on_behalf)),
            Access::NotOwner => {
                warn!(user, event_id = id, ?action, "Denied: not the owner");
                Err(vec![render::with_menu(render::NOT_OWNER)])
            }
            Access::AdminCannotEdit => {
                warn!(user, event_id = id, "Denied: admin edit of another user's event");
                Err(vec![render::with_menu(render::ADMIN_CANNOT_EDIT)])
            }
        }
    }

    async fn manage(&self, user: &str, action: ManageAction, id: EventId) -> Vec<Message> {
        let (event, on_behalf) = match self.load_authorized(user, action, id).await {
            Ok(found) => found,
            Err(messages) => return messages,
        };
        match action {
            ManageAction::Edit => {
                self.sessions.set(
                    user,
                    SessionState::in_flow(Flow::EditEvent(EditDraft {
                        event_id: id,
                        stage: EventDraft::Title,
                    })),
                );
                vec![render::edit_started(&event)]
            }
            ManageAction::Delete => vec![render::confirm_delete(&event, on_behalf)],
            ManageAction::ConfirmDelete | ManageAction::Complete => {
                match self.remove_verified(id).await {
                    Ok(Removal::Removed) => {
                        info!(user, event_id = id, ?action, on_behalf, "Event removed");
                        self.sessions.clear(user);
                        if action == ManageAction::Complete {
                            vec![render::completed(&event, on_behalf)]
                        } else {
                            vec![render::deleted(&event, on_behalf)]
                        }
                    }
                    Ok(Removal::StillPresent) => {
                        error!(user, event_id = id, "Event still present after delete");
                        vec![render::with_menu(render::DELETE_UNVERIFIED)]
                    }
                    Err(e) => self.store_failure(user, "delete_event", e),
                }
            }
        }
    }

    /// Deletes and re-reads, so a silently ignored delete is not reported as
    /// success.
    async fn remove_verified(&self, id: EventId) -> Result<Removal, StoreError> {
        self.store.delete_event(id).await?;
        match self.store.get_event(id).await? {
            Some(_) => Ok(Removal::StillPresent),
            None => Ok(Removal::Removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockRecordStore};
    use agenda_contracts::Action;
    use std::time::Duration;

    const ADMIN: &str = "Uadmin0001";

    fn settings() -> EngineSettings {
        EngineSettings {
            admin_ids: vec![ADMIN.to_string()],
            page_size: 2,
            search_limit: 10,
            max_search_terms: 3,
            cache_limit: 100,
            offset: local_offset(420),
        }
    }

    fn engine_with(store: Arc<dyn RecordStore>) -> (Engine, Arc<SessionStore>) {
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(600)));
        (
            Engine::new(store, Arc::clone(&sessions), settings()),
            sessions,
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    async fn say(engine: &Engine, user: &str, text: &str) -> Vec<Message> {
        engine
            .respond_on(user, Inbound::Text(text.to_string()), today())
            .await
    }

    fn first_text(messages: &[Message]) -> &str {
        messages
            .iter()
            .find_map(Message::as_text)
            .expect("a text message")
    }

    async fn seed(store: &MemoryStore, owner: &str, title: &str, date: &str) -> Event {
        store
            .insert_event(NewEvent {
                title: title.to_string(),
                description: "d".to_string(),
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                owner: owner.to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn event_creation_inserts_once_and_returns_to_idle() {
        let store = Arc::new(MemoryStore::default());
        let (engine, sessions) = engine_with(store.clone());

        say(&engine, "U1", "เพิ่มกิจกรรม").await;
        say(&engine, "U1", "Team lunch").await;
        say(&engine, "U1", "at noon").await;
        let reply = say(&engine, "U1", "15/05/2025").await;

        assert!(first_text(&reply).contains("บันทึกเรียบร้อย"));
        assert!(sessions.get("U1").is_idle());
        let events = store.list_events(EventQuery::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Team lunch");
        assert_eq!(events[0].description, "at noon");
        assert_eq!(events[0].date, NaiveDate::from_ymd_opt(2025, 5, 15).unwrap());
        assert_eq!(events[0].owner, "U1");
    }

    #[tokio::test]
    async fn malformed_date_keeps_the_date_step() {
        let mut mock = MockRecordStore::new();
        mock.expect_insert_event().never();
        let (engine, sessions) = engine_with(Arc::new(mock));

        say(&engine, "U1", "เพิ่มกิจกรรม").await;
        say(&engine, "U1", "title").await;
        say(&engine, "U1", "desc").await;
        let before = sessions.get("U1");
        for bad in ["2025-02-30", "tomorrow", "15.05.2025"] {
            let reply = say(&engine, "U1", bad).await;
            assert_eq!(first_text(&reply), render::INVALID_DATE);
            assert_eq!(sessions.get("U1"), before);
        }
    }

    #[tokio::test]
    async fn edit_date_step_rejects_bad_dates_too() {
        let store = Arc::new(MemoryStore::default());
        let event = seed(&store, "U1", "old", "2025-05-02").await;
        let (engine, sessions) = engine_with(store.clone());

        say(&engine, "U1", &format!("แก้ไข {}", event.id)).await;
        say(&engine, "U1", "new title").await;
        say(&engine, "U1", "new desc").await;
        let reply = say(&engine, "U1", "32/01/2025").await;
        assert_eq!(first_text(&reply), render::INVALID_DATE);
        assert_eq!(
            sessions.get("U1").step(),
            Some(agenda_kernel::Step::AwaitingEditDate)
        );

        say(&engine, "U1", "2025-06-01").await;
        let stored = store.get_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "new title");
        assert_eq!(stored.owner, "U1");
        assert!(sessions.get("U1").is_idle());
    }

    #[tokio::test]
    async fn delete_needs_confirmation_and_verifies_absence() {
        let store = Arc::new(MemoryStore::default());
        let event = seed(&store, "U1", "dentist", "2025-05-02").await;
        let (engine, _) = engine_with(store.clone());

        let prompt = say(&engine, "U1", &format!("ลบ {}", event.id)).await;
        let Message::Text(prompt) = &prompt[0] else {
            panic!("expected text prompt");
        };
        let confirm = prompt.quick_reply.as_ref().unwrap().texts()[0].to_string();
        assert!(store.get_event(event.id).await.unwrap().is_some());

        let reply = say(&engine, "U1", &confirm).await;
        assert!(first_text(&reply).contains("ลบกิจกรรมเรียบร้อย"));
        assert!(store.get_event(event.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn silent_delete_failure_is_reported() {
        let event = Event {
            id: 9,
            title: "sticky".to_string(),
            description: String::new(),
            date: today(),
            owner: "U1".to_string(),
        };
        let mut mock = MockRecordStore::new();
        let found = event.clone();
        mock.expect_get_event()
            .returning(move |_| Ok(Some(found.clone())));
        mock.expect_delete_event().times(1).returning(|_| Ok(()));
        let (engine, _) = engine_with(Arc::new(mock));

        let reply = say(&engine, "U1", "ยืนยันลบ 9").await;
        assert_eq!(first_text(&reply), render::DELETE_UNVERIFIED);
    }

    #[tokio::test]
    async fn strangers_are_denied_without_mutation() {
        let event = Event {
            id: 3,
            title: "private".to_string(),
            description: String::new(),
            date: today(),
            owner: "U1".to_string(),
        };
        let mut mock = MockRecordStore::new();
        mock.expect_get_event()
            .returning(move |_| Ok(Some(event.clone())));
        mock.expect_delete_event().never();
        mock.expect_update_event().never();
        let (engine, sessions) = engine_with(Arc::new(mock));

        for command in ["แก้ไข 3", "ลบ 3", "ยืนยันลบ 3", "เสร็จ 3"] {
            let reply = say(&engine, "U2", command).await;
            assert_eq!(first_text(&reply), render::NOT_OWNER);
        }
        assert!(sessions.get("U2").is_idle());
    }

    #[tokio::test]
    async fn admin_completes_others_but_cannot_edit() {
        let store = Arc::new(MemoryStore::default());
        let first = seed(&store, "U1", "a", "2025-05-02").await;
        let second = seed(&store, "U1", "b", "2025-05-03").await;
        let (engine, _) = engine_with(store.clone());

        let reply = say(&engine, ADMIN, &format!("แก้ไข {}", first.id)).await;
        assert_eq!(first_text(&reply), render::ADMIN_CANNOT_EDIT);

        let reply = engine
            .respond_on(
                ADMIN,
                Inbound::Postback(ManageAction::Complete.postback_for(first.id)),
                today(),
            )
            .await;
        assert!(first_text(&reply).contains("(Admin)"));
        assert!(store.get_event(first.id).await.unwrap().is_none());

        say(&engine, ADMIN, &format!("ยืนยันลบ {}", second.id)).await;
        assert!(store.get_event(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pagination_walks_pages_then_reports_the_end() {
        let store = Arc::new(MemoryStore::default());
        for day in 1..=5 {
            seed(&store, "U1", &format!("e{day}"), &format!("2025-05-{day:02}")).await;
        }
        let (engine, _) = engine_with(store.clone());

        let first = say(&engine, "U1", "ดูกิจกรรมทั้งหมด").await;
        assert!(first_text(&first).contains("หน้า 1: 1-2 จาก 5"));
        let second = say(&engine, "U1", "หน้าถัดไป").await;
        assert!(first_text(&second).contains("หน้า 2: 3-4 จาก 5"));
        let third = say(&engine, "U1", "หน้าถัดไป").await;
        assert!(first_text(&third).contains("หน้า 3: 5-5 จาก 5"));
        let beyond = say(&engine, "U1", "หน้าถัดไป").await;
        assert_eq!(first_text(&beyond), render::NO_MORE_RESULTS);
    }

    #[tokio::test]
    async fn oversized_page_setting_still_shows_every_event() {
        let store = Arc::new(MemoryStore::default());
        for day in 1..=20 {
            seed(&store, "U1", &format!("e{day}"), &format!("2025-05-{day:02}")).await;
        }
        let cfg = Config {
            bot: agenda_config::Bot {
                page_size: 15,
                ..agenda_config::Bot::default()
            },
            ..Config::default()
        };
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(600)));
        let engine = Engine::new(store, sessions, EngineSettings::from_config(&cfg));

        let mut shown = Vec::new();
        let mut headers = Vec::new();
        for text in ["ดูกิจกรรมทั้งหมด", "หน้าถัดไป", "หน้าถัดไป"] {
            let reply = say(&engine, "U1", text).await;
            headers.push(first_text(&reply).to_string());
            for message in &reply {
                if let Message::Flex(flex) = message {
                    for bubble in flex.contents["contents"].as_array().unwrap() {
                        let title = bubble["body"]["contents"][0]["text"].as_str().unwrap();
                        shown.push(title.to_string());
                    }
                }
            }
        }

        assert!(headers[0].contains("หน้า 1: 1-12 จาก 20"));
        assert!(headers[1].contains("หน้า 2: 13-20 จาก 20"));
        assert_eq!(headers[2], render::NO_MORE_RESULTS);
        let expected: Vec<String> = (1..=20).map(|i| format!("e{i}")).collect();
        assert_eq!(shown, expected);
    }

    #[tokio::test]
    async fn failed_menu_listing_still_abandons_the_flow() {
        let mut mock = MockRecordStore::new();
        mock.expect_list_events().returning(|_| {
            Err(StoreError::Status {
                status: 503,
                body: "down".to_string(),
            })
        });
        mock.expect_insert_event().never();
        let (engine, sessions) = engine_with(Arc::new(mock));

        say(&engine, "U1", "เพิ่มกิจกรรม").await;
        say(&engine, "U1", "title").await;
        say(&engine, "U1", "desc").await;
        let reply = say(&engine, "U1", "ดูกิจกรรมทั้งหมด").await;
        assert_eq!(first_text(&reply), render::STORE_FAILURE);
        assert_eq!(sessions.get("U1").step(), None);

        say(&engine, "U1", "เพิ่มกิจกรรม").await;
        say(&engine, "U1", "title").await;
        say(&engine, "U1", "desc").await;
        let reply = say(&engine, "U1", "วันที่:2025-05-03").await;
        assert_eq!(first_text(&reply), render::STORE_FAILURE);
        assert!(sessions.get("U1").is_idle());

        let reply = say(&engine, "U1", "2025-05-03").await;
        assert_eq!(first_text(&reply), render::NOT_UNDERSTOOD);
    }

    #[tokio::test]
    async fn next_page_uses_cache_without_requerying() {
        let events: Vec<Event> = (1..=3)
            .map(|i| Event {
                id: i,
                title: format!("e{i}"),
                description: String::new(),
                date: today(),
                owner: "U1".to_string(),
            })
            .collect();
        let mut mock = MockRecordStore::new();
        mock.expect_list_events()
            .times(1)
            .returning(move |_| Ok(events.clone()));
        let (engine, _) = engine_with(Arc::new(mock));

        say(&engine, "U1", "ดูกิจกรรมทั้งหมด").await;
        let second = say(&engine, "U1", "หน้าถัดไป").await;
        assert!(first_text(&second).contains("หน้า 2: 3-3 จาก 3"));
    }

    #[tokio::test]
    async fn next_page_without_cache_requeries_same_context() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 9).unwrap();
        let mut mock = MockRecordStore::new();
        mock.expect_list_events()
            .withf(move |q| q.date == Some(date) && q.owner.as_deref() == Some("U1"))
            .times(1)
            .returning(move |_| {
                Ok((1..=3)
                    .map(|i| Event {
                        id: i,
                        title: format!("e{i}"),
                        description: String::new(),
                        date,
                        owner: "U1".to_string(),
                    })
                    .collect())
            });
        let (engine, sessions) = engine_with(Arc::new(mock));
        sessions.set(
            "U1",
            SessionState {
                flow: None,
                listing: Some(Listing {
                    context: ListingContext::ByDate(date),
                    page: 1,
                    cached: None,
                }),
            },
        );

        let reply = say(&engine, "U1", "หน้าถัดไป").await;
        assert!(first_text(&reply).contains("หน้า 2: 3-3 จาก 3"));
    }

    #[tokio::test]
    async fn users_list_only_their_own_events_admins_see_all() {
        let store = Arc::new(MemoryStore::default());
        seed(&store, "U1", "mine", "2025-05-02").await;
        seed(&store, "U2", "theirs", "2025-05-02").await;
        let (engine, _) = engine_with(store.clone());

        let mine = say(&engine, "U1", "วันที่:2025-05-02").await;
        assert!(first_text(&mine).contains("1-1 จาก 1"));
        let all = say(&engine, ADMIN, "วันที่:2025-05-02").await;
        assert!(first_text(&all).contains("1-2 จาก 2"));
        assert!(first_text(&all).contains("👑"));
    }

    #[tokio::test]
    async fn date_token_wins_inside_a_flow() {
        let store = Arc::new(MemoryStore::default());
        let (engine, sessions) = engine_with(store);
        say(&engine, "U1", "เพิ่มกิจกรรม").await;
        let reply = say(&engine, "U1", "วันที่:2025-05-03").await;
        assert!(first_text(&reply).contains("ไม่มีกิจกรรมวันที่"));
        assert!(sessions.get("U1").flow.is_none());
    }

    #[tokio::test]
    async fn search_splits_terms_and_clears_the_flow() {
        let store = Arc::new(MemoryStore::default());
        seed(&store, "U1", "Weekly sync", "2025-05-02").await;
        seed(&store, "U1", "Dentist", "2025-05-03").await;
        let (engine, sessions) = engine_with(store);

        say(&engine, "U1", "ค้นหากิจกรรม").await;
        let reply = say(&engine, "U1", "SYNC dent").await;
        assert!(first_text(&reply).contains("จาก 2"));
        assert!(sessions.get("U1").flow.is_none());

        say(&engine, "U1", "ค้นหากิจกรรม").await;
        let reply = say(&engine, "U1", "nothing-here").await;
        assert!(first_text(&reply).contains("ไม่พบกิจกรรม"));
        assert!(sessions.get("U1").is_idle());
    }

    #[tokio::test]
    async fn contacts_are_shared_notes_are_private() {
        let store = Arc::new(MemoryStore::default());
        let (engine, _) = engine_with(store);
        for (menu, name, payload) in [
            ("เพิ่มเบอร์", "plumber", "0811111111"),
            ("เพิ่มโน้ต", "wifi", "secret-pass"),
        ] {
            say(&engine, "U1", menu).await;
            say(&engine, "U1", name).await;
            let saved = say(&engine, "U1", payload).await;
            assert!(first_text(&saved).contains("เรียบร้อย"));
        }

        say(&engine, "U2", "ค้นหาเบอร์").await;
        let reply = say(&engine, "U2", "plumber").await;
        assert!(first_text(&reply).contains("0811111111"));

        say(&engine, "U2", "ค้นหาโน้ต").await;
        let reply = say(&engine, "U2", "wifi").await;
        assert!(first_text(&reply).contains("ไม่พบโน้ต"));

        say(&engine, "U1", "ค้นหาโน้ต").await;
        let reply = say(&engine, "U1", "wifi").await;
        assert!(first_text(&reply).contains("secret-pass"));
    }

    #[tokio::test]
    async fn unsupported_input_mid_flow_resets_once() {
        let store = Arc::new(MemoryStore::default());
        let (engine, sessions) = engine_with(store);
        say(&engine, "U1", "เพิ่มเบอร์").await;

        let reply = engine.respond_on("U1", Inbound::Unsupported, today()).await;
        assert_eq!(first_text(&reply), render::FLOW_RESET);
        assert!(sessions.get("U1").is_idle());

        let reply = engine
            .respond_on("U1", Inbound::Postback("bogus".to_string()), today())
            .await;
        assert_eq!(first_text(&reply), render::NOT_UNDERSTOOD);
    }

    #[tokio::test]
    async fn greeting_resets_and_shows_menu() {
        let store = Arc::new(MemoryStore::default());
        let (engine, sessions) = engine_with(store);
        say(&engine, "U1", "ค้นหาเบอร์").await;
        let reply = say(&engine, "U1", "Hello").await;
        assert!(sessions.get("U1").is_idle());
        let Message::Text(text) = &reply[0] else {
            panic!("expected text");
        };
        assert_eq!(text.text, render::WELCOME);
        assert!(text.quick_reply.is_some());
    }

    #[tokio::test]
    async fn date_picker_chips_are_message_actions() {
        let (engine, _) = engine_with(Arc::new(MemoryStore::default()));
        let reply = say(&engine, "U1", "ค้นหาตามวันที่").await;
        let Message::Text(text) = &reply[0] else {
            panic!("expected text");
        };
        let chips = &text.quick_reply.as_ref().unwrap().items;
        assert_eq!(chips.len(), 7);
        assert!(matches!(&chips[0].action, Action::Message { text, .. } if text == "วันที่:2025-05-01"));
    }

    #[tokio::test]
    async fn store_failures_surface_a_generic_message() {
        let mut mock = MockRecordStore::new();
        mock.expect_list_events().returning(|_| {
            Err(StoreError::Status {
                status: 503,
                body: "down".to_string(),
            })
        });
        let (engine, _) = engine_with(Arc::new(mock));
        let reply = say(&engine, "U1", "ดูกิจกรรมทั้งหมด").await;
        assert_eq!(first_text(&reply), render::STORE_FAILURE);
    }

    #[tokio::test]
    async fn missing_id_shows_usage() {
        let (engine, _) = engine_with(Arc::new(MemoryStore::default()));
        let reply = say(&engine, "U1", "ลบ abc").await;
        assert!(first_text(&reply).contains("ใช้: ลบ 123"));
    }
}
