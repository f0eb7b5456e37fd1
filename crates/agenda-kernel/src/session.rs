//! Per-user conversation state. A flow is a typed draft whose variant *is*
//! the step, so a handler can never read a field the user has not entered.

use agenda_contracts::{ContactKind, Event, EventId};
use chrono::NaiveDate;

/// Flat step token, one per prompt the bot can be waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AwaitingEventTitle,
    AwaitingEventDescription,
    AwaitingEventDate,
    AwaitingContactName,
    AwaitingContactPhone,
    AwaitingNoteName,
    AwaitingNoteBody,
    AwaitingSearchEventsQuery,
    AwaitingSearchContactsQuery,
    AwaitingSearchNotesQuery,
    AwaitingEditTitle,
    AwaitingEditDescription,
    AwaitingEditDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDraft {
    Title,
    Description { title: String },
    Date { title: String, description: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactDraft {
    Name,
    Payload { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub event_id: EventId,
    pub stage: EventDraft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Events,
    Contacts,
    Notes,
}

impl SearchScope {
    pub fn contact_kind(self) -> Option<ContactKind> {
        match self {
            SearchScope::Events => None,
            SearchScope::Contacts => Some(ContactKind::Contact),
            SearchScope::Notes => Some(ContactKind::Note),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    CreateEvent(EventDraft),
    CreateContact {
        kind: ContactKind,
        draft: ContactDraft,
    },
    Search(SearchScope),
    EditEvent(EditDraft),
}

impl Flow {
    pub fn step(&self) -> Step {
        match self {
            Flow::CreateEvent(EventDraft::Title) => Step::AwaitingEventTitle,
            Flow::CreateEvent(EventDraft::Description { .. }) => Step::AwaitingEventDescription,
            Flow::CreateEvent(EventDraft::Date { .. }) => Step::AwaitingEventDate,
            Flow::CreateContact {
                kind: ContactKind::Contact,
                draft: ContactDraft::Name,
            } => Step::AwaitingContactName,
            Flow::CreateContact {
                kind: ContactKind::Contact,
                draft: ContactDraft::Payload { .. },
            } => Step::AwaitingContactPhone,
            Flow::CreateContact {
                kind: ContactKind::Note,
                draft: ContactDraft::Name,
            } => Step::AwaitingNoteName,
            Flow::CreateContact {
                kind: ContactKind::Note,
                draft: ContactDraft::Payload { .. },
            } => Step::AwaitingNoteBody,
            Flow::Search(SearchScope::Events) => Step::AwaitingSearchEventsQuery,
            Flow::Search(SearchScope::Contacts) => Step::AwaitingSearchContactsQuery,
            Flow::Search(SearchScope::Notes) => Step::AwaitingSearchNotesQuery,
            Flow::EditEvent(EditDraft { stage, .. }) => match stage {
                EventDraft::Title => Step::AwaitingEditTitle,
                EventDraft::Description { .. } => Step::AwaitingEditDescription,
                EventDraft::Date { .. } => Step::AwaitingEditDate,
            },
        }
    }
}

/// Query that produced the current listing, enough to re-run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingContext {
    All,
    ByDate(NaiveDate),
    Search(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub context: ListingContext,
    /// 1-based page last shown.
    pub page: usize,
    /// Full unpaginated result set, absent when it was too large to keep.
    pub cached: Option<Vec<Event>>,
}

impl Listing {
    pub fn new(context: ListingContext, results: Vec<Event>, cache_limit: usize) -> Self {
        let cached = (results.len() <= cache_limit).then_some(results);
        Self {
            context,
            page: 1,
            cached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub flow: Option<Flow>,
    pub listing: Option<Listing>,
}

impl SessionState {
    pub fn in_flow(flow: Flow) -> Self {
        Self {
            flow: Some(flow),
            listing: None,
        }
    }

    pub fn step(&self) -> Option<Step> {
        self.flow.as_ref().map(Flow::step)
    }

    pub fn is_idle(&self) -> bool {
        self.flow.is_none() && self.listing.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(id: EventId) -> Event {
        Event {
            id,
            title: format!("event {id}"),
            description: String::new(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            owner: "U1".to_string(),
        }
    }

    #[test]
    fn step_tokens_follow_draft_stage() {
        let flow = Flow::CreateEvent(EventDraft::Date {
            title: "a".into(),
            description: "b".into(),
        });
        assert_eq!(flow.step(), Step::AwaitingEventDate);

        let note = Flow::CreateContact {
            kind: ContactKind::Note,
            draft: ContactDraft::Payload { name: "n".into() },
        };
        assert_eq!(note.step(), Step::AwaitingNoteBody);

        let edit = Flow::EditEvent(EditDraft {
            event_id: 4,
            stage: EventDraft::Title,
        });
        assert_eq!(edit.step(), Step::AwaitingEditTitle);
    }

    #[test]
    fn listing_drops_cache_above_limit() {
        let small = Listing::new(ListingContext::All, vec![sample_event(1)], 5);
        assert!(small.cached.is_some());
        assert_eq!(small.page, 1);

        let large = Listing::new(
            ListingContext::All,
            (1..=6).map(sample_event).collect(),
            5,
        );
        assert!(large.cached.is_none());
    }

    #[test]
    fn default_session_is_idle() {
        let state = SessionState::default();
        assert!(state.is_idle());
        assert_eq!(state.step(), None);
        let flowing = SessionState::in_flow(Flow::Search(SearchScope::Notes));
        assert_eq!(flowing.step(), Some(Step::AwaitingSearchNotesQuery));
    }
}
