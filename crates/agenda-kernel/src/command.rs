//! Inbound text and postback payloads decoded once into a typed command.

use agenda_contracts::EventId;
use chrono::NaiveDate;

use crate::dates::parse_user_date;

pub const GREETING: &str = "สวัสดี";
pub const GREETING_EN: &str = "hello";
pub const ADD_EVENT: &str = "เพิ่มกิจกรรม";
pub const ADD_CONTACT: &str = "เพิ่มเบอร์";
pub const ADD_NOTE: &str = "เพิ่มโน้ต";
pub const SEARCH_EVENTS: &str = "ค้นหากิจกรรม";
pub const SEARCH_CONTACTS: &str = "ค้นหาเบอร์";
pub const SEARCH_NOTES: &str = "ค้นหาโน้ต";
pub const SEARCH_BY_DATE: &str = "ค้นหาตามวันที่";
pub const LIST_ALL: &str = "ดูกิจกรรมทั้งหมด";
pub const NEXT_PAGE: &str = "หน้าถัดไป";
pub const DATE_TOKEN_PREFIX: &str = "วันที่:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    AddEvent,
    AddContact,
    AddNote,
    SearchEvents,
    SearchContacts,
    SearchNotes,
    SearchByDate,
    ListAll,
}

impl MenuCommand {
    pub const ALL: [MenuCommand; 8] = [
        MenuCommand::AddEvent,
        MenuCommand::AddContact,
        MenuCommand::AddNote,
        MenuCommand::SearchEvents,
        MenuCommand::SearchContacts,
        MenuCommand::SearchNotes,
        MenuCommand::SearchByDate,
        MenuCommand::ListAll,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            MenuCommand::AddEvent => ADD_EVENT,
            MenuCommand::AddContact => ADD_CONTACT,
            MenuCommand::AddNote => ADD_NOTE,
            MenuCommand::SearchEvents => SEARCH_EVENTS,
            MenuCommand::SearchContacts => SEARCH_CONTACTS,
            MenuCommand::SearchNotes => SEARCH_NOTES,
            MenuCommand::SearchByDate => SEARCH_BY_DATE,
            MenuCommand::ListAll => LIST_ALL,
        }
    }

    fn from_keyword(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.keyword() == text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    Edit,
    Delete,
    ConfirmDelete,
    Complete,
}

impl ManageAction {
    const ALL: [ManageAction; 4] = [
        ManageAction::ConfirmDelete,
        ManageAction::Edit,
        ManageAction::Delete,
        ManageAction::Complete,
    ];

    /// Word the user types in front of an event id.
    pub fn keyword(self) -> &'static str {
        match self {
            ManageAction::Edit => "แก้ไข",
            ManageAction::Delete => "ลบ",
            ManageAction::ConfirmDelete => "ยืนยันลบ",
            ManageAction::Complete => "เสร็จ",
        }
    }

    fn postback_tag(self) -> &'static str {
        match self {
            ManageAction::Edit => "edit",
            ManageAction::Delete => "delete",
            ManageAction::ConfirmDelete => "confirm_delete",
            ManageAction::Complete => "complete",
        }
    }

    /// Text command equivalent, e.g. `ยืนยันลบ 42`.
    pub fn text_for(self, id: EventId) -> String {
        format!("{} {id}", self.keyword())
    }

    /// Opaque button payload decoded by [`Command::from_postback`].
    pub fn postback_for(self, id: EventId) -> String {
        format!("{}:{id}", self.postback_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Date-selection token. `None` when the token carried an invalid date.
    DateSearch(Option<NaiveDate>),
    Greeting,
    Menu(MenuCommand),
    NextPage,
    /// Record management. `target` is `None` when the id did not parse.
    Manage {
        action: ManageAction,
        target: Option<EventId>,
    },
    Text(String),
}

impl Command {
    pub fn parse(input: &str) -> Command {
        let text = input.trim();

        if let Some(rest) = text.strip_prefix(DATE_TOKEN_PREFIX) {
            return Command::DateSearch(parse_user_date(rest));
        }
        if text == GREETING || text.eq_ignore_ascii_case(GREETING_EN) {
            return Command::Greeting;
        }
        if let Some(menu) = MenuCommand::from_keyword(text) {
            return Command::Menu(menu);
        }
        if text == NEXT_PAGE {
            return Command::NextPage;
        }
        for action in ManageAction::ALL {
            if let Some(rest) = text
                .strip_prefix(action.keyword())
                .and_then(|r| r.strip_prefix(char::is_whitespace))
            {
                return Command::Manage {
                    action,
                    target: rest.trim().parse().ok(),
                };
            }
        }
        Command::Text(text.to_string())
    }

    pub fn from_postback(data: &str) -> Option<Command> {
        let (tag, id) = data.trim().split_once(':')?;
        let action = ManageAction::ALL
            .into_iter()
            .find(|a| a.postback_tag() == tag)?;
        Some(Command::Manage {
            action,
            target: id.trim().parse().ok(),
        })
    }
}
