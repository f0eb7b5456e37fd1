use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound the messaging platform accepts per reply/push request.
pub const MAX_MESSAGES_PER_REQUEST: usize = 5;
/// Upper bound of bubbles inside one carousel.
pub const MAX_CAROUSEL_BUBBLES: usize = 12;
/// Upper bound of quick-reply chips attached to one message.
pub const MAX_QUICK_REPLY_ITEMS: usize = 13;

pub type EventId = i64;
pub type ContactId = i64;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A dated event owned by the user who created it. Field names on the wire
/// follow the hosted table columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "event_title")]
    pub title: String,
    #[serde(rename = "event_description", default)]
    pub description: String,
    #[serde(rename = "event_date")]
    pub date: NaiveDate,
    #[serde(rename = "created_by")]
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewEvent {
    #[serde(rename = "event_title")]
    pub title: String,
    #[serde(rename = "event_description")]
    pub description: String,
    #[serde(rename = "event_date")]
    pub date: NaiveDate,
    #[serde(rename = "created_by")]
    pub owner: String,
}

impl NewEvent {
    pub fn into_event(self, id: EventId) -> Event {
        Event {
            id,
            title: self.title,
            description: self.description,
            date: self.date,
            owner: self.owner,
        }
    }
}

/// Mutable part of an event. The owner is deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventUpdate {
    #[serde(rename = "event_title")]
    pub title: String,
    #[serde(rename = "event_description")]
    pub description: String,
    #[serde(rename = "event_date")]
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    #[default]
    Contact,
    Note,
}

impl ContactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactKind::Contact => "contact",
            ContactKind::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "contact" => Some(ContactKind::Contact),
            "note" => Some(ContactKind::Note),
            _ => None,
        }
    }
}

/// A phone-book contact or a free-form note. Both share one table; `payload`
/// holds the phone number or the note body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    #[serde(rename = "phone_number")]
    pub payload: String,
    #[serde(default)]
    pub kind: ContactKind,
    #[serde(rename = "created_by")]
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    #[serde(rename = "phone_number")]
    pub payload: String,
    pub kind: ContactKind,
    #[serde(rename = "created_by")]
    pub owner: String,
}

impl NewContact {
    pub fn into_contact(self, id: ContactId) -> Contact {
        Contact {
            id,
            name: self.name,
            payload: self.payload,
            kind: self.kind,
            owner: self.owner,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscriber {
    pub user_id: String,
    pub subscribed_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationLog {
    pub event_id: EventId,
    pub user_id: String,
    pub sent_at: DateTime<FixedOffset>,
    pub message: String,
    pub sent: bool,
}

// ---------------------------------------------------------------------------
// Inbound webhook payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Message(MessageEvent),
    Postback(PostbackEvent),
    Follow(FollowEvent),
    #[serde(other)]
    Other,
}

impl WebhookEvent {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::Message(e) => e.source.user_id.as_deref(),
            WebhookEvent::Postback(e) => e.source.user_id.as_deref(),
            WebhookEvent::Follow(e) => e.source.user_id.as_deref(),
            WebhookEvent::Other => None,
        }
    }

    pub fn reply_token(&self) -> Option<&str> {
        match self {
            WebhookEvent::Message(e) => e.reply_token.as_deref(),
            WebhookEvent::Postback(e) => e.reply_token.as_deref(),
            WebhookEvent::Follow(e) => e.reply_token.as_deref(),
            WebhookEvent::Other => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "replyToken", default)]
    pub reply_token: Option<String>,
    pub source: Source,
    pub message: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostbackEvent {
    #[serde(rename = "replyToken", default)]
    pub reply_token: Option<String>,
    pub source: Source,
    pub postback: PostbackContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostbackContent {
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEvent {
    #[serde(rename = "replyToken", default)]
    pub reply_token: Option<String>,
    pub source: Source,
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text(TextMessage),
    Flex(FlexMessage),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(TextMessage {
            text: text.into(),
            quick_reply: None,
        })
    }

    pub fn text_with(text: impl Into<String>, quick_reply: QuickReply) -> Self {
        Message::Text(TextMessage {
            text: text.into(),
            quick_reply: Some(quick_reply),
        })
    }

    pub fn flex(alt_text: impl Into<String>, contents: Value) -> Self {
        Message::Flex(FlexMessage {
            alt_text: alt_text.into(),
            contents,
        })
    }

    /// Plain text of a text message, `None` for rich messages.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(t) => Some(&t.text),
            Message::Flex(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextMessage {
    pub text: String,
    #[serde(rename = "quickReply", default, skip_serializing_if = "Option::is_none")]
    pub quick_reply: Option<QuickReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlexMessage {
    #[serde(rename = "altText")]
    pub alt_text: String,
    pub contents: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickReply {
    pub items: Vec<QuickReplyItem>,
}

impl QuickReply {
    pub fn new(mut items: Vec<QuickReplyItem>) -> Self {
        items.truncate(MAX_QUICK_REPLY_ITEMS);
        Self { items }
    }

    pub fn texts(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match &item.action {
                Action::Message { text, .. } => Some(text.as_str()),
                Action::Postback { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickReplyItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: Action,
}

impl QuickReplyItem {
    /// A chip that sends `text` back as if the user typed it.
    pub fn message(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: "action".to_string(),
            action: Action::Message {
                label: label.into(),
                text: text.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Message {
        label: String,
        text: String,
    },
    Postback {
        label: String,
        data: String,
        #[serde(rename = "displayText", default, skip_serializing_if = "Option::is_none")]
        display_text: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRequest {
    #[serde(rename = "replyToken")]
    pub reply_token: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub to: String,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_text_and_postback_events() {
        let body: WebhookBody = serde_json::from_value(json!({
            "destination": "Ubot",
            "events": [
                {
                    "type": "message",
                    "replyToken": "r1",
                    "source": {"type": "user", "userId": "U1"},
                    "message": {"type": "text", "id": "1", "text": "สวัสดี"}
                },
                {
                    "type": "postback",
                    "replyToken": "r2",
                    "source": {"type": "user", "userId": "U2"},
                    "postback": {"data": "delete:7"}
                },
                {
                    "type": "unsend",
                    "source": {"type": "user", "userId": "U3"}
                }
            ]
        }))
        .unwrap();

        assert_eq!(body.events.len(), 3);
        assert_eq!(body.events[0].user_id(), Some("U1"));
        assert_eq!(body.events[0].reply_token(), Some("r1"));
        match &body.events[0] {
            WebhookEvent::Message(m) => {
                assert!(matches!(&m.message, MessageContent::Text { text } if text == "สวัสดี"))
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &body.events[1] {
            WebhookEvent::Postback(p) => assert_eq!(p.postback.data, "delete:7"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(body.events[2], WebhookEvent::Other));
    }

    #[test]
    fn non_text_message_is_unsupported() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "type": "message",
            "replyToken": "r",
            "source": {"type": "user", "userId": "U1"},
            "message": {"type": "sticker", "id": "9", "packageId": "1", "stickerId": "2"}
        }))
        .unwrap();
        match event {
            WebhookEvent::Message(m) => assert!(matches!(m.message, MessageContent::Unsupported)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn text_message_serializes_with_quick_reply() {
        let msg = Message::text_with(
            "hi",
            QuickReply::new(vec![QuickReplyItem::message("menu", "สวัสดี")]),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["quickReply"]["items"][0]["type"], "action");
        assert_eq!(value["quickReply"]["items"][0]["action"]["type"], "message");
        assert_eq!(value["quickReply"]["items"][0]["action"]["text"], "สวัสดี");
    }

    #[test]
    fn event_uses_table_column_names() {
        let event = Event {
            id: 3,
            title: "t".to_string(),
            description: "d".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            owner: "U1".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_title"], "t");
        assert_eq!(value["event_date"], "2025-01-31");
        assert_eq!(value["created_by"], "U1");
    }

    #[test]
    fn contact_kind_defaults_to_contact_when_column_missing() {
        let contact: Contact = serde_json::from_value(json!({
            "id": 1, "name": "Somchai", "phone_number": "0812345678", "created_by": "U1"
        }))
        .unwrap();
        assert_eq!(contact.kind, ContactKind::Contact);
    }
}
