//! Outbound message construction: Thai copy, quick-reply chips and the
//! event carousel.

use agenda_contracts::{
    Contact, ContactKind, Event, Message, QuickReply, QuickReplyItem, MAX_CAROUSEL_BUBBLES,
};
use agenda_kernel::command::{
    DATE_TOKEN_PREFIX, GREETING, NEXT_PAGE, SEARCH_BY_DATE, SEARCH_EVENTS,
};
use agenda_kernel::{display_name, format_thai_naive, ManageAction, ManageRight, MenuCommand, Page};
use chrono::{Datelike, NaiveDate, TimeDelta};
use serde_json::{json, Value};

pub const WELCOME: &str = "🤖 สวัสดีครับ\n\n🎯 เมนูใช้งาน:\n• เพิ่มกิจกรรม\n• เพิ่มเบอร์โทร\n• เพิ่มโน้ต\n• ค้นหากิจกรรม เบอร์ หรือโน้ต\n• ค้นหาตามวันที่\n• ดูกิจกรรมทั้งหมด";
pub const PROMPT_EVENT_TITLE: &str = "📝 เพิ่มกิจกรรม\n\nพิมพ์ชื่อกิจกรรม:";
pub const PROMPT_EVENT_DESCRIPTION: &str = "📄 พิมพ์รายละเอียด:";
pub const PROMPT_EVENT_DATE: &str = "📅 พิมพ์วันที่ (YYYY-MM-DD):";
pub const PROMPT_EDIT_DESCRIPTION: &str = "📄 พิมพ์รายละเอียดใหม่:";
pub const PROMPT_EDIT_DATE: &str = "📅 พิมพ์วันที่ใหม่ (YYYY-MM-DD):";
pub const PROMPT_CONTACT_NAME: &str = "📞 เพิ่มเบอร์โทร\n\nพิมพ์ชื่อ:";
pub const PROMPT_CONTACT_PHONE: &str = "📱 พิมพ์เบอร์โทร:";
pub const PROMPT_NOTE_NAME: &str = "🗒️ เพิ่มโน้ต\n\nพิมพ์หัวข้อโน้ต:";
pub const PROMPT_NOTE_BODY: &str = "✍️ พิมพ์เนื้อหาโน้ต:";
pub const PROMPT_SEARCH_EVENTS: &str = "🎯 ค้นหากิจกรรม\n\n💡 พิมพ์ชื่อ 2-3 คำ:";
pub const PROMPT_SEARCH_CONTACTS: &str = "📞 ค้นหาเบอร์\n\n💡 พิมพ์ชื่อ 2-3 คำ:";
pub const PROMPT_SEARCH_NOTES: &str = "🗒️ ค้นหาโน้ต\n\n💡 พิมพ์คำค้น 2-3 คำ:";
pub const PROMPT_PICK_DATE: &str = "📅 ค้นหาตามวันที่\n\n💡 เลือกวันที่:";
pub const INVALID_DATE: &str = "❌ รูปแบบวันที่ไม่ถูกต้อง ใช้: YYYY-MM-DD";
pub const EMPTY_INPUT: &str = "❌ กรุณาพิมพ์ข้อความ";
pub const SEARCH_TOO_SHORT: &str = "❌ คำค้นต้องยาวอย่างน้อย 2 ตัวอักษร";
pub const NOT_FOUND: &str = "❌ ไม่พบกิจกรรมที่ต้องการ";
pub const NOT_OWNER: &str = "❌ คุณสามารถจัดการได้เฉพาะกิจกรรมของคุณเอง";
pub const ADMIN_CANNOT_EDIT: &str = "❌ Admin สามารถลบได้ แต่แก้ไขได้เฉพาะเจ้าของ";
pub const DELETE_UNVERIFIED: &str = "⚠️ ลบไม่สำเร็จ กิจกรรมยังอยู่ในระบบ กรุณาลองใหม่";
pub const STORE_FAILURE: &str = "❌ เกิดข้อผิดพลาด กรุณาลองใหม่อีกครั้ง";
pub const NO_MORE_RESULTS: &str = "📋 ไม่มีกิจกรรมเพิ่มเติมแล้ว";
pub const NO_EVENTS: &str = "📋 ยังไม่มีกิจกรรม";
pub const FLOW_RESET: &str = "🔄 ยกเลิกขั้นตอนเดิมแล้ว\n\nเลือกเมนูเพื่อเริ่มใหม่";
pub const NOT_UNDERSTOOD: &str = "❓ ไม่เข้าใจคำสั่ง\n\n💡 กดปุ่มเมนูด้านล่าง";

const ADMIN_NOTE: &str = " (Admin)";

/// Quick-reply chips for every main-menu command.
pub fn main_menu() -> QuickReply {
    QuickReply::new(
        MenuCommand::ALL
            .into_iter()
            .map(|m| QuickReplyItem::message(m.keyword(), m.keyword()))
            .collect(),
    )
}

/// Today plus the next six days, each chip sending a date token.
pub fn date_picker(today: NaiveDate) -> QuickReply {
    let items = (0..7)
        .map(|offset| {
            let date = today + TimeDelta::days(offset);
            let label = match offset {
                0 => "วันนี้".to_string(),
                1 => "พรุ่งนี้".to_string(),
                _ => format!("{}/{:02}", date.day(), date.month()),
            };
            QuickReplyItem::message(label, format!("{DATE_TOKEN_PREFIX}{date}"))
        })
        .collect();
    QuickReply::new(items)
}

pub fn with_menu(text: impl Into<String>) -> Message {
    Message::text_with(text, main_menu())
}

pub fn plain(text: impl Into<String>) -> Message {
    Message::text(text)
}

fn admin_note(on_behalf: bool) -> &'static str {
    if on_behalf {
        ADMIN_NOTE
    } else {
        ""
    }
}

pub fn event_saved(title: &str, description: &str, date: NaiveDate) -> Message {
    with_menu(format!(
        "✅ บันทึกเรียบร้อย!\n\n📝 {title}\n📄 {description}\n📅 {}",
        format_thai_naive(date)
    ))
}

pub fn event_updated(title: &str, description: &str, date: NaiveDate) -> Message {
    with_menu(format!(
        "✅ แก้ไขเรียบร้อย!\n\n📝 {title}\n📄 {description}\n📅 {}",
        format_thai_naive(date)
    ))
}

pub fn contact_saved(contact: &Contact) -> Message {
    let text = match contact.kind {
        ContactKind::Contact => format!(
            "✅ บันทึกเรียบร้อย!\n\n👤 ชื่อ: {}\n📞 เบอร์: {}",
            contact.name, contact.payload
        ),
        ContactKind::Note => format!(
            "✅ บันทึกโน้ตเรียบร้อย!\n\n🗒️ {}\n{}",
            contact.name, contact.payload
        ),
    };
    with_menu(text)
}

pub fn edit_started(event: &Event) -> Message {
    plain(format!(
        "✏️ แก้ไขกิจกรรม ID: {}\n\nชื่อเดิม: {}\nพิมพ์ชื่อกิจกรรมใหม่:",
        event.id, event.title
    ))
}

/// Confirmation prompt for a pending delete; nothing is mutated yet.
pub fn confirm_delete(event: &Event, on_behalf: bool) -> Message {
    let chips = QuickReply::new(vec![
        QuickReplyItem::message(
            "✅ ยืนยันลบ",
            ManageAction::ConfirmDelete.text_for(event.id),
        ),
        QuickReplyItem::message("❌ ยกเลิก", GREETING),
    ]);
    Message::text_with(
        format!(
            "🗑️ ยืนยันการลบ{}\n\n📝 {}\n🆔 ID: {}\n\n⚠️ การลบจะไม่สามารถกู้คืนได้",
            admin_note(on_behalf),
            event.title,
            event.id
        ),
        chips,
    )
}

pub fn deleted(event: &Event, on_behalf: bool) -> Message {
    with_menu(format!(
        "🗑️ ลบกิจกรรมเรียบร้อย!{}\n\n📝 {}\n🆔 ID: {}",
        admin_note(on_behalf),
        event.title,
        event.id
    ))
}

pub fn completed(event: &Event, on_behalf: bool) -> Message {
    with_menu(format!(
        "✅ เสร็จแล้ว! 🎉{}\n\n📝 {}\n🆔 ID: {}\n\n✨ ลบออกจากรายการแล้ว",
        admin_note(on_behalf),
        event.title,
        event.id
    ))
}

pub fn usage(action: ManageAction) -> Message {
    with_menu(format!("❌ รูปแบบไม่ถูกต้อง ใช้: {} 123", action.keyword()))
}

pub fn no_events_on(date: NaiveDate) -> Message {
    with_menu(format!(
        "📅 ไม่มีกิจกรรมวันที่: {}\n\n💡 ลองเลือกวันอื่น",
        format_thai_naive(date)
    ))
}

pub fn no_search_results(query: &str) -> Message {
    with_menu(format!("🔍 ไม่พบกิจกรรม: \"{query}\"\n\n💡 ลองคำอื่น"))
}

/// Text listing of contact or note search results.
pub fn contact_results(kind: ContactKind, query: &str, contacts: &[Contact]) -> Message {
    if contacts.is_empty() {
        let text = match kind {
            ContactKind::Contact => format!("📞 ไม่พบเบอร์: \"{query}\"\n\n💡 ลองคำอื่น"),
            ContactKind::Note => format!("🗒️ ไม่พบโน้ต: \"{query}\"\n\n💡 ลองคำอื่น"),
        };
        return with_menu(text);
    }
    let mut text = match kind {
        ContactKind::Contact => format!("📞 ผลการค้นหาเบอร์ ({} รายการ)\n", contacts.len()),
        ContactKind::Note => format!("🗒️ ผลการค้นหาโน้ต ({} รายการ)\n", contacts.len()),
    };
    for contact in contacts {
        match kind {
            ContactKind::Contact => {
                text.push_str(&format!("\n👤 {}\n📱 {}\n", contact.name, contact.payload))
            }
            ContactKind::Note => {
                text.push_str(&format!("\n📌 {}\n{}\n", contact.name, contact.payload))
            }
        }
    }
    with_menu(text.trim_end().to_string())
}

/// Header shown above a carousel page. Carries a "next page" chip when more
/// results remain.
pub fn page_header(heading: &str, page: &Page<Event>, admin_scope: bool) -> Message {
    let scope = if admin_scope { " 👑 ทั้งหมด" } else { "" };
    let text = format!(
        "{heading}{scope}\n\nหน้า {}: {}-{} จาก {} รายการ",
        page.number, page.first, page.last, page.total
    );
    if page.has_next {
        Message::text_with(
            text,
            QuickReply::new(vec![
                QuickReplyItem::message("📄 หน้าถัดไป", NEXT_PAGE),
                QuickReplyItem::message("🔍 ค้นหา", SEARCH_EVENTS),
                QuickReplyItem::message("📅 วันที่", SEARCH_BY_DATE),
            ]),
        )
    } else {
        with_menu(text)
    }
}

/// Carousel of at most [`MAX_CAROUSEL_BUBBLES`] events. `None` when empty.
pub fn event_carousel(events: &[Event], viewer: &str, viewer_is_admin: bool) -> Option<Message> {
    if events.is_empty() {
        return None;
    }
    let bubbles: Vec<Value> = events
        .iter()
        .take(MAX_CAROUSEL_BUBBLES)
        .map(|event| bubble(event, viewer, viewer_is_admin))
        .collect();
    let alt_text = format!("รายละเอียดกิจกรรม ({}/{} รายการ)", bubbles.len(), events.len());
    Some(Message::flex(
        alt_text,
        json!({"type": "carousel", "contents": bubbles}),
    ))
}

fn field_row(icon: &str, text: &str) -> Value {
    json!({
        "type": "box",
        "layout": "baseline",
        "spacing": "sm",
        "contents": [
            {"type": "text", "text": icon, "color": "#aaaaaa", "size": "sm", "flex": 1},
            {"type": "text", "text": text, "wrap": true, "color": "#666666", "size": "sm", "flex": 5}
        ]
    })
}

fn button(label: &str, data: String, style: &str) -> Value {
    json!({
        "type": "button",
        "style": style,
        "height": "sm",
        "flex": 1,
        "action": {"type": "postback", "label": label, "data": data}
    })
}

fn bubble(event: &Event, viewer: &str, viewer_is_admin: bool) -> Value {
    let is_owner = event.owner == viewer;
    let owner_line = if is_owner {
        format!("โดย {} ✨", display_name(&event.owner))
    } else {
        format!("โดย {}", display_name(&event.owner))
    };
    let description = if event.description.trim().is_empty() {
        "ไม่มีรายละเอียด"
    } else {
        event.description.as_str()
    };
    let mut bubble = json!({
        "type": "bubble",
        "body": {
            "type": "box",
            "layout": "vertical",
            "contents": [
                {"type": "text", "text": event.title, "weight": "bold", "size": "xl", "color": "#1DB446", "wrap": true},
                {
                    "type": "box",
                    "layout": "vertical",
                    "margin": "lg",
                    "spacing": "sm",
                    "contents": [
                        field_row("📅", &format_thai_naive(event.date)),
                        field_row("📝", description),
                        field_row("👤", &owner_line)
                    ]
                }
            ]
        }
    });

    let rights = ManageRight::for_viewer(viewer, &event.owner, viewer_is_admin);
    if rights.any() {
        let mut buttons = Vec::new();
        if rights.complete {
            buttons.push(button(
                "✅ เสร็จ",
                ManageAction::Complete.postback_for(event.id),
                "primary",
            ));
        }
        if rights.edit {
            buttons.push(button(
                "✏️ แก้ไข",
                ManageAction::Edit.postback_for(event.id),
                "secondary",
            ));
        }
        if rights.delete {
            buttons.push(button(
                "🗑️ ลบ",
                ManageAction::Delete.postback_for(event.id),
                "secondary",
            ));
        }
        bubble["footer"] = json!({
            "type": "box",
            "layout": "horizontal",
            "spacing": "sm",
            "contents": buttons
        });
    }
    bubble
}

/// Reminder pushed by the scheduler.
pub fn reminder(event: &Event) -> String {
    format!(
        "⏰ แจ้งเตือนกิจกรรมวันนี้\n\n📝 {}\n📄 {}\n📅 {}",
        event.title,
        event.description,
        format_thai_naive(event.date)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: i64, owner: &str) -> Event {
        Event {
            id,
            title: format!("event {id}"),
            description: String::new(),
            date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            owner: owner.to_string(),
        }
    }

    fn buttons(message: &Message, index: usize) -> Vec<String> {
        let Message::Flex(flex) = message else {
            panic!("expected flex message");
        };
        flex.contents["contents"][index]["footer"]["contents"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|b| b["action"]["data"].as_str().unwrap().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn date_picker_labels_today_tomorrow_then_day_month() {
        let picker = date_picker(NaiveDate::from_ymd_opt(2025, 1, 30).unwrap());
        assert_eq!(picker.items.len(), 7);
        assert_eq!(
            picker.texts(),
            vec![
                "วันที่:2025-01-30",
                "วันที่:2025-01-31",
                "วันที่:2025-02-01",
                "วันที่:2025-02-02",
                "วันที่:2025-02-03",
                "วันที่:2025-02-04",
                "วันที่:2025-02-05",
            ]
        );
        let json = serde_json::to_value(&picker).unwrap();
        assert_eq!(json["items"][0]["action"]["label"], "วันนี้");
        assert_eq!(json["items"][1]["action"]["label"], "พรุ่งนี้");
        assert_eq!(json["items"][2]["action"]["label"], "1/02");
    }

    #[test]
    fn main_menu_covers_every_command() {
        assert_eq!(main_menu().items.len(), MenuCommand::ALL.len());
    }

    #[test]
    fn carousel_caps_bubbles_and_reports_totals() {
        let events: Vec<Event> = (1..=15).map(|i| event(i, "U1")).collect();
        let Some(Message::Flex(flex)) = event_carousel(&events, "U1", false) else {
            panic!("expected carousel");
        };
        assert_eq!(
            flex.contents["contents"].as_array().unwrap().len(),
            MAX_CAROUSEL_BUBBLES
        );
        assert_eq!(flex.alt_text, "รายละเอียดกิจกรรม (12/15 รายการ)");
        assert!(event_carousel(&[], "U1", false).is_none());
    }

    #[test]
    fn buttons_follow_viewer_rights() {
        let events = vec![event(1, "U1"), event(2, "U2")];
        let owner_view = event_carousel(&events, "U1", false).unwrap();
        assert_eq!(
            buttons(&owner_view, 0),
            vec!["complete:1", "edit:1", "delete:1"]
        );
        assert!(buttons(&owner_view, 1).is_empty());

        let admin_view = event_carousel(&events, "Uadmin", true).unwrap();
        assert_eq!(buttons(&admin_view, 1), vec!["complete:2", "delete:2"]);
    }

    #[test]
    fn confirm_prompt_offers_confirm_and_cancel() {
        let Message::Text(text) = confirm_delete(&event(42, "U1"), true) else {
            panic!("expected text");
        };
        assert!(text.text.contains("(Admin)"));
        assert_eq!(
            text.quick_reply.unwrap().texts(),
            vec!["ยืนยันลบ 42", "สวัสดี"]
        );
    }

    #[test]
    fn page_header_offers_next_page_only_when_more_remain() {
        let events: Vec<Event> = (1..=3).map(|i| event(i, "U1")).collect();
        let first = agenda_kernel::paginate(&events, 1, 2).unwrap();
        let Message::Text(text) = page_header("📋 กิจกรรม", &first, false) else {
            panic!("expected text");
        };
        assert!(text.text.contains("หน้า 1: 1-2 จาก 3"));
        assert_eq!(text.quick_reply.unwrap().texts()[0], NEXT_PAGE);

        let last = agenda_kernel::paginate(&events, 2, 2).unwrap();
        let Message::Text(text) = page_header("📋 กิจกรรม", &last, true) else {
            panic!("expected text");
        };
        assert!(text.text.contains("👑"));
        assert!(!text.quick_reply.unwrap().texts().contains(&NEXT_PAGE));
    }
}
