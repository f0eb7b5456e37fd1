use chrono::{Datelike, FixedOffset, NaiveDate, Offset, Utc};

const THAI_MONTHS: [&str; 12] = [
    "มกราคม",
    "กุมภาพันธ์",
    "มีนาคม",
    "เมษายน",
    "พฤษภาคม",
    "มิถุนายน",
    "กรกฎาคม",
    "สิงหาคม",
    "กันยายน",
    "ตุลาคม",
    "พฤศจิกายน",
    "ธันวาคม",
];

/// Offset between the Gregorian and the Buddhist era.
const BUDDHIST_ERA_OFFSET: i32 = 543;

const ACCEPTED_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// Fixed local offset, falling back to UTC for out-of-range values.
pub fn local_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Parses a user-typed date in any accepted layout. The result is the
/// canonical calendar date, so `2025-02-30` is rejected.
pub fn parse_user_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

pub fn format_thai_naive(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        THAI_MONTHS[date.month0() as usize],
        date.year() + BUDDHIST_ERA_OFFSET
    )
}

/// Renders a stored date string for display. Input that does not parse is
/// echoed back unchanged.
pub fn format_thai_date(input: &str) -> String {
    if input.trim().is_empty() {
        return "ไม่มีวันที่".to_string();
    }
    match parse_user_date(input) {
        Some(date) => format_thai_naive(date),
        None => input.to_string(),
    }
}

/// Short public handle for a user id: `User` plus its last four characters.
pub fn display_name(user_id: &str) -> String {
    if user_id.is_empty() {
        return "Unknown".to_string();
    }
    let tail: String = {
        let chars: Vec<char> = user_id.chars().collect();
        let start = chars.len().saturating_sub(4);
        chars[start..].iter().collect()
    };
    format!("User{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_iso_date_in_buddhist_era() {
        assert_eq!(format_thai_date("2025-01-05"), "5 มกราคม 2568");
        assert_eq!(format_thai_date("2024-12-31"), "31 ธันวาคม 2567");
    }

    #[test]
    fn accepts_alternative_layouts() {
        assert_eq!(format_thai_date("05/02/2025"), "5 กุมภาพันธ์ 2568");
        assert_eq!(format_thai_date("05-02-2025"), "5 กุมภาพันธ์ 2568");
        assert_eq!(format_thai_date("2025/02/05"), "5 กุมภาพันธ์ 2568");
    }

    #[test]
    fn echoes_unparseable_input() {
        assert_eq!(format_thai_date("next friday"), "next friday");
        assert_eq!(format_thai_date(""), "ไม่มีวันที่");
    }

    #[test]
    fn rejects_impossible_calendar_dates() {
        assert!(parse_user_date("2025-02-30").is_none());
        assert!(parse_user_date("2025-13-01").is_none());
        assert!(parse_user_date("tomorrow").is_none());
        assert_eq!(
            parse_user_date(" 2024-02-29 "),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn display_name_uses_last_four_chars() {
        assert_eq!(display_name("Uc88eb3896b0e4bcc5fbaa9b78ac1294e"), "User294e");
        assert_eq!(display_name("ab"), "Userab");
        assert_eq!(display_name(""), "Unknown");
    }

    #[test]
    fn local_offset_is_bangkok_by_default_minutes() {
        assert_eq!(local_offset(420).local_minus_utc(), 7 * 3600);
        assert_eq!(local_offset(100_000).local_minus_utc(), 0);
    }
}
