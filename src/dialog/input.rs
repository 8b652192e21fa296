//! User input parsing and message formatting for the dialog engine.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::backend::TaskDto;

/// Display format for timestamps shown to the user.
const DISPLAY_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Parse a user-entered date in `DD.MM.YYYY` form.
pub fn parse_user_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), "%d.%m.%Y")
}

/// Parse a user-entered time in `HH:MM` form.
pub fn parse_user_time(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
}

/// Compose a due timestamp from its parsed parts.
pub fn combine_due(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// Render a timestamp as `DD.MM.YYYY HH:MM`.
pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DISPLAY_FORMAT).to_string()
}

/// Truncate a button label to `max` characters (not bytes).
pub fn truncate_label(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        value.chars().take(max).collect()
    }
}

/// Detail card shown in the task view.
pub fn format_task_card(task: &TaskDto) -> String {
    let created = task
        .created_at
        .map(|dt| format_datetime(dt.naive_utc()))
        .unwrap_or_else(|| "-".to_string());
    let due = task
        .due_date
        .map(format_datetime)
        .unwrap_or_else(|| "not set".to_string());
    let category = task.category_name.as_deref().unwrap_or("no category");
    format!(
        "📋 Task: {}\n📁 Category: {}\n📅 Created: {}\n⏰ Due: {}",
        task.title, category, created, due
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn valid_date_parses() {
        let date = parse_user_date("25.12.2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 12, 25).unwrap());
    }

    #[test]
    fn wrong_separator_is_rejected() {
        assert!(parse_user_date("31-13-2024").is_err());
    }

    #[test]
    fn impossible_date_is_rejected() {
        assert!(parse_user_date("31.02.2024").is_err());
    }

    #[test]
    fn valid_time_parses_and_is_combined() {
        let date = parse_user_date(" 25.12.2024 ").unwrap();
        let time = parse_user_time("14:30").unwrap();
        let due = combine_due(date, time);
        assert_eq!(due.to_string(), "2024-12-25 14:30:00");
    }

    #[test]
    fn out_of_range_time_is_rejected() {
        assert!(parse_user_time("25:61").is_err());
        assert!(parse_user_time("noon").is_err());
    }

    #[test]
    fn labels_truncate_on_char_boundaries() {
        assert_eq!(truncate_label("short", 35), "short");
        assert_eq!(truncate_label("ééééé", 3), "ééé");
    }

    #[test]
    fn task_card_fallbacks() {
        let task = TaskDto {
            id: 1,
            title: "Buy milk".into(),
            category_name: None,
            created_at: Some(Utc.with_ymd_and_hms(2024, 12, 1, 10, 0, 0).unwrap()),
            due_date: None,
            is_notified: false,
        };
        let card = format_task_card(&task);
        assert!(card.contains("📋 Task: Buy milk"));
        assert!(card.contains("📁 Category: no category"));
        assert!(card.contains("📅 Created: 01.12.2024 10:00"));
        assert!(card.contains("⏰ Due: not set"));
    }
}
