//! Display helpers shared by the topic pages and the home feed.

use once_cell::sync::Lazy;
use regex::Regex;
use time::{OffsetDateTime, macros::format_description};

use crate::application::localization::Localization;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("invalid tag regex"));

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;
const WEEK: i64 = 604_800;

/// Compact counter text: `876`, `25.6K`, `115.2M`, `2.9B`, `675.1T`.
///
/// Two decimals are shown unless the second one is a zero, in which case the
/// value is shown with one.
pub fn format_number(number: i64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e3, "K"), (1e6, "M"), (1e9, "B"), (1e12, "T")];

    if number < 1_000 {
        return number.to_string();
    }
    let value = number as f64;
    let (divisor, suffix) = UNITS
        .iter()
        .rev()
        .find(|(divisor, _)| value >= *divisor)
        .copied()
        .unwrap_or(UNITS[0]);
    let scaled = value / divisor;

    let two = fixed(scaled, 2);
    let text = if two.ends_with('0') {
        fixed(scaled, 1)
    } else {
        two
    };
    format!("{text}{suffix}")
}

/// Round half away from zero to `decimals` places, then group thousands.
fn fixed(value: f64, decimals: usize) -> String {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    let text = format!("{rounded:.decimals$}");
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut grouped = String::with_capacity(text.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if !fraction.is_empty() {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}

/// "just now", "5 minutes ago" and so on for the past week, then a date.
pub fn time_ago(localization: &Localization, timestamp: i64, now: i64) -> String {
    let elapsed = now - timestamp;
    let (unit, amount) = match elapsed {
        _ if elapsed < MINUTE => return localization.get("timehelper", "justNow"),
        _ if elapsed < HOUR => ("minute", elapsed / MINUTE),
        _ if elapsed < DAY => ("hour", elapsed / HOUR),
        _ if elapsed < WEEK => ("day", elapsed / DAY),
        _ => return format_date(timestamp),
    };
    let plural = if amount > 1 { "s" } else { "" };
    localization.replace("timehelper", &format!("{unit}{plural}Ago"), "total", amount)
}

/// `Mar 5, 2024 4:07 PM` in UTC.
pub fn format_date(timestamp: i64) -> String {
    let format = format_description!(
        "[month repr:short] [day padding:none], [year] [hour repr:12 padding:none]:[minute] [period]"
    );
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|moment| moment.format(format).ok())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Strip markup and cut to `max_chars`, marking the cut with `...`.
pub fn plain_text(content: &str, max_chars: usize) -> String {
    let text = TAG.replace_all(content, "");
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locale() -> Localization {
        Localization::from_json(
            None,
            r#"{"timehelper": {
                "justNow": "Just now",
                "minuteAgo": "${total} minute ago",
                "minutesAgo": "${total} minutes ago",
                "hourAgo": "${total} hour ago",
                "hoursAgo": "${total} hours ago",
                "dayAgo": "${total} day ago",
                "daysAgo": "${total} days ago"
            }}"#,
        )
        .expect("locale")
    }

    #[test]
    fn small_numbers_are_left_alone() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(876), "876");
        assert_eq!(format_number(999), "999");
    }

    #[test]
    fn large_numbers_get_a_suffix() {
        assert_eq!(format_number(25_600), "25.6K");
        assert_eq!(format_number(115_200_000), "115.2M");
        assert_eq!(format_number(2_900_000_000), "2.9B");
        assert_eq!(format_number(675_100_000_000_000), "675.1T");
    }

    #[test]
    fn second_decimal_is_kept_unless_zero() {
        assert_eq!(format_number(1_000), "1.0K");
        assert_eq!(format_number(1_234), "1.23K");
        assert_eq!(format_number(1_125), "1.13K");
        assert_eq!(format_number(999_999), "1,000.0K");
        assert_eq!(format_number(2_000_000_000_000_000), "2,000.0T");
    }

    #[test]
    fn time_ago_picks_the_largest_unit() {
        let locale = locale();
        let now = 1_700_000_000;
        assert_eq!(time_ago(&locale, now - 5, now), "Just now");
        assert_eq!(time_ago(&locale, now + 30, now), "Just now");
        assert_eq!(time_ago(&locale, now - 60, now), "1 minute ago");
        assert_eq!(time_ago(&locale, now - 150, now), "2 minutes ago");
        assert_eq!(time_ago(&locale, now - 3_600, now), "1 hour ago");
        assert_eq!(time_ago(&locale, now - 3 * 86_400, now), "3 days ago");
    }

    #[test]
    fn time_ago_falls_back_to_a_date_after_a_week() {
        let text = time_ago(&locale(), 0, 8 * 86_400);
        assert_eq!(text, "Jan 1, 1970 12:00 AM");
    }

    #[test]
    fn plain_text_strips_tags_and_truncates() {
        assert_eq!(plain_text("<p>Hello <b>there</b></p>", 50), "Hello there");
        assert_eq!(plain_text("<p>Hello there friend</p>", 11), "Hello there...");
        assert_eq!(plain_text("héllo wörld", 5), "héllo...");
    }
}
