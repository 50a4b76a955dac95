//! Relative-time parsing for document-store UI timestamps.
//!
//! The web UI renders modification times the way a person would say them:
//! `3 小時前`, `yesterday 1:48 AM`, `星期二`, `12月17日`. This module turns
//! those into absolute local timestamps relative to a reference "now".
//!
//! # Rule Order
//!
//! Rules are tried top to bottom and the first match wins:
//!
//! | # | Form | Result |
//! |---|------|--------|
//! | 1 | `just now` / `剛剛` | `now` |
//! | 2 | `N minutes ago` / `N 分鐘前` | `now - N min` |
//! | 3 | `N hours ago` / `N 小時前` | `now - N h` |
//! | 4 | `N days ago` / `N 天前` | `now - N d` |
//! | 5 | `yesterday [H:MM AM/PM]` / `昨天 [上午/下午 H:MM]` | day before, clock time or midnight |
//! | 6 | weekday name | most recent such day strictly before today |
//! | 7 | `[YYYY年]MM月DD日` | that date at midnight (year defaults to now's) |
//! | 8 | `Dec 17[, 2024]` | that date at midnight |
//! | 9 | `YYYY/MM/DD [HH:MM]` | that date |
//!
//! Anything else yields `None`; callers treat that as "recency unknown".
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use drivewatch_monitor::timeparse::parse_relative_time;
//!
//! let now = NaiveDate::from_ymd_opt(2024, 12, 20)
//!     .unwrap()
//!     .and_hms_opt(10, 0, 0)
//!     .unwrap();
//!
//! let ts = parse_relative_time("3 小時前", now).unwrap();
//! assert_eq!(ts.to_string(), "2024-12-20 07:00:00");
//! ```

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::{Captures, Regex};

/// Optional clock suffix shared by the yesterday and weekday rules.
///
/// Captures: `zh_meridiem`, `hour`, `minute`, `en_meridiem`.
const CLOCK: &str = r"(?:\s*(?:at\s+)?(?:(?P<zh_meridiem>上午|下午)\s*)?(?P<hour>\d{1,2}):(?P<minute>\d{2})(?:\s*(?P<en_meridiem>[AaPp]\.?[Mm]\.?))?)?";

type Handler = fn(&Captures<'_>, NaiveDateTime) -> Option<NaiveDateTime>;

/// One entry in the ordered rule table.
struct Rule {
    name: &'static str,
    pattern: Regex,
    handler: Handler,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, handler: Handler) -> Self {
        Self {
            name,
            // Patterns are compile-time constants covered by the tests below.
            pattern: Regex::new(pattern).expect("relative-time pattern must compile"),
            handler,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new("just_now", r"(?i)just\s+now|剛剛|刚刚", |_, now| Some(now)),
        Rule::new(
            "minutes_ago",
            r"(?i)(?P<n>\d+|an?)\s*(?:minutes?\s+ago|mins?\s+ago|分鐘前|分钟前)",
            |caps, now| now.checked_sub_signed(Duration::try_minutes(count(caps)?)?),
        ),
        Rule::new(
            "hours_ago",
            r"(?i)(?P<n>\d+|an?)\s*(?:hours?\s+ago|hrs?\s+ago|小時前|小时前)",
            |caps, now| now.checked_sub_signed(Duration::try_hours(count(caps)?)?),
        ),
        Rule::new(
            "days_ago",
            r"(?i)(?P<n>\d+|an?)\s*(?:days?\s+ago|天前)",
            |caps, now| now.checked_sub_signed(Duration::try_days(count(caps)?)?),
        ),
        Rule::new(
            "yesterday",
            &format!(r"(?i)(?:yesterday|昨天){CLOCK}"),
            |caps, now| {
                let day = now.date().pred_opt()?;
                Some(day.and_time(clock_time(caps)?))
            },
        ),
        Rule::new(
            "weekday",
            &format!(
                r"(?i)(?P<day>monday|tuesday|wednesday|thursday|friday|saturday|sunday|(?:星期|週|周)[一二三四五六日天]){CLOCK}"
            ),
            |caps, now| {
                let weekday = parse_weekday(&caps["day"])?;
                let day = previous_weekday(now.date(), weekday);
                Some(day.and_time(clock_time(caps)?))
            },
        ),
        Rule::new(
            "cjk_date",
            r"(?:(?P<year>\d{4})\s*年\s*)?(?P<month>\d{1,2})\s*月\s*(?P<day>\d{1,2})\s*日",
            |caps, now| {
                let year = optional_number(caps, "year").unwrap_or(now.year());
                midnight(year, number(caps, "month")?, number(caps, "day")?)
            },
        ),
        Rule::new(
            "month_name_date",
            r"(?i)\b(?P<month>jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(?P<day>\d{1,2})\b(?:,?\s+(?P<year>\d{4}))?",
            |caps, now| {
                let month = month_from_name(&caps["month"])?;
                let year = optional_number(caps, "year").unwrap_or(now.year());
                midnight(year, month, number(caps, "day")?)
            },
        ),
        Rule::new(
            "numeric_date",
            r"(?P<year>\d{4})[/-](?P<month>\d{1,2})[/-](?P<day>\d{1,2})(?:\s+(?P<hour>\d{1,2}):(?P<minute>\d{2}))?",
            |caps, _| {
                let date = NaiveDate::from_ymd_opt(
                    number(caps, "year")?,
                    number(caps, "month")?,
                    number(caps, "day")?,
                )?;
                let time = match (optional_number(caps, "hour"), optional_number(caps, "minute")) {
                    (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, 0)?,
                    _ => NaiveTime::MIN,
                };
                Some(date.and_time(time))
            },
        ),
    ]
});

/// Parses a UI timestamp relative to `now`.
///
/// Returns `None` when no rule matches or the matched rule cannot produce a
/// valid calendar value (e.g. `2月30日`).
#[must_use]
pub fn parse_relative_time(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for rule in RULES.iter() {
        if let Some(caps) = rule.pattern.captures(text) {
            let parsed = (rule.handler)(&caps, now);
            tracing::trace!(rule = rule.name, input = text, ?parsed, "relative time matched");
            return parsed;
        }
    }

    None
}

/// Names of the rules in evaluation order.
#[must_use]
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|rule| rule.name).collect()
}

fn count(caps: &Captures<'_>) -> Option<i64> {
    let raw = caps.name("n")?.as_str();
    if raw.eq_ignore_ascii_case("a") || raw.eq_ignore_ascii_case("an") {
        return Some(1);
    }
    raw.parse().ok()
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name)?.as_str().parse().ok()
}

fn optional_number<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn midnight(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_time(NaiveTime::MIN))
}

/// Resolves the optional clock suffix, defaulting to midnight.
///
/// 12-hour times: 12 AM is 0, 12 PM stays 12, other PM hours add 12.
fn clock_time(caps: &Captures<'_>) -> Option<NaiveTime> {
    let Some(hour) = optional_number::<u32>(caps, "hour") else {
        return Some(NaiveTime::MIN);
    };
    let minute: u32 = number(caps, "minute")?;

    let pm = match (caps.name("zh_meridiem"), caps.name("en_meridiem")) {
        (Some(m), _) => Some(m.as_str() == "下午"),
        (None, Some(m)) => Some(m.as_str().to_ascii_lowercase().starts_with('p')),
        (None, None) => None,
    };

    let hour = match pm {
        Some(true) if hour == 12 => 12,
        Some(true) => hour + 12,
        Some(false) if hour == 12 => 0,
        _ => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    let lower = name.to_lowercase();
    let weekday = match lower.as_str() {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        _ => match lower.chars().last()? {
            '一' => Weekday::Mon,
            '二' => Weekday::Tue,
            '三' => Weekday::Wed,
            '四' => Weekday::Thu,
            '五' => Weekday::Fri,
            '六' => Weekday::Sat,
            '日' | '天' => Weekday::Sun,
            _ => return None,
        },
    };
    Some(weekday)
}

/// Most recent `weekday` strictly before `today`; never `today` itself.
fn previous_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let today_idx = i64::from(today.weekday().num_days_from_monday());
    let target_idx = i64::from(weekday.num_days_from_monday());
    let mut back = (today_idx - target_idx).rem_euclid(7);
    if back == 0 {
        back = 7;
    }
    today - Duration::days(back)
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    /// Friday 2024-12-20 10:00.
    fn now() -> NaiveDateTime {
        at(2024, 12, 20, 10, 0)
    }

    #[test]
    fn test_rule_order_is_stable() {
        assert_eq!(
            rule_names(),
            vec![
                "just_now",
                "minutes_ago",
                "hours_ago",
                "days_ago",
                "yesterday",
                "weekday",
                "cjk_date",
                "month_name_date",
                "numeric_date",
            ]
        );
    }

    #[test]
    fn test_just_now() {
        assert_eq!(parse_relative_time("剛剛", now()), Some(now()));
        assert_eq!(parse_relative_time("Just now", now()), Some(now()));
    }

    #[test]
    fn test_minutes_ago() {
        assert_eq!(parse_relative_time("5 分鐘前", now()), Some(at(2024, 12, 20, 9, 55)));
        assert_eq!(
            parse_relative_time("45 minutes ago", now()),
            Some(at(2024, 12, 20, 9, 15))
        );
        assert_eq!(
            parse_relative_time("a minute ago", now()),
            Some(at(2024, 12, 20, 9, 59))
        );
    }

    #[test]
    fn test_hours_ago() {
        let t = now();
        assert_eq!(
            parse_relative_time("3 小時前", t),
            Some(t - Duration::hours(3))
        );
        assert_eq!(
            parse_relative_time("an hour ago", t),
            Some(t - Duration::hours(1))
        );
    }

    #[test]
    fn test_days_ago_crosses_year_boundary() {
        let t = at(2025, 1, 2, 8, 30);
        assert_eq!(parse_relative_time("3 天前", t), Some(at(2024, 12, 30, 8, 30)));
        assert_eq!(parse_relative_time("1 day ago", t), Some(at(2025, 1, 1, 8, 30)));
    }

    #[test]
    fn test_hours_ago_crosses_month_boundary() {
        let t = at(2024, 3, 1, 1, 0);
        assert_eq!(parse_relative_time("2 hours ago", t), Some(at(2024, 2, 29, 23, 0)));
    }

    #[test]
    fn test_yesterday_without_clock_is_midnight() {
        assert_eq!(parse_relative_time("昨天", now()), Some(at(2024, 12, 19, 0, 0)));
        assert_eq!(parse_relative_time("Yesterday", now()), Some(at(2024, 12, 19, 0, 0)));
    }

    #[test]
    fn test_yesterday_with_twelve_hour_clock() {
        assert_eq!(
            parse_relative_time("yesterday 1:48 AM", now()),
            Some(at(2024, 12, 19, 1, 48))
        );
        assert_eq!(
            parse_relative_time("Yesterday at 1:48 PM", now()),
            Some(at(2024, 12, 19, 13, 48))
        );
        assert_eq!(
            parse_relative_time("yesterday 12:05 AM", now()),
            Some(at(2024, 12, 19, 0, 5))
        );
        assert_eq!(
            parse_relative_time("yesterday 12:05 PM", now()),
            Some(at(2024, 12, 19, 12, 5))
        );
    }

    #[test]
    fn test_yesterday_with_chinese_meridiem() {
        assert_eq!(
            parse_relative_time("昨天 下午 1:48", now()),
            Some(at(2024, 12, 19, 13, 48))
        );
        assert_eq!(
            parse_relative_time("昨天 上午 12:10", now()),
            Some(at(2024, 12, 19, 0, 10))
        );
    }

    #[test]
    fn test_yesterday_on_first_of_month() {
        let t = at(2024, 1, 1, 9, 0);
        assert_eq!(parse_relative_time("昨天", t), Some(at(2023, 12, 31, 0, 0)));
    }

    #[test]
    fn test_weekday_is_most_recent_before_today() {
        // now() is a Friday.
        assert_eq!(parse_relative_time("星期二", now()), Some(at(2024, 12, 17, 0, 0)));
        assert_eq!(parse_relative_time("Thursday", now()), Some(at(2024, 12, 19, 0, 0)));
        assert_eq!(parse_relative_time("週六", now()), Some(at(2024, 12, 14, 0, 0)));
    }

    #[test]
    fn test_weekday_matching_today_rolls_back_a_week() {
        assert_eq!(parse_relative_time("Friday", now()), Some(at(2024, 12, 13, 0, 0)));
        assert_eq!(parse_relative_time("星期五", now()), Some(at(2024, 12, 13, 0, 0)));
    }

    #[test]
    fn test_weekday_with_clock() {
        assert_eq!(
            parse_relative_time("Monday at 3:15 PM", now()),
            Some(at(2024, 12, 16, 15, 15))
        );
    }

    #[test]
    fn test_cjk_date_defaults_to_current_year() {
        assert_eq!(parse_relative_time("12月17日", now()), Some(at(2024, 12, 17, 0, 0)));
        assert_eq!(
            parse_relative_time("2023年3月5日", now()),
            Some(at(2023, 3, 5, 0, 0))
        );
    }

    #[test]
    fn test_month_name_date() {
        assert_eq!(parse_relative_time("Dec 17", now()), Some(at(2024, 12, 17, 0, 0)));
        assert_eq!(
            parse_relative_time("March 5, 2023", now()),
            Some(at(2023, 3, 5, 0, 0))
        );
    }

    #[test]
    fn test_numeric_date() {
        assert_eq!(parse_relative_time("2024/01/02", now()), Some(at(2024, 1, 2, 0, 0)));
        assert_eq!(
            parse_relative_time("2024-01-02 14:30", now()),
            Some(at(2024, 1, 2, 14, 30))
        );
    }

    #[test]
    fn test_invalid_calendar_values_are_none() {
        assert_eq!(parse_relative_time("2月30日", now()), None);
        assert_eq!(parse_relative_time("yesterday 25:00", now()), None);
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_relative_time("", now()), None);
        assert_eq!(parse_relative_time("sometime", now()), None);
        assert_eq!(parse_relative_time("Quarterly report.xlsx", now()), None);
    }

    #[test]
    fn test_previous_weekday_never_returns_today() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        for weekday in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ] {
            let day = previous_weekday(today, weekday);
            assert!(day < today);
            assert!(today - day <= Duration::days(7));
            assert_eq!(day.weekday(), weekday);
        }
    }
}
