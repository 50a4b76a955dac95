//! Activity-panel text extraction.
//!
//! The document store's activity panel is scraped as plain, line-oriented text.
//! Each event is one action line, usually followed by a timestamp line:
//!
//! ```text
//! Today
//! "Joy Lu" created "Q4 emissions.xlsx" in [CCBP]
//! 3 hours ago
//! You edited Supplier list.xlsx
//! yesterday 1:48 AM
//! ```
//!
//! # Action Markers
//!
//! | Marker | Pattern |
//! |--------|---------|
//! | edited | `"<actor>" edited <item>` or `You edited <item>` |
//! | created | `"<actor>" created "<item>" in [<container>]` or `You created ...` |
//! | deleted | `"<actor>" deleted "<item>" from [<container>]` or `You deleted ...` |
//!
//! A line that carries a marker but does not fit its pattern still yields a
//! record with whatever fields could be recovered. Records with neither an
//! actor nor an item name are dropped.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::types::{ActivityRecord, ChangeAction};

/// Actor literal used when the viewer made the change.
pub const SELF_ACTOR: &str = "You";

/// Lines that group the feed and never describe an event.
const SECTION_HEADERS: &[&str] = &[
    "Today",
    "Yesterday",
    "This week",
    "Last week",
    "Earlier",
    "Activity",
    "今天",
    "昨天",
    "本週",
    "上週",
    "更早",
    "活動",
];


/// One action marker with its structured pattern.
struct ActionRule {
    action: ChangeAction,
    marker: Regex,
    pattern: Regex,
}

impl ActionRule {
    fn new(action: ChangeAction, marker: &str, pattern: &str) -> Self {
        Self {
            action,
            marker: Regex::new(marker).expect("action marker must compile"),
            pattern: Regex::new(pattern).expect("action pattern must compile"),
        }
    }
}

/// Action table. Structured patterns are tried before any marker is trusted,
/// so an item name containing another action word keeps its real action.
static ACTION_RULES: LazyLock<Vec<ActionRule>> = LazyLock::new(|| {
    vec![
        ActionRule::new(
            ChangeAction::Created,
            r"\bcreated\b",
            r#"^(?:"(?P<actor>[^"]*)"|(?P<you>You))\s+created\s+"?(?P<item>[^"\[]*?)"?\s+in\s+\[(?P<container>[^\]]*)\]"#,
        ),
        ActionRule::new(
            ChangeAction::Deleted,
            r"\bdeleted\b",
            r#"^(?:"(?P<actor>[^"]*)"|(?P<you>You))\s+deleted\s+"?(?P<item>[^"\[]*?)"?\s+from\s+\[(?P<container>[^\]]*)\]"#,
        ),
        ActionRule::new(
            ChangeAction::Modified,
            r"\bedited\b",
            r#"^(?:"(?P<actor>[^"]*)"|(?P<you>You))\s+edited\s+"?(?P<item>[^"]*?)"?\s*$"#,
        ),
    ]
});

/// Relative timestamp shapes: whole-word `ago`/`yesterday`/`just now`, the
/// zh-TW counted forms, `昨天`, a meridiem word, or a 12-hour clock.
static TIME_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bago\b|\byesterday\b|\bjust\s+now\b|\d+\s*(?:分鐘|分钟|小時|小时|天)前|剛剛|昨天|上午|下午|\d{1,2}:\d{2}\s*[ap]\.?m\.?",
    )
    .expect("time shape must compile")
});

/// Loose fallback pieces for lines that carry a marker but not the full shape.
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("quoted pattern must compile"));
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("bracket pattern must compile"));

/// Returns `true` if the line is a feed section header.
#[must_use]
pub fn is_section_header(line: &str) -> bool {
    let line = line.trim();
    SECTION_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(line))
}

/// Returns `true` if the line has the shape of a relative timestamp.
#[must_use]
pub fn looks_like_time(line: &str) -> bool {
    TIME_SHAPE.is_match(line.trim())
}

/// Extracts activity records from a scraped panel, in as-read order.
///
/// Never fails: malformed lines degrade to partial records or are skipped.
#[must_use]
pub fn extract(panel_text: &str) -> Vec<ActivityRecord> {
    let lines: Vec<&str> = panel_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut records = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_section_header(line) {
            i += 1;
            continue;
        }

        let Some(mut record) = parse_action_line(line) else {
            i += 1;
            continue;
        };

        // A following timestamp line belongs to this record. Another action
        // line never does, whatever its item name contains.
        match lines.get(i + 1) {
            Some(next)
                if !is_section_header(next)
                    && looks_like_time(next)
                    && parse_action_line(next).is_none() =>
            {
                record.time_str = (*next).to_string();
                i += 2;
            }
            _ => i += 1,
        }

        if record.modifier.is_empty() && record.file_name.is_empty() {
            debug!(line, "Dropping activity line with no actor or item");
            continue;
        }

        records.push(record);
    }

    records
}

/// Classifies one line against the action table.
///
/// The first rule whose full pattern matches wins. Failing that, the marker
/// found earliest in the line picks the action for a loose record. Returns
/// `None` when the line carries no action marker.
fn parse_action_line(line: &str) -> Option<ActivityRecord> {
    if let Some(record) = ACTION_RULES.iter().find_map(|rule| {
        rule.pattern
            .captures(line)
            .map(|caps| structured_record(rule.action, &caps))
    }) {
        return Some(record);
    }

    let rule = ACTION_RULES
        .iter()
        .filter_map(|rule| rule.marker.find(line).map(|m| (m.start(), rule)))
        .min_by_key(|(start, _)| *start)
        .map(|(_, rule)| rule)?;

    debug!(line, action = ?rule.action, "Activity line did not match its pattern");
    Some(loose_record(rule.action, line, &rule.marker))
}

fn structured_record(action: ChangeAction, caps: &Captures<'_>) -> ActivityRecord {
    let modifier = if caps.name("you").is_some() {
        SELF_ACTOR.to_string()
    } else {
        capture(caps, "actor")
    };

    ActivityRecord {
        modifier,
        action,
        file_name: capture(caps, "item"),
        folder: capture(caps, "container"),
        time_str: String::new(),
    }
}

/// Best-effort recovery: the first quoted string before the marker is the
/// actor, the first quoted string after it is the item, and a bracketed name
/// is the container.
fn loose_record(action: ChangeAction, line: &str, marker: &Regex) -> ActivityRecord {
    let (before, after) = match marker.find(line) {
        Some(m) => (&line[..m.start()], &line[m.end()..]),
        None => (line, ""),
    };

    let modifier = QUOTED
        .captures(before)
        .map(|c| c[1].trim().to_string())
        .or_else(|| {
            let bare = before.trim();
            (bare == SELF_ACTOR).then(|| SELF_ACTOR.to_string())
        })
        .unwrap_or_default();

    let file_name = QUOTED
        .captures(after)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let folder = BRACKETED
        .captures(after)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    ActivityRecord {
        modifier,
        action,
        file_name,
        folder,
        time_str: String::new(),
    }
}

fn capture(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}
