//! Snapshot differencing.
//!
//! Two strategies produce [`ChangeEvent`]s:
//!
//! - **Listing**: compare the container/item map scraped now with the one
//!   persisted by the previous run.
//! - **Activity feed**: keep the parsed feed records whose timestamp is
//!   strictly newer than the previous run's watermark.
//!
//! Both are baseline-aware: with no previous generation they report nothing.
//! Output order is the as-read order of the current snapshot: containers and
//! items in scrape order for listings, feed order for activity.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timeparse::parse_relative_time;
use crate::types::{ActivityRecord, ChangeAction, ChangeEvent, ContainerEntry, ListingSnapshot};

/// Which differ a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
    /// Folder-listing comparison.
    Listing,
    /// Activity-feed watermark filtering.
    #[default]
    Activity,
}

impl fmt::Display for DiffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing => f.write_str("listing"),
            Self::Activity => f.write_str("activity"),
        }
    }
}

impl FromStr for DiffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listing" => Ok(Self::Listing),
            "activity" | "activity_feed" | "activity-feed" => Ok(Self::Activity),
            other => Err(format!("expected 'listing' or 'activity', got '{other}'")),
        }
    }
}

/// Compares two listing generations.
///
/// `previous` is `None` on the first run, which only establishes a baseline.
///
/// - An item present in both generations with a different date is `modified`,
///   attributed to the current modifier.
/// - An item absent from the previous generation of a known container is
///   `created`.
/// - A container absent from the previous generation yields a single
///   `new_container` event with no actor; its items are not reported
///   individually.
/// - A container whose own modified date differs from the stored one yields a
///   `container_modified` event with no actor, ahead of its item events.
///
/// Stored values are compared by date only, so a legacy bare date and a
/// `{date, by}` record with the same date are equal.
#[must_use]
pub fn diff_listing(previous: Option<&ListingSnapshot>, current: &ListingSnapshot) -> Vec<ChangeEvent> {
    let Some(previous) = previous else {
        debug!("No previous listing, establishing baseline");
        return Vec::new();
    };

    let mut events = Vec::new();

    for (container, entry) in &current.containers {
        let Some(prev_entry) = previous.containers.get(container) else {
            events.push(container_event(container, ChangeAction::NewContainer, entry));
            continue;
        };

        if let (Some(before), Some(after)) = (prev_entry.modified(), entry.modified()) {
            if before != after {
                events.push(container_event(container, ChangeAction::ContainerModified, entry));
            }
        }

        let Some(items) = entry.items() else {
            continue;
        };

        let prev_items = prev_entry.items();

        for (name, value) in items {
            let record = value.to_record();
            let action = match prev_items.and_then(|p| p.get(name)) {
                Some(prev) if prev.same_date(value) => continue,
                Some(_) => ChangeAction::Modified,
                // A legacy bare container carries no item list, so every item
                // would look new. Treat it as a baseline for its items.
                None if prev_items.is_none() => continue,
                None => ChangeAction::Created,
            };

            events.push(ChangeEvent {
                container: container.clone(),
                item: name.clone(),
                action,
                actor: Some(record.by).filter(|by| !by.is_empty()),
                time_str: record.date,
                timestamp: None,
            });
        }
    }

    events
}

fn container_event(container: &str, action: ChangeAction, entry: &ContainerEntry) -> ChangeEvent {
    ChangeEvent {
        container: container.to_string(),
        item: String::new(),
        action,
        actor: None,
        time_str: entry.modified().unwrap_or_default().to_string(),
        timestamp: None,
    }
}

/// Selects the feed records newer than the watermark.
///
/// A record qualifies iff its timestamp parses (relative to `now`) and is
/// strictly after `watermark`. With no watermark nothing qualifies.
#[must_use]
pub fn diff_activity(
    records: &[ActivityRecord],
    watermark: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Vec<ChangeEvent> {
    let Some(watermark) = watermark else {
        debug!(records = records.len(), "No watermark, establishing baseline");
        return Vec::new();
    };

    records
        .iter()
        .filter_map(|record| {
            let Some(timestamp) = parse_relative_time(&record.time_str, now) else {
                debug!(
                    file = %record.file_name,
                    time = %record.time_str,
                    "Unparseable activity time, skipping"
                );
                return None;
            };

            if timestamp <= watermark {
                return None;
            }

            Some(ChangeEvent {
                container: record.folder.clone(),
                item: record.file_name.clone(),
                action: record.action,
                actor: Some(record.modifier.clone()).filter(|m| !m.is_empty()),
                time_str: record.time_str.clone(),
                timestamp: Some(timestamp),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemRecord;
    use chrono::NaiveDate;

    fn listing(json: serde_json::Value) -> ListingSnapshot {
        serde_json::from_value(json).unwrap()
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn record(modifier: &str, file: &str, time: &str) -> ActivityRecord {
        ActivityRecord {
            modifier: modifier.to_string(),
            action: ChangeAction::Modified,
            file_name: file.to_string(),
            folder: "CCBP".to_string(),
            time_str: time.to_string(),
        }
    }

    #[test]
    fn test_listing_same_snapshot_yields_nothing() {
        let s = listing(serde_json::json!({
            "A": {"f.xlsx": {"date": "2024/01/01", "by": "X"}, "g.docx": "Dec 17"},
            "B": {}
        }));
        assert!(diff_listing(Some(&s), &s).is_empty());
    }

    #[test]
    fn test_listing_first_run_is_baseline() {
        let current = listing(serde_json::json!({"A": {"f.xlsx": {"date": "2024/01/01", "by": "X"}}}));
        assert!(diff_listing(None, &current).is_empty());
    }

    #[test]
    fn test_listing_modified_attributed_to_current_actor() {
        let previous = listing(serde_json::json!({"A": {"f.xlsx": {"date": "2024/01/01", "by": "X"}}}));
        let current = listing(serde_json::json!({"A": {"f.xlsx": {"date": "2024/01/02", "by": "Y"}}}));

        let events = diff_listing(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::Modified);
        assert_eq!(events[0].actor.as_deref(), Some("Y"));
        assert_eq!(events[0].container, "A");
        assert_eq!(events[0].item, "f.xlsx");
        assert_eq!(events[0].time_str, "2024/01/02");
    }

    #[test]
    fn test_listing_legacy_value_equal_when_dates_match() {
        let previous = listing(serde_json::json!({"A": {"f.xlsx": "2024/01/01"}}));
        let current = listing(serde_json::json!({"A": {"f.xlsx": {"date": "2024/01/01", "by": "Y"}}}));
        assert!(diff_listing(Some(&previous), &current).is_empty());
    }

    #[test]
    fn test_listing_new_item_is_created() {
        let previous = listing(serde_json::json!({"A": {"f.xlsx": "2024/01/01"}}));
        let mut current = previous.clone();
        current.insert("A", "new.pptx", ItemRecord::new("just now", "Joy Lu"));

        let events = diff_listing(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::Created);
        assert_eq!(events[0].item, "new.pptx");
        assert_eq!(events[0].actor.as_deref(), Some("Joy Lu"));
    }

    #[test]
    fn test_listing_new_container_has_no_actor() {
        let previous = listing(serde_json::json!({"A": {}}));
        let current = listing(serde_json::json!({
            "A": {},
            "B": {"x.xlsx": {"date": "1 hour ago", "by": "Z"}}
        }));

        let events = diff_listing(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::NewContainer);
        assert_eq!(events[0].container, "B");
        assert!(events[0].actor.is_none());
    }

    #[test]
    fn test_listing_empty_modifier_becomes_none() {
        let previous = listing(serde_json::json!({"A": {"f.xlsx": "2024/01/01"}}));
        let current = listing(serde_json::json!({"A": {"f.xlsx": "2024/01/05"}}));
        let events = diff_listing(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert!(events[0].actor.is_none());
    }

    #[test]
    fn test_listing_legacy_bare_container_is_item_baseline() {
        let previous = listing(serde_json::json!({"A": "2024/01/01"}));
        let current = listing(serde_json::json!({"A": {"f.xlsx": {"date": "2024/01/02", "by": "Y"}}}));
        assert!(diff_listing(Some(&previous), &current).is_empty());
    }

    #[test]
    fn test_listing_order_follows_current_snapshot() {
        let previous = listing(serde_json::json!({"A": {"m.xlsx": "1"}, "Z": {"alpha.xlsx": "1", "zeta.xlsx": "1"}}));
        let mut current = ListingSnapshot::new();
        current.insert("Z", "zeta.xlsx", ItemRecord::new("2", ""));
        current.insert("Z", "alpha.xlsx", ItemRecord::new("2", ""));
        current.insert("A", "m.xlsx", ItemRecord::new("2", ""));

        let items: Vec<String> = diff_listing(Some(&previous), &current)
            .into_iter()
            .map(|e| format!("{}/{}", e.container, e.item))
            .collect();
        assert_eq!(items, vec!["Z/zeta.xlsx", "Z/alpha.xlsx", "A/m.xlsx"]);
    }

    #[test]
    fn test_listing_container_date_change() {
        let previous = listing(serde_json::json!({
            "A": {"modified": "2024/01/01", "items": {"f.xlsx": "2024/01/01"}},
            "B": "2024/01/01"
        }));
        let current = listing(serde_json::json!({
            "A": {"modified": "2024/01/02", "items": {"f.xlsx": "2024/01/02"}},
            "B": {"modified": "2024/01/05", "items": {}}
        }));

        let events = diff_listing(Some(&previous), &current);
        let summary: Vec<(ChangeAction, &str, &str)> = events
            .iter()
            .map(|e| (e.action, e.container.as_str(), e.item.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ChangeAction::ContainerModified, "A", ""),
                (ChangeAction::Modified, "A", "f.xlsx"),
                (ChangeAction::ContainerModified, "B", ""),
            ]
        );
        assert_eq!(events[0].time_str, "2024/01/02");
        assert!(events[0].actor.is_none());
        assert_eq!(events[2].time_str, "2024/01/05");
    }

    #[test]
    fn test_listing_unchanged_container_date_is_silent() {
        let s = listing(serde_json::json!({"A": {"modified": "2024/01/01", "items": {}}}));
        assert!(diff_listing(Some(&s), &s).is_empty());

        // No date on either side to compare.
        let previous = listing(serde_json::json!({"A": {}}));
        assert!(diff_listing(Some(&previous), &s).is_empty());
    }

    #[test]
    fn test_activity_without_watermark_is_baseline() {
        let records = vec![record("Joy Lu", "a.xlsx", "just now")];
        assert!(diff_activity(&records, None, at(20, 10)).is_empty());
    }

    #[test]
    fn test_activity_keeps_only_strictly_newer() {
        let now = at(20, 10);
        let watermark = at(20, 7);
        let records = vec![
            record("Joy Lu", "newer.xlsx", "2 hours ago"),
            record("Ann", "equal.xlsx", "3 hours ago"),
            record("Bob", "older.xlsx", "5 hours ago"),
        ];

        let events = diff_activity(&records, Some(watermark), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item, "newer.xlsx");
        assert_eq!(events[0].actor.as_deref(), Some("Joy Lu"));
        assert_eq!(events[0].timestamp, Some(at(20, 8)));
        assert_eq!(events[0].container, "CCBP");
    }

    #[test]
    fn test_activity_unparseable_time_is_excluded() {
        let records = vec![
            record("Joy Lu", "a.xlsx", "sometime"),
            record("Joy Lu", "b.xlsx", ""),
        ];
        assert!(diff_activity(&records, Some(at(1, 0)), at(20, 10)).is_empty());
    }

    #[test]
    fn test_activity_preserves_feed_order() {
        let records = vec![
            record("B", "second.xlsx", "1 hour ago"),
            record("A", "first.xlsx", "just now"),
        ];
        let items: Vec<_> = diff_activity(&records, Some(at(20, 0)), at(20, 10))
            .into_iter()
            .map(|e| e.item)
            .collect();
        assert_eq!(items, vec!["second.xlsx", "first.xlsx"]);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("listing".parse::<DiffStrategy>(), Ok(DiffStrategy::Listing));
        assert_eq!("Activity".parse::<DiffStrategy>(), Ok(DiffStrategy::Activity));
        assert!("hourly".parse::<DiffStrategy>().is_err());
        assert_eq!(DiffStrategy::default(), DiffStrategy::Activity);
        assert_eq!(DiffStrategy::Listing.to_string(), "listing");
    }
}
