//! Data model for DriveWatch change detection.
//!
//! These types are shared between the differ, the router and the snapshot
//! store. Everything that is persisted serializes to the logical layout the
//! snapshot file has always used, so older files stay loadable.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Actor name used when the source reports no modifier.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// A file or sub-folder observed inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Modified timestamp exactly as the UI rendered it.
    pub date: String,

    /// Display name of the last modifier. Empty when the UI showed none.
    #[serde(default)]
    pub by: String,
}

impl ItemRecord {
    #[must_use]
    pub fn new(date: impl Into<String>, by: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            by: by.into(),
        }
    }
}

/// A stored item value as it may appear on disk.
///
/// Early snapshot files stored only the modified date as a bare string; later
/// ones store `{ "date", "by" }`. Both shapes must load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    /// Legacy shape: the modified date only.
    Bare(String),
    /// Current shape.
    Detailed(ItemRecord),
}

impl ItemValue {
    /// Normalizes either shape to an [`ItemRecord`].
    #[must_use]
    pub fn to_record(&self) -> ItemRecord {
        match self {
            Self::Bare(date) => ItemRecord::new(date.clone(), String::new()),
            Self::Detailed(record) => record.clone(),
        }
    }

    /// The modified date, regardless of shape.
    #[must_use]
    pub fn date(&self) -> &str {
        match self {
            Self::Bare(date) => date,
            Self::Detailed(record) => &record.date,
        }
    }

    /// Compares two values by modified date only.
    ///
    /// A bare string and a detailed record with the same date are the same
    /// observation.
    #[must_use]
    pub fn same_date(&self, other: &Self) -> bool {
        self.date() == other.date()
    }
}

impl From<ItemRecord> for ItemValue {
    fn from(record: ItemRecord) -> Self {
        Self::Detailed(record)
    }
}

/// Items of one container, keyed by item name, in scrape order.
pub type ContainerItems = IndexMap<String, ItemValue>;

/// Listing-form snapshot: container name to item name to value.
///
/// Containers and items keep the order they were scraped in, and the file
/// keeps that order too. A legacy file may map a container directly to a bare
/// date string (the container itself was the only tracked item); that shape
/// is accepted through [`ContainerEntry::Bare`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingSnapshot {
    pub containers: IndexMap<String, ContainerEntry>,
}

/// One container entry in a listing snapshot.
///
/// Variant order matters for untagged loading: `Dated` must be tried before
/// `Items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContainerEntry {
    /// Legacy shape: only the container's own modified date was stored.
    Bare(String),
    /// The container's own modified date plus its items.
    #[serde(deny_unknown_fields)]
    Dated {
        modified: String,
        #[serde(default)]
        items: ContainerItems,
    },
    /// Per-item state.
    Items(ContainerItems),
}

impl ContainerEntry {
    /// Returns the item map, or `None` for a legacy bare entry.
    #[must_use]
    pub fn items(&self) -> Option<&ContainerItems> {
        match self {
            Self::Bare(_) => None,
            Self::Dated { items, .. } | Self::Items(items) => Some(items),
        }
    }

    /// The container's own modified date, when one was recorded.
    #[must_use]
    pub fn modified(&self) -> Option<&str> {
        match self {
            Self::Bare(date) | Self::Dated { modified: date, .. } => Some(date),
            Self::Items(_) => None,
        }
    }

    fn items_mut(&mut self) -> &mut ContainerItems {
        if let Self::Bare(date) = self {
            *self = Self::Dated {
                modified: std::mem::take(date),
                items: ContainerItems::new(),
            };
        }
        match self {
            Self::Dated { items, .. } | Self::Items(items) => items,
            Self::Bare(_) => unreachable!("bare entries are converted above"),
        }
    }
}

impl ListingSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Records an item, creating its container if needed.
    ///
    /// A legacy bare container entry keeps its date and gains an item map.
    pub fn insert(&mut self, container: &str, item: &str, record: ItemRecord) {
        self.containers
            .entry(container.to_string())
            .or_insert_with(|| ContainerEntry::Items(ContainerItems::new()))
            .items_mut()
            .insert(item.to_string(), record.into());
    }

    /// Ensures a container exists even if it holds no items.
    pub fn touch_container(&mut self, container: &str) {
        self.containers
            .entry(container.to_string())
            .or_insert_with(|| ContainerEntry::Items(ContainerItems::new()));
    }

    /// Records the container's own modified date, keeping its items.
    pub fn set_container_modified(&mut self, container: &str, date: &str) {
        let entry = self
            .containers
            .entry(container.to_string())
            .or_insert_with(|| ContainerEntry::Items(ContainerItems::new()));
        let items = std::mem::take(entry.items_mut());
        *entry = ContainerEntry::Dated {
            modified: date.to_string(),
            items,
        };
    }

    /// Looks up a stored item value.
    #[must_use]
    pub fn item(&self, container: &str, item: &str) -> Option<&ItemValue> {
        self.containers
            .get(container)
            .and_then(ContainerEntry::items)
            .and_then(|items| items.get(item))
    }

    /// Total number of items across all containers.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.containers
            .values()
            .filter_map(ContainerEntry::items)
            .map(|items| items.len())
            .sum()
    }
}

/// One parsed activity-feed entry.
///
/// Field names match the persisted activity form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Who made the change (`You` when the viewer did).
    #[serde(default)]
    pub modifier: String,

    #[serde(default)]
    pub action: ChangeAction,

    #[serde(default)]
    pub file_name: String,

    /// Container the item lives in. Empty when the entry does not say.
    #[serde(default)]
    pub folder: String,

    /// The timestamp line as rendered, unparsed.
    #[serde(default)]
    pub time_str: String,
}

/// Activity-form snapshot: watermark plus the last observed feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityState {
    /// When the last successful check ran. `None` before the first run.
    #[serde(default, with = "watermark_format")]
    pub last_check: Option<NaiveDateTime>,

    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
}

/// ISO-8601 (`YYYY-MM-DDTHH:MM:SS`) watermark encoding.
///
/// Unreadable watermarks decode as `None` rather than failing the load.
mod watermark_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|s| {
            NaiveDateTime::parse_from_str(&s, FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f"))
                .ok()
        }))
    }
}

/// Kind of change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    #[default]
    #[serde(alias = "edited")]
    Modified,
    Deleted,
    /// A container appeared that the previous snapshot did not have.
    NewContainer,
    /// A container's own modified date changed.
    ContainerModified,
}

impl ChangeAction {
    /// Glyph shown in front of each change line.
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Created => "🆕",
            Self::Modified => "✏️",
            Self::Deleted => "🗑️",
            Self::NewContainer | Self::ContainerModified => "📁",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::NewContainer => "new folder",
            Self::ContainerModified => "folder updated",
        }
    }

    /// True for changes to a container itself rather than an item in it.
    #[must_use]
    pub fn is_container_level(self) -> bool {
        matches!(self, Self::NewContainer | Self::ContainerModified)
    }
}

/// An atomic change produced by the differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub container: String,

    /// Item name. Empty for container-level actions.
    pub item: String,

    pub action: ChangeAction,

    /// Actor display name. `None` for container-level actions.
    pub actor: Option<String>,

    /// Timestamp as the source rendered it.
    pub time_str: String,

    /// Best-effort absolute timestamp.
    pub timestamp: Option<NaiveDateTime>,
}

impl ChangeEvent {
    /// Grouping key for routing: the actor, or [`UNKNOWN_ACTOR`].
    #[must_use]
    pub fn actor_key(&self) -> &str {
        match self.actor.as_deref() {
            Some(actor) if !actor.trim().is_empty() => actor,
            _ => UNKNOWN_ACTOR,
        }
    }
}

/// A member of the notification roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    /// Name shown in the mention.
    pub display_name: String,

    /// Chat identity the mention resolves to (e.g. a UPN or email).
    pub chat_id: String,

    /// The person's name as the document store shows it in activity.
    pub source_name: String,
}

/// Fixed notification roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientPolicy {
    pub recipients: Vec<Recipient>,
}

impl RecipientPolicy {
    #[must_use]
    pub fn new(recipients: Vec<Recipient>) -> Self {
        Self { recipients }
    }

    /// Finds the roster member whose source name equals `actor` exactly.
    #[must_use]
    pub fn member_for_actor(&self, actor: &str) -> Option<&Recipient> {
        self.recipients.iter().find(|r| r.source_name == actor)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// A chat mention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Mention {
    pub id: String,
    pub display_name: String,
}

impl From<&Recipient> for Mention {
    fn from(recipient: &Recipient) -> Self {
        Self {
            id: recipient.chat_id.clone(),
            display_name: recipient.display_name.clone(),
        }
    }
}

/// A formatted message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationMessage {
    /// Actor group this message covers, or `None` for container discoveries
    /// and operator errors.
    pub actor: Option<String>,
    pub body: String,
    pub mentions: Vec<Mention>,
}
