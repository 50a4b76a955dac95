//! Notification routing.
//!
//! Turns a run's change events into chat messages:
//!
//! 1. Container discoveries and container date changes go into one folder
//!    message that mentions the whole roster.
//! 2. Remaining events are grouped by actor (first-appearance order). Each
//!    group mentions the roster minus the actor, when the actor is on it.
//! 3. Repeated change lines within a group and repeated messages are dropped,
//!    so the transport is called at most once per distinct message.
//!
//! Actor matching is exact string equality between the scraped display name
//! and [`Recipient::source_name`](crate::types::Recipient::source_name).

use std::collections::HashSet;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::types::{
    ChangeAction, ChangeEvent, Mention, NotificationMessage, RecipientPolicy, UNKNOWN_ACTOR,
};

/// Timestamp format for the "checked at" line.
const CHECK_TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Builds notification messages from change events.
#[derive(Debug, Clone)]
pub struct Router {
    policy: RecipientPolicy,
    title: String,
    folder_url: Option<String>,
}

impl Router {
    #[must_use]
    pub fn new(policy: RecipientPolicy, title: impl Into<String>, folder_url: Option<String>) -> Self {
        Self {
            policy,
            title: title.into(),
            folder_url,
        }
    }

    /// Routes events into messages. `checked_at` is the run time, not the
    /// event time.
    #[must_use]
    pub fn route(&self, events: &[ChangeEvent], checked_at: NaiveDateTime) -> Vec<NotificationMessage> {
        let (folders, changes): (Vec<&ChangeEvent>, Vec<&ChangeEvent>) = events
            .iter()
            .partition(|event| event.action.is_container_level());

        let mut messages = Vec::new();

        if !folders.is_empty() {
            messages.push(self.folder_message(&folders, checked_at));
        }

        for (actor, group) in group_by_actor(&changes) {
            messages.push(self.actor_message(actor, &group, checked_at));
        }

        let mut seen = HashSet::new();
        messages.retain(|message| {
            let fresh = seen.insert((message.body.clone(), message.mentions.clone()));
            if !fresh {
                debug!(actor = ?message.actor, "Dropping duplicate notification");
            }
            fresh
        });

        messages
    }

    /// Mention set for a change made by `actor`.
    ///
    /// A roster member is never pinged about their own change; external or
    /// unresolved actors ping everyone.
    #[must_use]
    pub fn mentions_for(&self, actor: &str) -> Vec<Mention> {
        let excluded = self.policy.member_for_actor(actor);
        self.policy
            .recipients
            .iter()
            .filter(|recipient| Some(*recipient) != excluded)
            .map(Mention::from)
            .collect()
    }

    /// Everyone on the roster.
    #[must_use]
    pub fn mention_all(&self) -> Vec<Mention> {
        self.policy.recipients.iter().map(Mention::from).collect()
    }

    fn header(&self, checked_at: NaiveDateTime) -> String {
        format!(
            "🔔 **{}**\n\n⏰ Checked at: {}",
            self.title,
            checked_at.format(CHECK_TIME_FORMAT)
        )
    }

    fn footer(&self) -> String {
        match &self.folder_url {
            Some(url) => format!("\n\n[Open folder]({url})"),
            None => String::new(),
        }
    }

    fn actor_message(
        &self,
        actor: &str,
        group: &[&ChangeEvent],
        checked_at: NaiveDateTime,
    ) -> NotificationMessage {
        let mut seen = HashSet::new();
        let lines: Vec<String> = group
            .iter()
            .map(|event| change_line(event))
            .filter(|line| seen.insert(line.clone()))
            .collect();

        let body = format!(
            "{}\n\n👤 {}\n\n{}{}",
            self.header(checked_at),
            actor,
            lines.join("\n"),
            self.footer()
        );

        NotificationMessage {
            actor: Some(actor.to_string()),
            body,
            mentions: self.mentions_for(actor),
        }
    }

    fn folder_message(&self, events: &[&ChangeEvent], checked_at: NaiveDateTime) -> NotificationMessage {
        let mut seen = HashSet::new();
        let lines: Vec<String> = events
            .iter()
            .map(|event| folder_line(event))
            .filter(|line| seen.insert(line.clone()))
            .collect();

        let body = format!(
            "{}\n\n{}{}",
            self.header(checked_at),
            lines.join("\n"),
            self.footer()
        );

        NotificationMessage {
            actor: None,
            body,
            mentions: self.mention_all(),
        }
    }
}

/// Formats a container-level line: `📁 New folder: [X]` or
/// `📁 [X] folder updated: <date>`.
fn folder_line(event: &ChangeEvent) -> String {
    let glyph = event.action.glyph();
    match event.action {
        ChangeAction::ContainerModified if !event.time_str.is_empty() => format!(
            "{glyph} [{}] {}: {}",
            event.container,
            event.action.label(),
            event.time_str
        ),
        ChangeAction::ContainerModified => {
            format!("{glyph} [{}] {}", event.container, event.action.label())
        }
        _ => format!("{glyph} New folder: [{}]", event.container),
    }
}

/// Formats `<glyph> <action>: [<container>] <item>`; the bracket is omitted
/// when the source did not name a container.
fn change_line(event: &ChangeEvent) -> String {
    let action = event.action;
    if event.container.is_empty() {
        format!("{} {}: {}", action.glyph(), action.label(), event.item)
    } else {
        format!(
            "{} {}: [{}] {}",
            action.glyph(),
            action.label(),
            event.container,
            event.item
        )
    }
}

/// Groups events by actor key, keeping first-appearance order of actors and
/// as-read order within each group.
fn group_by_actor<'a>(events: &[&'a ChangeEvent]) -> Vec<(&'a str, Vec<&'a ChangeEvent>)> {
    let mut groups: Vec<(&'a str, Vec<&'a ChangeEvent>)> = Vec::new();

    for &event in events {
        let key = event.actor_key();
        match groups.iter_mut().find(|(actor, _)| *actor == key) {
            Some((_, group)) => group.push(event),
            None => groups.push((key, vec![event])),
        }
    }

    if groups.iter().any(|(actor, _)| *actor == UNKNOWN_ACTOR) {
        debug!("Some changes have no resolvable actor");
    }

    groups
}
