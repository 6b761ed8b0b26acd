//! In-memory model of a Slack export: users, channels and their messages.
//!
//! Registries keep the export's order and an id index for constant-time lookups.
//! Everything here is built once by [`crate::export::ExportData`] and read-only
//! while a channel is replayed.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub real_name: String,
}

impl User {
    /// Builds a user, using the real name when the display name is empty.
    pub fn new(id: String, name: String, display_name: String, real_name: String) -> Self {
        let display_name = if display_name.is_empty() {
            real_name.clone()
        } else {
            display_name
        };
        Self {
            id,
            name,
            display_name,
            real_name,
        }
    }
}

#[derive(Debug, Default)]
pub struct Users {
    list: Vec<User>,
    by_id: HashMap<String, usize>,
}

impl Users {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user. A repeated id keeps resolving to the first occurrence.
    pub fn push(&mut self, user: User) {
        self.by_id.entry(user.id.clone()).or_insert(self.list.len());
        self.list.push(user);
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.by_id.get(id).and_then(|&i| self.list.get(i))
    }

    /// Display name for `id`, or an empty string for unknown ids (bots, deleted users).
    pub fn display_name(&self, id: &str) -> &str {
        self.get(id).map(|u| u.display_name.as_str()).unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// A file uploaded to Slack and cached locally for re-upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFile {
    pub id: String,
    pub timestamp: i64,
    pub name: String,
    pub mimetype: String,
    pub filetype: String,
    pub url: String,
    pub path: PathBuf,
}

/// A rich link preview. Rendered into the message text, never uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkAttachment {
    pub title: Option<String>,
    pub text: String,
    pub url: Option<String>,
}

impl LinkAttachment {
    /// Renders the attachment as a quote block: bold title, bare url, then the text.
    /// Returns `None` when there is nothing to show.
    pub fn to_text(&self) -> Option<String> {
        let mut lines: Vec<String> = Vec::new();
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            lines.push(format!("**{}**", title));
        }
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            lines.push(url.to_string());
        }
        if !self.text.is_empty() {
            lines.extend(self.text.split('\n').map(str::to_string));
        }

        if lines.is_empty() {
            return None;
        }

        Some(
            lines
                .iter()
                .map(|line| format!("> {}", line))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub kind: String,
    pub user_id: String,
    pub user_name: String,
    /// Slack timestamp (`"1700000000.123456"`), unique within a channel
    pub ts: String,
    pub text: String,
    pub files: Vec<AttachmentFile>,
    pub attachments: Vec<LinkAttachment>,
    pub thread_ts: String,
    pub has_thread: bool,
    pub is_reply: bool,
    pub reply_count: u64,
    pub replies_ts: Vec<String>,
}

impl Message {
    /// Formats `ts` in local time. Unparsable timestamps or formats give an empty string.
    pub fn formatted_date(&self, format: &str) -> String {
        let Some(date) = parse_slack_ts(&self.ts) else {
            return String::new();
        };

        let mut out = String::new();
        if write!(out, "{}", date.format(format)).is_err() {
            return String::new();
        }
        out
    }

    /// Composes the text posted for this message: author, date, body and link previews.
    pub fn to_text(&self, date_format: &str) -> String {
        let mut text = format!(
            "**{}** *({})*\n{}",
            self.user_name,
            self.formatted_date(date_format),
            self.text
        );
        for rendered in self.attachments.iter().filter_map(LinkAttachment::to_text) {
            text.push('\n');
            text.push_str(&rendered);
        }
        text
    }

    /// Timestamp shared by this message's thread; a root without `thread_ts` uses its own `ts`.
    pub fn thread_key(&self) -> &str {
        if self.thread_ts.is_empty() {
            &self.ts
        } else {
            &self.thread_ts
        }
    }
}

fn parse_slack_ts(ts: &str) -> Option<DateTime<Local>> {
    let value: f64 = ts.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let secs = value.trunc() as i64;
    let nanos = ((value - value.trunc()) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.with_timezone(&Local))
}

#[derive(Debug, Default)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub topic: String,
    pub purpose: String,
    pub member_ids: Vec<String>,
    messages: Vec<Message>,
}

impl Channel {
    pub fn new(id: String, name: String, topic: String, purpose: String, member_ids: Vec<String>) -> Self {
        Self {
            id,
            name,
            topic,
            purpose,
            member_ids,
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Members known to `users`, in export order.
    pub fn members<'a>(&'a self, users: &'a Users) -> impl Iterator<Item = &'a User> + 'a {
        self.member_ids.iter().filter_map(|id| users.get(id))
    }

    pub fn find_message_by_ts(&self, ts: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.ts == ts)
    }

    /// Replies of a thread root, in stored order. Empty when `root` starts no thread.
    pub fn find_replies<'a>(&'a self, root: &Message) -> Vec<&'a Message> {
        if !root.has_thread {
            return Vec::new();
        }
        let key = root.thread_key();
        self.messages
            .iter()
            .filter(|m| m.is_reply && m.thread_ts == key)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Channels {
    list: Vec<Channel>,
    by_id: HashMap<String, usize>,
}

impl Channels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: Channel) {
        self.by_id.entry(channel.id.clone()).or_insert(self.list.len());
        self.list.push(channel);
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.by_id.get(id).and_then(|&i| self.list.get(i))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Channel> {
        let index = *self.by_id.get(id)?;
        self.list.get_mut(index)
    }

    /// Looks a channel up by id, then by name.
    pub fn find(&self, key: &str) -> Option<&Channel> {
        self.get(key)
            .or_else(|| self.list.iter().find(|c| c.name == key))
    }

    pub fn name_by_id(&self, id: &str) -> Option<&str> {
        self.get(id).map(|c| c.name.as_str())
    }

    pub fn ids(&self) -> Vec<String> {
        self.list.iter().map(|c| c.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
