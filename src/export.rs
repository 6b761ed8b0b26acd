//! Loading a Slack export from disk into the [`crate::model`] types.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use walkdir::WalkDir;

use crate::ProgressCallback;
use crate::error::{AppError, Result};
use crate::fetcher::FileFetcher;
use crate::model::{AttachmentFile, Channel, Channels, LinkAttachment, Message, User, Users};
use crate::references::{Resolver, url_unescape};

pub const USERS_FILE: &str = "users.json";
pub const CHANNELS_FILE: &str = "channels.json";

const HOSTED_MODE: &str = "hosted";

#[allow(clippy::expect_used)] // literal pattern
static DAY_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\.json$").expect("valid day file regex"));

#[derive(Debug, Default, Deserialize)]
struct RawUser {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    profile: Option<RawProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawChannel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    topic: Option<RawValue>,
    #[serde(default)]
    purpose: Option<RawValue>,
    #[serde(default)]
    members: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(default)]
    attachments: Option<Vec<RawAttachment>>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reply_count: Option<u64>,
    #[serde(default)]
    replies: Option<Vec<RawReply>>,
    #[serde(default)]
    parent_user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    filetype: Option<String>,
    #[serde(default)]
    url_private_download: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttachment {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    original_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReply {
    #[serde(default)]
    ts: Option<String>,
}

/// A loaded export: registries plus where its files live.
#[derive(Debug)]
pub struct ExportData {
    pub data_dir: PathBuf,
    pub files_dir: PathBuf,
    pub users: Users,
    pub channels: Channels,
}

impl ExportData {
    /// Reads `users.json` and `channels.json`. Messages are loaded separately by
    /// [`ExportData::parse_all_channels`].
    pub fn load(data_dir: &Path, files_dir: &Path) -> Result<Self> {
        let raw_users: Vec<RawUser> = read_json(&data_dir.join(USERS_FILE))?;
        let mut users = Users::new();
        for raw in raw_users {
            let profile = raw.profile.unwrap_or_default();
            users.push(User::new(
                raw.id,
                raw.name.unwrap_or_default(),
                profile.display_name.unwrap_or_default(),
                profile.real_name.unwrap_or_default(),
            ));
        }

        let raw_channels: Vec<RawChannel> = read_json(&data_dir.join(CHANNELS_FILE))?;
        let mut channels = Channels::new();
        for raw in raw_channels {
            let members = raw.members.unwrap_or_default();
            for unknown in members.iter().filter(|id| users.get(id).is_none()) {
                log::debug!("Channel {} lists unknown member {}", raw.id, unknown);
            }
            channels.push(Channel::new(
                raw.id,
                raw.name.unwrap_or_default(),
                raw.topic.and_then(|t| t.value).unwrap_or_default(),
                raw.purpose.and_then(|p| p.value).unwrap_or_default(),
                members,
            ));
        }

        log::info!(
            "Loaded {} users and {} channels from {}",
            users.len(),
            channels.len(),
            data_dir.display()
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            files_dir: files_dir.to_path_buf(),
            users,
            channels,
        })
    }

    /// Parses the message logs of every channel, in registry order.
    pub fn parse_all_channels(
        &mut self,
        fetcher: &dyn FileFetcher,
        progress_callback: ProgressCallback,
    ) -> Result<usize> {
        let mut total = 0;
        for channel_id in self.channels.ids() {
            total += self.parse_channel(&channel_id, fetcher, progress_callback)?;
        }
        Ok(total)
    }

    /// Parses one channel's day files in chronological order and appends the
    /// messages. Returns the number of messages added.
    pub fn parse_channel(
        &mut self,
        channel_id: &str,
        fetcher: &dyn FileFetcher,
        progress_callback: ProgressCallback,
    ) -> Result<usize> {
        let channel_name = self
            .channels
            .name_by_id(channel_id)
            .ok_or_else(|| AppError::UnknownChannel(channel_id.to_string()))?
            .to_string();

        log::info!("Processing #{}", channel_name);

        let day_files = list_day_files(&self.data_dir.join(&channel_name))?;
        let total = day_files.len();

        let mut messages = Vec::new();
        for (idx, path) in day_files.iter().enumerate() {
            let raw_messages: Vec<RawMessage> = read_json(path)?;
            for raw in raw_messages {
                messages.push(self.parse_message(raw, fetcher)?);
            }
            if let Some(cb) = progress_callback {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                cb(idx + 1, total, name);
            }
        }

        let count = messages.len();
        if let Some(channel) = self.channels.get_mut(channel_id) {
            for message in messages {
                channel.add_message(message);
            }
        }
        Ok(count)
    }

    fn parse_message(&self, raw: RawMessage, fetcher: &dyn FileFetcher) -> Result<Message> {
        let resolver = Resolver::new(&self.users, &self.channels);

        let user_id = raw.user.or(raw.bot_id).unwrap_or_default();
        let user_name = self.users.display_name(&user_id).to_string();

        let mut files = Vec::new();
        for raw_file in raw.files.unwrap_or_default() {
            if let Some(file) = self.download_file(raw_file, fetcher)? {
                files.push(file);
            }
        }

        let attachments = raw
            .attachments
            .unwrap_or_default()
            .into_iter()
            .map(|a| LinkAttachment {
                title: a.title,
                text: resolver.resolve_attachment_text(&a.text.unwrap_or_default()),
                url: a.original_url.map(|u| url_unescape(&u)),
            })
            .collect();

        // A reply never counts as a thread root, whatever else it carries.
        let is_reply = raw.parent_user_id.is_some();
        let has_thread = !is_reply && raw.reply_count.is_some();
        let replies_ts = if has_thread {
            raw.replies
                .unwrap_or_default()
                .into_iter()
                .filter_map(|r| r.ts)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Message {
            kind: raw.kind.unwrap_or_default(),
            user_id,
            user_name,
            ts: raw.ts.unwrap_or_default(),
            text: resolver.resolve_body(&raw.text.unwrap_or_default()),
            files,
            attachments,
            thread_ts: raw.thread_ts.unwrap_or_default(),
            has_thread,
            is_reply,
            reply_count: raw.reply_count.unwrap_or_default(),
            replies_ts,
        })
    }

    /// Fetches a hosted file into `files_dir`. Other modes (external links,
    /// tombstones) yield `None`.
    fn download_file(
        &self,
        raw: RawFile,
        fetcher: &dyn FileFetcher,
    ) -> Result<Option<AttachmentFile>> {
        let id = raw.id.unwrap_or_default();
        if raw.mode.as_deref() != Some(HOSTED_MODE) {
            log::debug!("Skipping file {} with mode {:?}", id, raw.mode);
            return Ok(None);
        }

        let url = url_unescape(&raw.url_private_download.unwrap_or_default());
        if url.is_empty() || id.is_empty() {
            log::warn!("Hosted file '{}' has no download url, skipping", id);
            return Ok(None);
        }

        fs::create_dir_all(&self.files_dir).map_err(|e| AppError::WriteFile {
            path: self.files_dir.display().to_string(),
            source: e,
        })?;
        let path = self.files_dir.join(&id);
        fetcher.fetch(&url, &path)?;

        Ok(Some(AttachmentFile {
            id,
            timestamp: raw.timestamp.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
            mimetype: url_unescape(&raw.mimetype.unwrap_or_default()),
            filetype: raw.filetype.unwrap_or_default(),
            url,
            path,
        }))
    }
}

/// Day files (`YYYY-MM-DD.json`) directly inside `dir`, sorted by name.
/// A missing directory holds no messages; anything else that cannot be listed is an error.
fn list_day_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let list_error = |message: String| AppError::ListDir {
        path: dir.display().to_string(),
        message,
    };

    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(list_error("not a directory".to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("No message directory at {}", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(list_error(e.to_string())),
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| list_error(e.to_string()))?;
        let is_day_file = entry.file_type().is_file()
            && entry.file_name().to_str().is_some_and(|n| DAY_FILE.is_match(n));
        if is_day_file {
            paths.push(entry.into_path());
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| AppError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|e| AppError::JsonParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Writes fixed bytes instead of hitting the network and remembers each call.
    #[derive(Default)]
    struct MemoryFetcher {
        calls: RefCell<Vec<(String, PathBuf)>>,
        fail: bool,
    }

    impl FileFetcher for MemoryFetcher {
        fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((url.to_string(), destination.to_path_buf()));
            if self.fail {
                return Err(AppError::Download {
                    url: url.to_string(),
                    message: "HTTP 404 Not Found".to_string(),
                });
            }
            fs::write(destination, b"payload").map_err(|e| AppError::WriteFile {
                path: destination.display().to_string(),
                source: e,
            })
        }
    }

    fn write(dir: &Path, relative: &str, value: serde_json::Value) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    fn create_test_export() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            USERS_FILE,
            serde_json::json!([
                {"id": "U01", "name": "alice", "profile": {"display_name": "Alice", "real_name": "Alice Liddell"}},
                {"id": "U02", "name": "bob", "profile": {"display_name": "", "real_name": "Bob Builder"}}
            ]),
        );
        write(
            dir.path(),
            CHANNELS_FILE,
            serde_json::json!([
                {"id": "C01", "name": "general", "topic": {"value": "Company-wide"}, "purpose": {"value": "All hands"}, "members": ["U01", "U02"]},
                {"id": "C02", "name": "random", "topic": {"value": ""}, "purpose": {"value": ""}}
            ]),
        );
        dir
    }

    fn load(dir: &TempDir) -> ExportData {
        ExportData::load(dir.path(), &dir.path().join("files")).unwrap()
    }

    #[test]
    fn test_load_registries() {
        let dir = create_test_export();
        let export = load(&dir);

        assert_eq!(export.users.len(), 2);
        assert_eq!(export.users.display_name("U02"), "Bob Builder");
        let general = export.channels.get("C01").unwrap();
        assert_eq!(general.topic, "Company-wide");
        assert_eq!(general.purpose, "All hands");
        assert_eq!(general.members(&export.users).count(), 2);
        assert!(export.channels.get("C02").unwrap().member_ids.is_empty());
    }

    #[test]
    fn test_load_missing_users_file() {
        let dir = TempDir::new().unwrap();
        let result = ExportData::load(dir.path(), dir.path());
        assert!(matches!(result, Err(AppError::ReadFile { .. })));
    }

    #[test]
    fn test_load_missing_channels_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), USERS_FILE, serde_json::json!([]));
        let result = ExportData::load(dir.path(), dir.path());
        match result {
            Err(AppError::ReadFile { path, .. }) => assert!(path.ends_with(CHANNELS_FILE)),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_messages_follow_file_then_record_order() {
        let dir = create_test_export();
        write(
            dir.path(),
            "general/2024-01-02.json",
            serde_json::json!([
                {"type": "message", "user": "U01", "ts": "300.0", "text": "third"},
                {"type": "message", "user": "U01", "ts": "400.0", "text": "fourth"}
            ]),
        );
        write(
            dir.path(),
            "general/2023-12-31.json",
            serde_json::json!([
                {"type": "message", "user": "U02", "ts": "100.0", "text": "first"},
                {"type": "message", "user": "U01", "ts": "200.0", "text": "second"}
            ]),
        );
        write(
            dir.path(),
            "general/notes.json",
            serde_json::json!([{"ts": "999.0", "text": "ignored"}]),
        );
        write(
            dir.path(),
            "general/2024-01-01.json.bak",
            serde_json::json!([{"ts": "998.0", "text": "ignored"}]),
        );

        let mut export = load(&dir);
        let fetcher = MemoryFetcher::default();
        let count = export.parse_all_channels(&fetcher, None).unwrap();

        assert_eq!(count, 4);
        let texts: Vec<&str> = export
            .channels
            .get("C01")
            .unwrap()
            .messages()
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_missing_channel_directory_has_no_messages() {
        let dir = create_test_export();
        let mut export = load(&dir);

        let count = export
            .parse_all_channels(&MemoryFetcher::default(), None)
            .unwrap();

        assert_eq!(count, 0);
        assert!(export.channels.get("C02").unwrap().messages().is_empty());
    }

    #[test]
    fn test_channel_path_that_is_a_file_is_fatal() {
        let dir = create_test_export();
        fs::write(dir.path().join("general"), "not a directory").unwrap();

        let mut export = load(&dir);
        let result = export.parse_all_channels(&MemoryFetcher::default(), None);

        match result {
            Err(AppError::ListDir { path, .. }) => assert!(path.ends_with("general")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_users_file() {
        let dir = create_test_export();
        fs::write(dir.path().join(USERS_FILE), "[{\"id\": \"U01\",").unwrap();

        let result = ExportData::load(dir.path(), dir.path());

        match result {
            Err(AppError::JsonParse { path, .. }) => assert!(path.ends_with(USERS_FILE)),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_malformed_channels_file() {
        let dir = create_test_export();
        fs::write(dir.path().join(CHANNELS_FILE), "{\"id\": \"C01\"}").unwrap();

        let result = ExportData::load(dir.path(), dir.path());

        match result {
            Err(AppError::JsonParse { path, .. }) => assert!(path.ends_with(CHANNELS_FILE)),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_malformed_day_file_is_fatal() {
        let dir = create_test_export();
        fs::create_dir_all(dir.path().join("general")).unwrap();
        fs::write(dir.path().join("general/2024-01-01.json"), "[{\"ts\": ").unwrap();

        let mut export = load(&dir);
        let result = export.parse_all_channels(&MemoryFetcher::default(), None);

        assert!(matches!(result, Err(AppError::JsonParse { .. })));
    }

    #[test]
    fn test_progress_reported_per_file() {
        let dir = create_test_export();
        write(dir.path(), "general/2024-01-01.json", serde_json::json!([]));
        write(dir.path(), "general/2024-01-02.json", serde_json::json!([]));

        let mut export = load(&dir);
        let seen = RefCell::new(Vec::new());
        let callback = |current: usize, total: usize, name: &str| {
            seen.borrow_mut().push((current, total, name.to_string()));
        };
        export
            .parse_channel("C01", &MemoryFetcher::default(), Some(&callback))
            .unwrap();

        assert_eq!(
            seen.into_inner(),
            vec![
                (1, 2, "2024-01-01.json".to_string()),
                (2, 2, "2024-01-02.json".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_message_fields() {
        let dir = create_test_export();
        write(
            dir.path(),
            "general/2024-01-01.json",
            serde_json::json!([{
                "type": "message",
                "user": "U01",
                "ts": "1700000000.000100",
                "text": "hi <@U02> in <#C02> &amp; <!date^1700000000^{date}|Jan 1>",
                "attachments": [
                    {"title": "Docs", "text": "by <@U01>", "original_url": "https:\\/\\/docs.rs"},
                    {"text": "untitled"}
                ]
            }]),
        );

        let mut export = load(&dir);
        export
            .parse_all_channels(&MemoryFetcher::default(), None)
            .unwrap();
        let message = &export.channels.get("C01").unwrap().messages()[0];

        assert_eq!(message.kind, "message");
        assert_eq!(message.user_name, "Alice");
        assert_eq!(message.text, "hi @Bob Builder in #random & Jan 1");
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[0].title.as_deref(), Some("Docs"));
        assert_eq!(message.attachments[0].text, "by @Alice");
        assert_eq!(message.attachments[0].url.as_deref(), Some("https://docs.rs"));
        assert_eq!(message.attachments[1].title, None);
        assert!(!message.has_thread);
        assert!(!message.is_reply);
    }

    #[test]
    fn test_parse_message_missing_fields_are_defaults() {
        let dir = create_test_export();
        write(dir.path(), "general/2024-01-01.json", serde_json::json!([{}]));

        let mut export = load(&dir);
        export
            .parse_all_channels(&MemoryFetcher::default(), None)
            .unwrap();
        let message = &export.channels.get("C01").unwrap().messages()[0];

        assert_eq!(message, &Message::default());
    }

    #[test]
    fn test_bot_author_resolves_to_empty_name() {
        let dir = create_test_export();
        write(
            dir.path(),
            "general/2024-01-01.json",
            serde_json::json!([{"type": "message", "bot_id": "B01", "ts": "1.0", "text": "beep"}]),
        );

        let mut export = load(&dir);
        export
            .parse_all_channels(&MemoryFetcher::default(), None)
            .unwrap();
        let message = &export.channels.get("C01").unwrap().messages()[0];

        assert_eq!(message.user_id, "B01");
        assert_eq!(message.user_name, "");
    }

    #[test]
    fn test_thread_root_and_reply_flags() {
        let dir = create_test_export();
        write(
            dir.path(),
            "general/2024-01-01.json",
            serde_json::json!([
                {"user": "U01", "ts": "100.0", "thread_ts": "100.0", "text": "root",
                 "reply_count": 2, "replies": [{"user": "U02", "ts": "101.0"}, {"user": "U01", "ts": "102.0"}]},
                {"user": "U02", "ts": "101.0", "thread_ts": "100.0", "parent_user_id": "U01", "text": "r1"},
                {"user": "U01", "ts": "102.0", "thread_ts": "100.0", "parent_user_id": "U01", "text": "r2",
                 "reply_count": 0}
            ]),
        );

        let mut export = load(&dir);
        export
            .parse_all_channels(&MemoryFetcher::default(), None)
            .unwrap();
        let messages = export.channels.get("C01").unwrap().messages();

        assert!(messages[0].has_thread);
        assert!(!messages[0].is_reply);
        assert_eq!(messages[0].reply_count, 2);
        assert_eq!(messages[0].replies_ts, vec!["101.0", "102.0"]);
        for reply in &messages[1..] {
            assert!(reply.is_reply);
            assert!(!reply.has_thread);
            assert_eq!(reply.thread_ts, "100.0");
        }
        assert!(messages.iter().all(|m| !(m.has_thread && m.is_reply)));
    }

    #[test]
    fn test_hosted_files_are_fetched_once() {
        let dir = create_test_export();
        write(
            dir.path(),
            "general/2024-01-01.json",
            serde_json::json!([{
                "user": "U01", "ts": "1.0", "text": "see file",
                "files": [
                    {"id": "F01", "timestamp": 1700000000, "name": "plan.pdf", "mimetype": "application\\/pdf",
                     "filetype": "pdf", "url_private_download": "https:\\/\\/files.slack.com\\/F01\\/plan.pdf", "mode": "hosted"},
                    {"id": "F02", "name": "doc", "mode": "external", "url_private_download": "https://docs.google.com/x"},
                    {"id": "F03", "mode": "tombstone"}
                ]
            }]),
        );

        let mut export = load(&dir);
        let fetcher = MemoryFetcher::default();
        export.parse_all_channels(&fetcher, None).unwrap();

        let calls = fetcher.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "https://files.slack.com/F01/plan.pdf");
        assert_eq!(calls[0].1, dir.path().join("files").join("F01"));

        let message = &export.channels.get("C01").unwrap().messages()[0];
        assert_eq!(message.files.len(), 1);
        let file = &message.files[0];
        assert_eq!(file.name, "plan.pdf");
        assert_eq!(file.mimetype, "application/pdf");
        assert_eq!(file.timestamp, 1_700_000_000);
        assert!(file.path.exists());
    }

    #[test]
    fn test_download_failure_is_fatal() {
        let dir = create_test_export();
        write(
            dir.path(),
            "general/2024-01-01.json",
            serde_json::json!([{
                "user": "U01", "ts": "1.0",
                "files": [{"id": "F01", "mode": "hosted", "url_private_download": "https://files.slack.com/F01"}]
            }]),
        );

        let mut export = load(&dir);
        let fetcher = MemoryFetcher {
            fail: true,
            ..MemoryFetcher::default()
        };
        let result = export.parse_all_channels(&fetcher, None);

        assert!(matches!(result, Err(AppError::Download { .. })));
    }

    #[test]
    fn test_parse_unknown_channel() {
        let dir = create_test_export();
        let mut export = load(&dir);
        let result = export.parse_channel("C404", &MemoryFetcher::default(), None);
        assert!(matches!(result, Err(AppError::UnknownChannel(_))));
    }
}
