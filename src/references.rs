//! Turns raw Slack markup into readable text.
//!
//! Mentions are replaced before HTML entities are decoded: the export escapes
//! `<`, `>` and `&` in user-typed text, so decoding first would let typed text
//! masquerade as a mention token.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::model::{Channels, Users};

#[allow(clippy::expect_used)] // literal pattern
static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([A-Z0-9]+)(?:\|[^>]*)?>").expect("valid user mention regex"));

#[allow(clippy::expect_used)] // literal pattern
static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#([A-Z0-9]+)(?:\|[^>]*)?>").expect("valid channel mention regex"));

#[allow(clippy::expect_used)] // literal pattern
static DATE_MACRO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!date\^\d+[^|>]*\|([^>]+)>").expect("valid date macro regex"));

/// Substitutions applied to message bodies, in order.
const TEXT_RULES: &[(&str, &str)] = &[(r"\\", "/")];

#[allow(clippy::expect_used)] // literal patterns
static COMPILED_TEXT_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    TEXT_RULES
        .iter()
        .map(|(pattern, replacement)| {
            (Regex::new(pattern).expect("valid text rule regex"), *replacement)
        })
        .collect()
});

/// Resolves mention tokens against the loaded registries.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    users: &'a Users,
    channels: &'a Channels,
}

impl<'a> Resolver<'a> {
    pub fn new(users: &'a Users, channels: &'a Channels) -> Self {
        Self { users, channels }
    }

    /// Replaces `<@U…>` with `@display name` and `<#C…>` with `#channel`.
    /// Ids missing from the registries are left untouched.
    pub fn fill_references(&self, text: &str) -> String {
        let text = USER_MENTION.replace_all(text, |caps: &Captures| {
            let id = caps.get(1).map_or("", |m| m.as_str());
            match self.users.get(id) {
                Some(user) => format!("@{}", user.display_name),
                None => caps.get(0).map_or("", |m| m.as_str()).to_string(),
            }
        });

        CHANNEL_MENTION
            .replace_all(&text, |caps: &Captures| {
                let id = caps.get(1).map_or("", |m| m.as_str());
                match self.channels.name_by_id(id) {
                    Some(name) => format!("#{}", name),
                    None => caps.get(0).map_or("", |m| m.as_str()).to_string(),
                }
            })
            .into_owned()
    }

    /// Full pipeline for a message body.
    pub fn resolve_body(&self, raw: &str) -> String {
        let text = simplify_date_macros(raw);
        let text = self.fill_references(&text);
        let text = unescape_html(&text);
        apply_text_rules(&text)
    }

    /// Pipeline for link-preview text; backslashes are kept as-is.
    pub fn resolve_attachment_text(&self, raw: &str) -> String {
        let text = simplify_date_macros(raw);
        let text = self.fill_references(&text);
        unescape_html(&text)
    }
}

/// `<!date^1700000000^{date}|Jan 1>` becomes `Jan 1`.
pub fn simplify_date_macros(text: &str) -> String {
    DATE_MACRO.replace_all(text, "$1").into_owned()
}

pub fn unescape_html(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Applies every rule of [`TEXT_RULES`] in sequence.
pub fn apply_text_rules(text: &str) -> String {
    COMPILED_TEXT_RULES
        .iter()
        .fold(text.to_string(), |acc, (regex, replacement)| {
            regex.replace_all(&acc, *replacement).into_owned()
        })
}

/// Drops the backslash of escaped `\/` separators in URLs.
pub fn url_unescape(url: &str) -> String {
    url.replace("\\/", "/")
}
