//! Replays one exported channel into a destination, message by message.
//!
//! Sends are strictly serial: a thread can only be opened once its root has
//! been posted, and replies must land in their stored order.

use std::thread;
use std::time::Duration;

use crate::discord::{ChatTarget, Destination, SentMessage};
use crate::error::Result;
use crate::model::{AttachmentFile, Channel, Message};
use crate::settings::{
    DEFAULT_DATE_FORMAT, DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_THREAD_NAME, DiscordSettings,
};

/// Appended to a segment whose attachments were rejected as too large.
pub const OVERSIZE_NOTE: &str = "\n*(attached file was too large to upload)*";

/// Pause between sends.
pub trait Throttle {
    fn pause(&self);
}

/// Sleeps the current thread for a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSleep(pub Duration);

impl Throttle for ThreadSleep {
    fn pause(&self) {
        if !self.0.is_zero() {
            thread::sleep(self.0);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Maximum characters per posted message
    pub max_message_length: usize,
    pub thread_name: String,
    pub date_format: String,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl From<&DiscordSettings> for ReplayOptions {
    fn from(settings: &DiscordSettings) -> Self {
        Self {
            max_message_length: settings.max_message_length,
            thread_name: settings.thread_name.clone(),
            date_format: settings.date_format.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    TopicSet,
    ReplayingRoots,
    Sending,
    ThreadOpen,
    ReplayingReplies,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub roots: usize,
    pub replies: usize,
    pub segments: usize,
    pub threads: usize,
    pub oversize_retries: usize,
}

impl std::fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} messages, {} replies in {} threads, {} segments sent, {} oversize retries",
            self.roots, self.replies, self.threads, self.segments, self.oversize_retries
        )
    }
}

pub struct ReplayEngine<'a, T: ChatTarget + ?Sized, P: Throttle + ?Sized> {
    target: &'a T,
    throttle: &'a P,
    options: ReplayOptions,
    state: ReplayState,
    summary: ReplaySummary,
}

impl<'a, T: ChatTarget + ?Sized, P: Throttle + ?Sized> ReplayEngine<'a, T, P> {
    pub fn new(target: &'a T, throttle: &'a P, options: ReplayOptions) -> Self {
        Self {
            target,
            throttle,
            options,
            state: ReplayState::Idle,
            summary: ReplaySummary::default(),
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Sets the destination's topic, then posts every root message and its
    /// thread in stored order. The first fatal error stops the replay, leaving
    /// whatever was already sent in place.
    pub fn replay(&mut self, channel: &Channel, destination: &Destination) -> Result<ReplaySummary> {
        self.summary = ReplaySummary::default();
        self.transition(ReplayState::Idle);

        match self.run(channel, destination) {
            Ok(()) => {
                self.transition(ReplayState::Done);
                Ok(self.summary.clone())
            }
            Err(e) => {
                self.transition(ReplayState::Aborted);
                Err(e)
            }
        }
    }

    fn run(&mut self, channel: &Channel, destination: &Destination) -> Result<()> {
        self.target.set_channel_topic(destination, &channel.topic)?;
        self.transition(ReplayState::TopicSet);
        self.transition(ReplayState::ReplayingRoots);

        for root in channel.messages().iter().filter(|m| !m.is_reply) {
            self.transition(ReplayState::Sending);
            let sent = self.send_message(root, destination, false)?;
            self.summary.roots += 1;
            self.throttle.pause();

            if root.has_thread {
                let thread = self.target.create_thread(&sent, &self.options.thread_name)?;
                self.summary.threads += 1;
                self.transition(ReplayState::ThreadOpen);
                self.transition(ReplayState::ReplayingReplies);

                for reply in channel.find_replies(root) {
                    self.send_message(reply, &thread, true)?;
                    self.summary.replies += 1;
                }
            }
            self.transition(ReplayState::ReplayingRoots);
        }
        Ok(())
    }

    /// Posts a message as one or more segments. Only the first segment carries
    /// the files; its handle is returned.
    fn send_message(
        &mut self,
        message: &Message,
        destination: &Destination,
        pause_each_segment: bool,
    ) -> Result<SentMessage> {
        let text = message.to_text(&self.options.date_format);
        let headroom = if message.files.is_empty() {
            0
        } else {
            OVERSIZE_NOTE.chars().count()
        };
        let mut segments =
            split_segments(&text, self.options.max_message_length, headroom).into_iter();

        let first = self.send_segment(destination, segments.next().unwrap_or_default(), &message.files)?;
        if pause_each_segment {
            self.throttle.pause();
        }

        for segment in segments {
            self.send_segment(destination, segment, &[])?;
            if pause_each_segment {
                self.throttle.pause();
            }
        }
        Ok(first)
    }

    fn send_segment(
        &mut self,
        destination: &Destination,
        text: &str,
        files: &[AttachmentFile],
    ) -> Result<SentMessage> {
        let sent = match self.target.send_message(destination, text, files) {
            Err(e) if e.is_payload_too_large() && !files.is_empty() => {
                log::warn!(
                    "Attachments rejected as too large ({}), resending without them",
                    files
                        .iter()
                        .map(|f| f.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                self.summary.oversize_retries += 1;
                self.target
                    .send_message(destination, &format!("{}{}", text, OVERSIZE_NOTE), &[])?
            }
            other => other?,
        };
        self.summary.segments += 1;
        Ok(sent)
    }

    fn transition(&mut self, next: ReplayState) {
        if self.state != next {
            log::debug!("Replay state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Splits `text` into consecutive segments of at most `max_len` characters.
/// Never returns an empty list; an empty text gives one empty segment.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<&str> {
    split_segments(text, max_len, 0)
}

/// Like [`chunk_text`], keeping `first_headroom` characters free in the first segment.
fn split_segments(text: &str, max_len: usize, first_headroom: usize) -> Vec<&str> {
    let max_len = max_len.max(1);
    let mut limit = max_len.saturating_sub(first_headroom).max(1);
    let mut segments = Vec::new();
    let mut rest = text;

    loop {
        match rest.char_indices().nth(limit) {
            Some((idx, _)) => {
                let (head, tail) = rest.split_at(idx);
                segments.push(head);
                rest = tail;
                limit = max_len;
            }
            None => {
                segments.push(rest);
                return segments;
            }
        }
    }
}
