//! The target side of a replay: the capabilities the engine needs and a
//! blocking Discord REST client providing them.

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::model::AttachmentFile;

/// Discord's JSON error code for "Request entity too large".
const ENTITY_TOO_LARGE_CODE: u64 = 40005;

/// A channel or thread that messages can be posted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination(pub String);

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a message that has been posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub destination: Destination,
    pub id: String,
}

/// What the replay engine needs from a chat platform.
///
/// `send_message` must report an attachment that exceeds the platform's size
/// limit as [`AppError::PayloadTooLarge`].
pub trait ChatTarget {
    fn set_channel_topic(&self, channel: &Destination, topic: &str) -> Result<()>;

    fn send_message(
        &self,
        destination: &Destination,
        text: &str,
        files: &[AttachmentFile],
    ) -> Result<SentMessage>;

    /// Opens a thread on `message` and returns where its replies go.
    fn create_thread(&self, message: &SentMessage, name: &str) -> Result<Destination>;
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordErrorBody {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after: Option<f64>,
}

pub struct DiscordClient {
    client: Client,
    api_base: String,
}

impl DiscordClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|e| AppError::Http(format!("invalid token header: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!(
                "DiscordBot (",
                env!("CARGO_PKG_NAME"),
                ", ",
                env!("CARGO_PKG_VERSION"),
                ")"
            )),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().map_err(|e| AppError::Http(e.to_string()))?;
        let response = check_response(response)?;
        response.json().map_err(|e| AppError::Http(e.to_string()))
    }
}

impl ChatTarget for DiscordClient {
    fn set_channel_topic(&self, channel: &Destination, topic: &str) -> Result<()> {
        let request = self
            .client
            .patch(self.url(&format!("/channels/{}", channel)))
            .json(&serde_json::json!({ "topic": topic }));
        let _: DiscordChannel = self.execute(request)?;
        Ok(())
    }

    fn send_message(
        &self,
        destination: &Destination,
        text: &str,
        files: &[AttachmentFile],
    ) -> Result<SentMessage> {
        let url = self.url(&format!("/channels/{}/messages", destination));
        let payload = message_payload(text);

        let request = if files.is_empty() {
            self.client.post(url).json(&payload)
        } else {
            let mut form = Form::new().text("payload_json", payload.to_string());
            for (idx, file) in files.iter().enumerate() {
                let part = Part::file(&file.path)
                    .map_err(|e| AppError::ReadFile {
                        path: file.path.display().to_string(),
                        source: e,
                    })?
                    .file_name(file.name.clone());
                form = form.part(format!("files[{}]", idx), part);
            }
            self.client.post(url).multipart(form)
        };

        let message: DiscordMessage = self.execute(request)?;
        log::debug!("Sent message {} to {}", message.id, destination);
        Ok(SentMessage {
            destination: destination.clone(),
            id: message.id,
        })
    }

    fn create_thread(&self, message: &SentMessage, name: &str) -> Result<Destination> {
        let request = self
            .client
            .post(self.url(&format!(
                "/channels/{}/messages/{}/threads",
                message.destination, message.id
            )))
            .json(&serde_json::json!({ "name": name }));
        let thread: DiscordChannel = self.execute(request)?;
        log::debug!("Opened thread {} on message {}", thread.id, message.id);
        Ok(Destination(thread.id))
    }
}

/// Message body; replayed text must never ping anyone.
fn message_payload(text: &str) -> serde_json::Value {
    serde_json::json!({
        "content": text,
        "allowed_mentions": { "parse": [] },
    })
}

fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(classify_error(status.as_u16(), &body))
}

/// Maps a failed Discord response onto the error taxonomy.
fn classify_error(status: u16, body: &str) -> AppError {
    let parsed: DiscordErrorBody = serde_json::from_str(body).unwrap_or_default();

    if status == 413 || parsed.code == Some(ENTITY_TOO_LARGE_CODE) {
        return AppError::PayloadTooLarge;
    }

    if status == 429 {
        let retry_after_secs = parsed.retry_after.unwrap_or_default().ceil().max(0.0) as u64;
        return AppError::DiscordRateLimit { retry_after_secs };
    }

    let message = parsed
        .message
        .unwrap_or_else(|| body.trim().to_string());
    AppError::DiscordApi { status, message }
}
