use std::fs;
use std::path::Path;

use reqwest::blocking::Client;

use crate::error::{AppError, Result};

/// Source of attachment payloads.
pub trait FileFetcher {
    /// Retrieves `url` and writes it to `destination`, replacing any existing file.
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Downloads attachments over HTTP.
pub struct HttpFetcher {
    client: Client,
    token: Option<String>,
}

impl HttpFetcher {
    /// `token` is sent as a bearer token; export URLs that already embed one need none.
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;
        Ok(Self {
            client,
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

impl FileFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| AppError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(AppError::Download {
                url: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().map_err(|e| AppError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        fs::write(destination, &bytes).map_err(|e| AppError::WriteFile {
            path: destination.display().to_string(),
            source: e,
        })?;

        log::debug!("Downloaded {} ({} bytes)", destination.display(), bytes.len());
        Ok(())
    }
}
