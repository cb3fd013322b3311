//! `url_title`: announces the `<title>` of pages linked in channel messages.
//!
//! Fetches run on the tokio runtime captured at construction; the session
//! loop never waits on them. Settings (all optional):
//! `{ "max_urls": 3, "timeout_secs": 5, "max_title_len": 200 }`.

use regex::Regex;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::plugins::{Plugin, PluginSender};
use crate::storage::ModuleDescriptor;

const DEFAULT_MAX_URLS: usize = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_TITLE_LEN: usize = 200;
/// Bodies larger than this are not scanned.
const MAX_BODY_BYTES: usize = 512 * 1024;

pub struct UrlTitle {
    sender: PluginSender,
    runtime: Handle,
    client: reqwest::Client,
    url_pattern: Regex,
    title_pattern: Regex,
    max_urls: usize,
    max_title_len: usize,
}

fn setting_u64(descriptor: &ModuleDescriptor, key: &str, default: u64) -> u64 {
    descriptor
        .settings
        .get(key)
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(default)
}

pub fn construct(descriptor: &ModuleDescriptor, sender: PluginSender) -> Result<Box<dyn Plugin>, PluginError> {
    let fail = |reason: String| PluginError::Construction {
        module: descriptor.name.clone(),
        reason,
    };

    let runtime = Handle::try_current().map_err(|e| fail(e.to_string()))?;
    let timeout = Duration::from_secs(setting_u64(descriptor, "timeout_secs", DEFAULT_TIMEOUT_SECS));
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("slirc-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| fail(e.to_string()))?;

    Ok(Box::new(UrlTitle {
        sender,
        runtime,
        client,
        url_pattern: Regex::new(r"https?://\S+").map_err(|e| fail(e.to_string()))?,
        title_pattern: title_pattern().map_err(|e| fail(e.to_string()))?,
        max_urls: setting_u64(descriptor, "max_urls", DEFAULT_MAX_URLS as u64) as usize,
        max_title_len: setting_u64(descriptor, "max_title_len", DEFAULT_MAX_TITLE_LEN as u64) as usize,
    }))
}

fn title_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Page title with whitespace collapsed and entities decoded, cut to
/// `max_len` characters.
pub fn extract_title(pattern: &Regex, html: &str, max_len: usize) -> Option<String> {
    let raw = pattern.captures(html)?.get(1)?.as_str();
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = decode_entities(&collapsed);
    if title.is_empty() {
        return None;
    }
    if title.chars().count() > max_len {
        let cut: String = title.chars().take(max_len).collect();
        return Some(format!("{cut}..."));
    }
    Some(title)
}

async fn fetch_title(
    client: reqwest::Client,
    pattern: Regex,
    url: String,
    max_len: usize,
) -> Result<Option<String>, reqwest::Error> {
    let response = client.get(&url).send().await?.error_for_status()?;
    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|v| v.contains("html"));
    if !is_html || response.content_length().is_some_and(|len| len as usize > MAX_BODY_BYTES) {
        return Ok(None);
    }
    let body = read_capped(response, MAX_BODY_BYTES).await?;
    Ok(extract_title(&pattern, &String::from_utf8_lossy(&body), max_len))
}

/// Read at most `limit` bytes of the body, whatever the server announced.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while body.len() < limit {
        let Some(chunk) = response.chunk().await? else {
            break;
        };
        let take = chunk.len().min(limit - body.len());
        body.extend_from_slice(&chunk[..take]);
    }
    Ok(body)
}

impl Plugin for UrlTitle {
    fn handle_message(&mut self, channel: &str, _user: &str, text: &str) -> Result<(), PluginError> {
        for found in self.url_pattern.find_iter(text).take(self.max_urls) {
            let url = found
                .as_str()
                .trim_end_matches(['.', ',', ')', '>', '!', '?'])
                .to_string();
            let client = self.client.clone();
            let pattern = self.title_pattern.clone();
            let sender = self.sender.clone();
            let channel = channel.to_string();
            let max_len = self.max_title_len;

            self.runtime.spawn(async move {
                match fetch_title(client, pattern, url.clone(), max_len).await {
                    Ok(Some(title)) => {
                        if let Err(e) = sender.send(&channel, &format!("Title: {title}")) {
                            debug!(error = %e, "Title arrived after session ended");
                        }
                    }
                    Ok(None) => debug!(url = %url, "No title found"),
                    Err(e) => warn!(url = %url, error = %e, "Failed to fetch URL title"),
                }
            });
        }
        Ok(())
    }
}
