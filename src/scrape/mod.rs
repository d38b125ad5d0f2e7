
use std::ffi::OsStr;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::{PitwallError, Result};

/// Element names whose text content is never part of the readable page.
const EXCLUDED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Fetches a URL and returns its fully rendered plain text.
///
/// Ingestion depends on this trait rather than a concrete browser so it can
/// run against a stub in tests.
#[async_trait]
pub trait FetchPage: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// Configuration for browser-based page rendering
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for page navigation in seconds
    pub navigation_timeout_seconds: u64,
    /// Time to let client-side scripts settle after navigation
    pub settle_delay_ms: u64,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Additional Chrome arguments
    pub chrome_args: Vec<String>,
}

impl Default for FetcherConfig {
    #[inline]
    fn default() -> Self {
        Self {
            navigation_timeout_seconds: 30,
            settle_delay_ms: 2000,
            window_width: 1280,
            window_height: 720,
            chrome_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--disable-extensions".to_string(),
                "--disable-plugins".to_string(),
                "--disable-images".to_string(),
            ],
        }
    }
}

/// Page fetcher backed by a headless Chrome instance.
///
/// One browser is launched at construction and reused for every fetch; each
/// fetch opens a fresh tab.
pub struct BrowserFetcher {
    browser: Browser,
    config: FetcherConfig,
}

impl BrowserFetcher {
    #[inline]
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let args: Vec<&OsStr> = config.chrome_args.iter().map(OsStr::new).collect();
        let launch_options = LaunchOptions {
            headless: true,
            window_size: Some((config.window_width, config.window_height)),
            args,
            ..Default::default()
        };

        let browser = Browser::new(launch_options)
            .map_err(|e| PitwallError::Scrape(format!("Failed to launch browser: {}", e)))?;

        Ok(Self { browser, config })
    }

    fn navigate(&self, url: &Url) -> Result<std::sync::Arc<headless_chrome::Tab>> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| PitwallError::Scrape(format!("Failed to open tab: {}", e)))?;

        tab.set_default_timeout(Duration::from_secs(self.config.navigation_timeout_seconds));

        tab.navigate_to(url.as_str())
            .map_err(|e| PitwallError::Scrape(format!("Failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated().map_err(|e| {
            PitwallError::Scrape(format!("Navigation to {} did not complete: {}", url, e))
        })?;

        Ok(tab)
    }
}

#[async_trait]
impl FetchPage for BrowserFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        debug!("Fetching rendered page: {}", url);

        let tab = self.navigate(url)?;

        // Let client-side scripts finish rendering before extraction.
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let html = tab
            .get_content()
            .map_err(|e| PitwallError::Scrape(format!("Failed to read content of {}: {}", url, e)));

        if let Err(e) = tab.close(true) {
            warn!("Failed to close tab for {}: {}", url, e);
        }

        let text = extract_text(&html?);
        debug!("Extracted {} chars of text from {}", text.len(), url);
        Ok(text)
    }
}

/// Strip all markup from an HTML document, returning readable text with
/// collapsed whitespace. Script, style, and other non-content elements are
/// skipped entirely.
#[inline]
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("valid selector");

    let Some(body) = document.select(&body_selector).next() else {
        return String::new();
    };

    let mut fragments = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let excluded = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| EXCLUDED_ELEMENTS.contains(&el.name()))
        });
        if excluded {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            fragments.push(trimmed.to_string());
        }
    }

    let joined = fragments.join(" ");
    collapse_whitespace(&joined)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
