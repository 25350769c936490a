//! Shader text retrieval for the `set_remote_*` operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::{EngineError, Result};

/// Retrieves shader source text by URL.
pub trait ShaderFetcher: Send {
    fn fetch(&self, url: &str) -> Result<String>;

    /// Fetches every URL in order, stopping at the first failure.
    fn fetch_all(&self, urls: &[String]) -> Result<Vec<String>> {
        urls.iter().map(|url| self.fetch(url)).collect()
    }
}

impl<F: ShaderFetcher + Sync + ?Sized> ShaderFetcher for Arc<F> {
    fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url)
    }
}

/// Blocking HTTP(S) fetcher.
///
/// Runs on the worker thread; a slow server stalls that worker's frame loop
/// for at most `timeout`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("nabu/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ShaderFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let fail =
            |reason: String| EngineError::RemoteShaderFetchFailed(format!("{url}: {reason}"));

        let parsed = reqwest::Url::parse(url).map_err(|e| fail(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(fail(format!("unsupported scheme {}", parsed.scheme())));
        }

        let client = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .build()
            .map_err(|e| fail(e.to_string()))?;

        let response = client.get(parsed).send().map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("status {status}")));
        }

        let text = response.text().map_err(|e| fail(e.to_string()))?;
        log::debug!("fetched shader {url} ({} bytes)", text.len());
        Ok(text)
    }
}

/// Serves shader text from memory; unknown URLs fail like a 404.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    sources: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(url.into(), source.into());
        self
    }
}

impl ShaderFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        self.sources
            .get(url)
            .cloned()
            .ok_or_else(|| {
                EngineError::RemoteShaderFetchFailed(format!("{url}: status 404 Not Found"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_fetch_all_stops_at_first_miss() {
        let fetcher = StaticFetcher::new().with("mem://a", "a").with("mem://c", "c");
        let urls = ["mem://a", "mem://b", "mem://c"].map(String::from);

        let err = fetcher.fetch_all(&urls).unwrap_err();
        assert!(
            matches!(err, EngineError::RemoteShaderFetchFailed(ref m) if m.contains("mem://b"))
        );
        assert_eq!(fetcher.fetch_all(&urls[..1]).unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn http_rejects_non_http_schemes() {
        let err = HttpFetcher::default().fetch("file:///etc/passwd").unwrap_err();
        assert!(matches!(err, EngineError::RemoteShaderFetchFailed(ref m) if m.contains("scheme")));
    }
}
