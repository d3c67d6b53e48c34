// src/fetch/mod.rs
use anyhow::Context;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{ErrorKind, Result};
use crate::source::{Period, SourceDescriptor};

pub mod locator;
pub mod politeness;

pub use locator::LocatorResolver;
pub use politeness::PolitenessGate;

pub const DEFAULT_USER_AGENT: &str = concat!("gridscraper/", env!("CARGO_PKG_VERSION"));

/// Raw bytes of one successful download. Lives for one pipeline iteration.
#[derive(Debug)]
pub struct FetchResult {
    pub source_id: String,
    pub period: Period,
    pub raw_bytes: Vec<u8>,
    pub resolved_locator: String,
}

/// Walks the resolver's candidates until one yields a non-empty 2xx body.
pub struct ContentFetcher {
    client: Client,
    resolver: LocatorResolver,
    gate: PolitenessGate,
}

impl ContentFetcher {
    pub fn new(
        http: &HttpConfig,
        resolver: LocatorResolver,
        gate: PolitenessGate,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(http.user_agent.as_str())
            .timeout(Duration::from_secs_f64(http.timeout_secs))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            resolver,
            gate,
        })
    }

    pub fn resolver(&self) -> &LocatorResolver {
        &self.resolver
    }

    #[tracing::instrument(level = "info", skip_all, fields(source = %source.id, period = %period))]
    pub async fn fetch(&mut self, source: &SourceDescriptor, period: Period) -> Result<FetchResult> {
        let candidates = self.resolver.resolve(source, period)?;
        let total = candidates.len();
        let mut last_failure = String::from("no candidates");

        for (i, locator) in candidates.into_iter().enumerate() {
            match self.try_one(&locator).await {
                Ok(bytes) => {
                    info!(
                        locator = %locator,
                        bytes = bytes.len(),
                        attempt = i + 1,
                        "fetched"
                    );
                    return Ok(FetchResult {
                        source_id: source.id.clone(),
                        period,
                        raw_bytes: bytes,
                        resolved_locator: locator,
                    });
                }
                Err(reason) => {
                    warn!(locator = %locator, attempt = i + 1, of = total, %reason, "candidate failed");
                    last_failure = format!("{locator}: {reason}");
                }
            }
        }

        Err(ErrorKind::Fetch(format!(
            "all {total} candidate(s) failed; last: {last_failure}"
        )))
    }

    async fn try_one(&mut self, locator: &str) -> std::result::Result<Vec<u8>, String> {
        let url = Url::parse(locator).map_err(|e| format!("invalid URL: {e}"))?;
        let host = url.host_str().unwrap_or_default().to_string();
        self.gate.wait(&host).await;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request error: {e}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| format!("reading body: {e}"))?;
        if body.is_empty() {
            return Err("empty body".to_string());
        }
        Ok(body.to_vec())
    }
}
