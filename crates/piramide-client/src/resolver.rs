use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use piramide_types::models::{EndpointDescriptor, PostId};

use crate::error::{ClientError, Result};

pub const DEFAULT_DESCRIPTOR_URL: &str =
    "https://raw.githubusercontent.com/GuhCansado/NOSENSE/main/server_status.json";

pub const DEFAULT_API_PREFIX: &str = "/api";

/// A resolved API location. Never checked for reachability here; the first
/// real request finds out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    api_prefix: String,
    version: Option<String>,
}

impl Endpoint {
    pub fn new(base_url: &str, api_prefix: &str) -> Result<Self> {
        let parsed = Url::parse(base_url.trim()).map_err(|e| {
            ClientError::DescriptorUnreachable(format!("invalid base url '{}': {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::DescriptorUnreachable(format!(
                "unsupported scheme in base url '{}'",
                base_url
            )));
        }

        let prefix = api_prefix.trim().trim_end_matches('/');
        let api_prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_prefix,
            version: None,
        })
    }

    pub fn from_descriptor(descriptor: &EndpointDescriptor, api_prefix: &str) -> Result<Self> {
        let mut endpoint = Self::new(&descriptor.base_url, api_prefix)?;
        endpoint.version = descriptor.version.clone();
        Ok(endpoint)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// `{base}{prefix}{path}`; `path` must start with '/'.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    /// `{base}{prefix}/posts/{id}/{action}`, the id escaped as a single segment.
    pub fn post_url(&self, post_id: &PostId, action: &str) -> String {
        let posts = self.api_url("/posts");
        let Ok(mut url) = Url::parse(&posts) else {
            return format!("{}/{}/{}", posts, post_id, action);
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(post_id.as_str()).push(action);
        }
        url.into()
    }

    /// Push channel location, always at the root of the deployment.
    pub fn ws_url(&self) -> String {
        format!(
            "{}/ws",
            self.base_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        )
    }
}

/// How long to keep trying the descriptor before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Single attempt; the caller shows the error.
    Once,
    /// Poll until it succeeds.
    Every(Duration),
    /// At most `attempts` tries, `delay` apart.
    Bounded { attempts: u32, delay: Duration },
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub descriptor_url: String,
    pub api_prefix: String,
    pub request_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            descriptor_url: DEFAULT_DESCRIPTOR_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Discovers the live API base URL from the published descriptor.
#[derive(Debug, Clone)]
pub struct Resolver {
    http: Client,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("http client init failed: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// One attempt. Every failure, network or parse, is `DescriptorUnreachable`.
    pub async fn resolve(&self) -> Result<Endpoint> {
        let url = cache_busted(
            &self.config.descriptor_url,
            chrono::Utc::now().timestamp_millis(),
        )?;

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::DescriptorUnreachable(format!("fetch failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ClientError::DescriptorUnreachable(format!(
                "descriptor returned {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::DescriptorUnreachable(format!("read failed: {}", e)))?;

        let descriptor: EndpointDescriptor = serde_json::from_str(&body).map_err(|e| {
            ClientError::DescriptorUnreachable(format!("malformed descriptor: {}", e))
        })?;

        if !descriptor.advertises_online() {
            warn!(
                "Descriptor advertises status {:?}; using it anyway",
                descriptor.status
            );
        }

        let endpoint = Endpoint::from_descriptor(&descriptor, &self.config.api_prefix)?;
        info!(
            "API resolved: {} (version {})",
            endpoint.base_url(),
            endpoint.version().unwrap_or("?")
        );
        Ok(endpoint)
    }

    pub async fn resolve_with_retry(&self, policy: RetryPolicy) -> Result<Endpoint> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.resolve().await {
                Ok(endpoint) => return Ok(endpoint),
                Err(e) => e,
            };

            let delay = match policy {
                RetryPolicy::Once => return Err(err),
                RetryPolicy::Every(delay) => delay,
                RetryPolicy::Bounded { attempts, delay } => {
                    if attempt >= attempts {
                        return Err(err);
                    }
                    delay
                }
            };

            warn!(
                "Resolve attempt {} failed: {} -- retrying in {:?}",
                attempt, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Appends `t=<millis>` so intermediaries never serve a stale descriptor.
pub fn cache_busted(descriptor_url: &str, now_millis: i64) -> Result<Url> {
    let mut url = Url::parse(descriptor_url).map_err(|e| {
        ClientError::DescriptorUnreachable(format!(
            "invalid descriptor url '{}': {}",
            descriptor_url, e
        ))
    })?;
    url.query_pairs_mut()
        .append_pair("t", &now_millis.to_string());
    Ok(url)
}
