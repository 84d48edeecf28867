use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use piramide_types::api::{
    ErrorBody, ReportRequest, StatusResponse, SubmitRequest, VoteRequest, VoteResponse,
};
use piramide_types::models::{
    ANONYMOUS_ALIAS, ClassTag, ItemId, Post, PostId, Reply, ServerStatus, normalize_text,
};

use crate::error::{ClientError, Result};
use crate::replies::{normalize_replies, normalize_reply};
use crate::resolver::Endpoint;

/// Message shown when a post or reply is submitted without text.
pub const EMPTY_TEXT_MESSAGE: &str = "Digite algo.";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// How a response's failure modes should be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Read,
    Write,
    /// A write some deployments do not implement at all.
    OptionalWrite,
}

/// Typed access to the REST surface behind one resolved endpoint.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: Client,
    endpoint: Endpoint,
}

impl FeedClient {
    pub fn new(endpoint: Endpoint, config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("http client init failed: {}", e)))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn list_posts(&self) -> Result<Vec<Post>> {
        let payload = self.get(self.endpoint.api_url("/posts")).await?;
        match payload {
            Value::Array(_) => serde_json::from_value(payload)
                .map_err(|e| ClientError::Format(format!("malformed post list: {}", e))),
            other => Err(ClientError::Format(match error_reason(&other) {
                Some(reason) => format!("server reported: {}", reason),
                None => "post list is not an array".to_string(),
            })),
        }
    }

    /// Tolerant by contract: unknown envelopes give an empty list.
    pub async fn list_replies(&self, post_id: &PostId) -> Result<Vec<Reply>> {
        let payload = self.get(self.endpoint.post_url(post_id, "replies")).await?;
        Ok(normalize_replies(&payload, post_id))
    }

    pub async fn create_post(&self, text: &str, class_tag: ClassTag) -> Result<Post> {
        let body = submit_body(text, class_tag)?;
        let payload = self.post(self.endpoint.api_url("/posts"), &body, Call::Write).await?;

        match serde_json::from_value::<Post>(payload.clone()) {
            Ok(post) => Ok(post),
            Err(e) => {
                debug!("Create-post response is not a full post ({}), echoing request", e);
                Ok(echo_post(&payload, &body))
            }
        }
    }

    pub async fn create_reply(
        &self,
        post_id: &PostId,
        text: &str,
        class_tag: ClassTag,
    ) -> Result<Reply> {
        let body = submit_body(text, class_tag)?;
        let payload = self
            .post(self.endpoint.post_url(post_id, "replies"), &body, Call::Write)
            .await?;

        let mut reply = normalize_reply(&payload, post_id).unwrap_or_else(|| Reply {
            id: None,
            post_id: post_id.clone(),
            alias: ANONYMOUS_ALIAS.to_string(),
            text: String::new(),
            class_tag: None,
            created_at: None,
        });
        if reply.text.is_empty() {
            reply.text = body.text;
        }
        reply.class_tag.get_or_insert(class_tag);
        Ok(reply)
    }

    /// Not idempotent: every call adds `delta` server-side.
    pub async fn vote(&self, post_id: &PostId, delta: i64, fingerprint: &str) -> Result<VoteResponse> {
        let body = VoteRequest {
            delta,
            fingerprint: fingerprint.to_string(),
        };
        let payload = self
            .post(self.endpoint.post_url(post_id, "vote"), &body, Call::OptionalWrite)
            .await?;
        Ok(serde_json::from_value(payload).unwrap_or_default())
    }

    pub async fn report(
        &self,
        post_id: &PostId,
        fingerprint: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        let body = ReportRequest {
            fingerprint: fingerprint.to_string(),
            reason: reason.map(str::to_string),
        };
        self.post(self.endpoint.post_url(post_id, "report"), &body, Call::OptionalWrite)
            .await?;
        Ok(())
    }

    /// Health probe for the online/offline indicator. Never fails.
    pub async fn status(&self) -> ServerStatus {
        let resp = match self.http.get(self.endpoint.api_url("/status")).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Status probe failed: {}", e);
                return ServerStatus::Offline;
            }
        };

        if !resp.status().is_success() {
            return ServerStatus::Offline;
        }

        let version = resp
            .json::<StatusResponse>()
            .await
            .ok()
            .and_then(StatusResponse::into_version);
        ServerStatus::Online { version }
    }

    async fn get(&self, url: String) -> Result<Value> {
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(ClientError::from_transport)?;
        interpret(status, &body, Call::Read)
    }

    async fn post<B: Serialize>(&self, url: String, body: &B, call: Call) -> Result<Value> {
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(ClientError::from_transport)?;
        interpret(status, &text, call)
    }
}

fn submit_body(text: &str, class_tag: ClassTag) -> Result<SubmitRequest> {
    let text = normalize_text(text)
        .ok_or_else(|| ClientError::Validation(EMPTY_TEXT_MESSAGE.to_string()))?;
    Ok(SubmitRequest { text, class_tag })
}

fn error_reason(payload: &Value) -> Option<String> {
    if !payload.is_object() {
        return None;
    }
    serde_json::from_value::<ErrorBody>(payload.clone())
        .ok()
        .and_then(|b| b.reason().map(str::to_string))
}

/// Maps status + body onto the error taxonomy.
fn interpret(status: StatusCode, body: &str, call: Call) -> Result<Value> {
    let parsed: Option<Value> = if body.trim().is_empty() {
        Some(Value::Object(Default::default()))
    } else {
        serde_json::from_str(body).ok()
    };

    // A write rejected with a message is surfaced as-is, whatever the status
    if call != Call::Read {
        if let Some(reason) = parsed.as_ref().and_then(error_reason) {
            return Err(ClientError::Validation(reason));
        }
    }

    if status.is_success() {
        return parsed.ok_or_else(|| {
            let head: String = body.chars().take(200).collect();
            ClientError::Format(format!("invalid JSON: {}", head))
        });
    }

    if call == Call::OptionalWrite
        && matches!(status, StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED)
    {
        return Err(ClientError::Unsupported(format!("HTTP {}", status)));
    }

    if status.is_server_error() || call == Call::Read {
        warn!("Request failed with HTTP {}", status);
        return Err(ClientError::Network(format!("HTTP {}", status)));
    }

    Err(ClientError::Validation(format!("HTTP {}", status)))
}

/// Some deployments answer a create with `{ok, id}` rather than the post.
fn echo_post(payload: &Value, body: &SubmitRequest) -> Post {
    let id = ["id", "post_id"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(ItemId::from_value))
        .unwrap_or_else(|| ItemId::new(""));
    let alias = payload
        .get("alias")
        .and_then(Value::as_str)
        .unwrap_or(ANONYMOUS_ALIAS)
        .to_string();

    Post {
        id,
        alias,
        text: body.text.clone(),
        class_tag: body.class_tag,
        created_at: Some(chrono::Utc::now()),
        replies_count: 0,
        upvotes: 0,
        downvotes: None,
        avatar: None,
        class_color: None,
    }
}
