use serde::{Deserialize, Serialize};

use crate::models::ClassTag;

// -- Writes --

/// Body of `POST /posts` and `POST /posts/{id}/replies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "texto")]
    pub text: String,
    #[serde(rename = "classe")]
    pub class_tag: ClassTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub delta: i64,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// -- Responses --

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VoteResponse {
    #[serde(default)]
    pub upvotes: Option<i64>,
    #[serde(default)]
    pub downvotes: Option<i64>,
}

/// Application-level rejection. Older deployments use `message` instead of `error`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn reason(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub version_api: Option<String>,
}

impl StatusResponse {
    pub fn into_version(self) -> Option<String> {
        self.version.or(self.version_api)
    }
}
