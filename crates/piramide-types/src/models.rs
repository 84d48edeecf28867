use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Alias shown when the server did not assign one.
pub const ANONYMOUS_ALIAS: &str = "Anônimo";

// -- Class tag --

/// Position in the pyramid a post or reply is filed under.
/// A classification label only, never a permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassTag {
    Base,
    Meio,
    Topo,
}

impl ClassTag {
    pub const ALL: [ClassTag; 3] = [ClassTag::Base, ClassTag::Meio, ClassTag::Topo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Meio => "meio",
            Self::Topo => "topo",
        }
    }

    /// Color used when the server omits `cor_classe`.
    pub fn default_color(&self) -> &'static str {
        match self {
            Self::Base => "#8d6e63",
            Self::Meio => "#42a5f5",
            Self::Topo => "#ffca28",
        }
    }
}

impl fmt::Display for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown class tag '{0}' (expected base, meio or topo)")]
pub struct UnknownClassTag(pub String);

impl FromStr for ClassTag {
    type Err = UnknownClassTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "meio" => Ok(Self::Meio),
            "topo" => Ok(Self::Topo),
            _ => Err(UnknownClassTag(s.to_string())),
        }
    }
}

// -- Identifiers --

/// Opaque server identifier. The backend sends either strings or numbers;
/// both are kept as their textual form so ids round-trip into URLs unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

pub type PostId = ItemId;
pub type ReplyId = ItemId;

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ItemId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

impl ItemId {
    /// Lenient extraction from an arbitrary JSON value (string or number).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

// -- Posts and replies --

/// Server-derived avatar: an emoji plus an optional background color.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    #[serde(default)]
    pub emoji: String,
    #[serde(default, rename = "cor", alias = "color")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(default = "anonymous_alias")]
    pub alias: String,
    #[serde(rename = "texto")]
    pub text: String,
    #[serde(rename = "classe")]
    pub class_tag: ClassTag,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replies_count: u32,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: Option<i64>,
    #[serde(default)]
    pub avatar: Option<Avatar>,
    #[serde(default, rename = "cor_classe")]
    pub class_color: Option<String>,
}

impl Post {
    /// Color to render the avatar with, falling back to the class default.
    pub fn display_color(&self) -> &str {
        self.avatar
            .as_ref()
            .and_then(|a| a.color.as_deref())
            .or(self.class_color.as_deref())
            .unwrap_or_else(|| self.class_tag.default_color())
    }
}

/// A reply always belongs to exactly one post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub id: Option<ReplyId>,
    pub post_id: PostId,
    pub alias: String,
    pub text: String,
    pub class_tag: Option<ClassTag>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Trims user input; `None` if nothing is left. Posts and replies with
/// empty text never leave the client.
pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn anonymous_alias() -> String {
    ANONYMOUS_ALIAS.to_string()
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

/// Accepts RFC 3339, SQLite's "YYYY-MM-DD HH:MM:SS" (naive UTC), naive ISO
/// with optional fraction, and unix seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => s
            .parse::<DateTime<Utc>>()
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .map(|ndt| ndt.and_utc())
                    .ok()
            })
            .or_else(|| {
                warn!("Unparseable timestamp '{}'", s);
                None
            }),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past year ~5138 in seconds is really milliseconds
            if raw.abs() > 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

// -- Endpoint descriptor --

/// Record published at a well-known location pointing at the live API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    #[serde(rename = "url_api_base")]
    pub base_url: String,
    #[serde(default, rename = "status_servidor")]
    pub status: Option<String>,
    #[serde(default, rename = "version_api")]
    pub version: Option<String>,
}

impl EndpointDescriptor {
    /// Absent status counts as online; the descriptor only advertises.
    pub fn advertises_online(&self) -> bool {
        self.status
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case("online"))
    }
}

// -- Local state --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggle(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" | "claro" => Ok(Self::Light),
            "dark" | "escuro" => Ok(Self::Dark),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}

/// The viewer's own vote on a post, tracked locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    #[default]
    None,
    Up,
    Down,
}

impl VoteState {
    pub fn delta(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn from_delta(delta: i64) -> Self {
        match delta.signum() {
            1 => Self::Up,
            -1 => Self::Down,
            _ => Self::None,
        }
    }
}

/// Result of the periodic status probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerStatus {
    #[default]
    Unknown,
    Online { version: Option<String> },
    Offline,
}

impl ServerStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }
}
