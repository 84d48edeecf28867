use serde::{Deserialize, Serialize};

use crate::models::PostId;

/// Change notifications pushed over the optional `/ws` channel.
///
/// Frames are treated as opaque hints: anything that does not decode into a
/// known variant still means "something changed" and triggers a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A new post was published
    PostCreated { post_id: PostId },

    /// A reply was added under a post
    ReplyCreated { post_id: PostId },

    /// A post's tally changed
    VoteUpdated { post_id: PostId, upvotes: i64 },

    /// A post was reported
    PostReported { post_id: PostId },

    /// Unspecified change
    Changed,
}

impl FeedEvent {
    pub fn from_frame(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or(Self::Changed)
    }

    /// The post this event is scoped to, if any.
    pub fn post_id(&self) -> Option<&PostId> {
        match self {
            Self::PostCreated { post_id }
            | Self::ReplyCreated { post_id }
            | Self::VoteUpdated { post_id, .. }
            | Self::PostReported { post_id } => Some(post_id),
            Self::Changed => None,
        }
    }
}
