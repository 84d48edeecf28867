use piramide_types::models::{PostId, VoteState};

/// One row of the local vote/report ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub post_id: PostId,
    pub vote: VoteState,
    pub reported: bool,
}

impl LedgerEntry {
    pub fn empty(post_id: PostId) -> Self {
        Self {
            post_id,
            vote: VoteState::None,
            reported: false,
        }
    }
}
