//! Optimistic vote adjustments layered over server tallies.
//!
//! In-flight votes are plain deltas. Once a vote settles, the tally the
//! server confirmed is pinned until a feed fetch that began after the
//! settlement lands; older fetches may not include the vote yet.

use std::collections::HashMap;

use piramide_types::models::PostId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Settled {
    /// Tally the vote endpoint returned, if it returned one.
    tally: Option<i64>,
    /// Settled deltas the server acknowledged without a tally.
    extra: i64,
    /// Fetch ticket issued last when the vote settled.
    after_ticket: u64,
}

#[derive(Debug, Default)]
pub struct VoteOverlay {
    in_flight: HashMap<PostId, i64>,
    settled: HashMap<PostId, Settled>,
}

impl VoteOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, post_id: &PostId, delta: i64) {
        *self.in_flight.entry(post_id.clone()).or_insert(0) += delta;
    }

    /// The vote went through. `last_ticket` is the newest fetch ticket handed
    /// out so far; only fetches with a larger ticket supersede the pin.
    pub fn settle(&mut self, post_id: &PostId, delta: i64, confirmed: Option<i64>, last_ticket: u64) {
        self.release(post_id, delta);

        let entry = self.settled.entry(post_id.clone()).or_default();
        match confirmed {
            Some(tally) => {
                entry.tally = Some(tally);
                entry.extra = 0;
            }
            None => entry.extra += delta,
        }
        entry.after_ticket = last_ticket;
    }

    /// The vote failed; its delta disappears.
    pub fn rollback(&mut self, post_id: &PostId, delta: i64) {
        self.release(post_id, delta);
    }

    /// A fetch with `ticket` was applied. Returns how many pins it cleared.
    pub fn fetched(&mut self, ticket: u64) -> usize {
        let before = self.settled.len();
        self.settled.retain(|_, s| s.after_ticket >= ticket);
        before - self.settled.len()
    }

    pub fn has_pending(&self, post_id: &PostId) -> bool {
        self.in_flight.contains_key(post_id)
    }

    /// What to show for `post_id` given the last fetched server tally.
    pub fn displayed(&self, post_id: &PostId, server_upvotes: i64) -> i64 {
        let base = match self.settled.get(post_id) {
            Some(s) => s.tally.unwrap_or(server_upvotes) + s.extra,
            None => server_upvotes,
        };
        base + self.in_flight.get(post_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty() && self.settled.is_empty()
    }

    fn release(&mut self, post_id: &PostId, delta: i64) {
        if let Some(pending) = self.in_flight.get_mut(post_id) {
            *pending -= delta;
            if *pending == 0 {
                self.in_flight.remove(post_id);
            }
        }
    }
}
