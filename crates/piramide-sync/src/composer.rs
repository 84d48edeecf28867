//! Class-tag selection and the deferred submission it gates.
//!
//! ```text
//! NoSelection --submit--> Selecting --select--> Selected
//!      ^                     |                     |
//!      +------cancel---------+       (stays until changed)
//! ```
//!
//! A submission made without a class is parked as the single
//! [`PendingAction`]; a newer one replaces it. Choosing a class consumes it
//! exactly once.

use tracing::debug;

use piramide_types::models::{ClassTag, PostId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    NoSelection,
    /// Selector open. `previous` is restored on cancel.
    Selecting { previous: Option<ClassTag> },
    Selected(ClassTag),
}

impl SelectionState {
    pub fn class_tag(&self) -> Option<ClassTag> {
        match self {
            Self::Selected(tag) => Some(*tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Post { text: String },
    Reply { post_id: PostId, text: String },
}

impl PendingAction {
    pub fn text(&self) -> &str {
        match self {
            Self::Post { text } | Self::Reply { text, .. } => text,
        }
    }
}

/// What to do with a submission right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staged {
    Ready(PendingAction, ClassTag),
    AwaitingClass,
}

#[derive(Debug, Default)]
pub struct Composer {
    state: SelectionState,
    pending: Option<PendingAction>,
    reset_after_post: bool,
}

impl Composer {
    pub fn new(reset_after_post: bool) -> Self {
        Self {
            reset_after_post,
            ..Default::default()
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn stage(&mut self, action: PendingAction) -> Staged {
        if let SelectionState::Selected(tag) = self.state {
            return Staged::Ready(action, tag);
        }

        if let Some(old) = self.pending.replace(action) {
            debug!("Pending action replaced before a class was chosen: {:?}", old);
        }
        self.open();
        Staged::AwaitingClass
    }

    pub fn open(&mut self) {
        match self.state {
            SelectionState::Selecting { .. } => {}
            SelectionState::NoSelection => {
                self.state = SelectionState::Selecting { previous: None };
            }
            SelectionState::Selected(tag) => {
                self.state = SelectionState::Selecting {
                    previous: Some(tag),
                };
            }
        }
    }

    /// Closes the selector without choosing. The pending action stays.
    pub fn cancel(&mut self) {
        if let SelectionState::Selecting { previous } = self.state {
            self.state = match previous {
                Some(tag) => SelectionState::Selected(tag),
                None => SelectionState::NoSelection,
            };
        }
    }

    /// Chooses `tag` and hands over the pending action, if one was parked.
    pub fn select(&mut self, tag: ClassTag) -> Option<PendingAction> {
        self.state = SelectionState::Selected(tag);
        self.pending.take()
    }

    pub fn post_succeeded(&mut self) {
        if self.reset_after_post {
            self.state = SelectionState::NoSelection;
        }
    }
}
