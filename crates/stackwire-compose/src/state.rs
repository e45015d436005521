//! Composition lifecycle states and cooperative cancellation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of one stack's composition.
///
/// States advance strictly in declaration order; a failed run stays in the
/// last state it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompositionState {
    /// Nothing built yet.
    Empty,
    /// Sections are contributing descriptors.
    Building,
    /// The graph validated and has a realization order.
    Finalized,
    /// Every deferred reference was replaced by its stored value.
    Resolved,
    /// Publish-marked outputs were written to the store.
    Published,
}

impl CompositionState {
    /// The state that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Building),
            Self::Building => Some(Self::Finalized),
            Self::Finalized => Some(Self::Resolved),
            Self::Resolved => Some(Self::Published),
            Self::Published => None,
        }
    }
}

impl fmt::Display for CompositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Building => write!(f, "building"),
            Self::Finalized => write!(f, "finalized"),
            Self::Resolved => write!(f, "resolved"),
            Self::Published => write!(f, "published"),
        }
    }
}

/// Shared flag a caller sets to abort running compositions.
///
/// The composer polls it between sections and between stages.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
