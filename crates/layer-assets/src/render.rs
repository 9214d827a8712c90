//! Render engine interface and render tracking
//!
//! Rendering happens outside this crate. The [`RenderEngine`] produces a
//! temporary file for a component; the [`RenderTracker`] remembers which
//! renders are in flight and what state every component's last render ended in.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::component::{Component, ComponentId};
use crate::document::{DocumentId, Layer};

/// Everything a render engine needs to produce one artifact.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub document_id: DocumentId,
    pub layer: Layer,
    pub component: Component,
    pub component_id: ComponentId,

    /// Tripped when the render is cancelled. Engines may watch it instead of
    /// (or in addition to) tracking [`RenderEngine::cancel`] calls themselves.
    pub cancellation: CancellationToken,
}

/// How a render settled without producing output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The render was cancelled; an expected outcome during removal or pause
    #[error("render cancelled")]
    Cancelled,

    #[error("render failed: {0}")]
    Failed(String),
}

/// Result of a settled render: the temporary output path, if any.
pub type RenderResult = std::result::Result<Option<PathBuf>, RenderError>;

/// Produces artifact content for components.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Render one component.
    ///
    /// Resolves to the path of a temporary file holding the artifact, or
    /// `None` when there is nothing to write. A cancelled render should
    /// settle with [`RenderError::Cancelled`].
    async fn render(&self, request: RenderRequest) -> RenderResult;

    /// Best-effort cancellation of the render for `component_id`.
    fn cancel(&self, component_id: ComponentId);

    /// Best-effort cancellation of every render for a document.
    fn cancel_all(&self, document_id: DocumentId);
}

/// Lifecycle state of a registered component.
///
/// `Created → RenderPending → {Placed, Discarded, Errored, Cancelled}`.
/// Removed components have no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Created,
    RenderPending,
    /// The artifact was moved to its destination
    Placed,
    /// The render produced nothing to place, or its output was deleted
    Discarded,
    Errored,
    Cancelled,
}

impl RenderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderState::Created => "created",
            RenderState::RenderPending => "pending",
            RenderState::Placed => "placed",
            RenderState::Discarded => "discarded",
            RenderState::Errored => "errored",
            RenderState::Cancelled => "cancelled",
        }
    }
}

/// Identifies one render attempt. A component may be rendered several times;
/// only the newest attempt is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RenderTicket(u64);

#[derive(Debug)]
struct PendingRender {
    ticket: RenderTicket,
    cancellation: CancellationToken,
}

/// What [`RenderTracker::settle`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The settling render was the tracked one; its entry is gone now
    Current,
    /// A newer render replaced it, or tracking was reset since it was issued
    Stale,
}

/// In-flight renders and per-component lifecycle state.
#[derive(Debug, Default)]
pub struct RenderTracker {
    next_ticket: u64,
    pending: BTreeMap<ComponentId, PendingRender>,
    states: BTreeMap<ComponentId, RenderState>,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly registered component.
    pub fn created(&mut self, id: ComponentId) {
        self.states.insert(id, RenderState::Created);
    }

    /// Start tracking a new render for `id`.
    ///
    /// If an earlier render is still tracked it is returned so the caller can
    /// cancel it; its settlement will be [`Settlement::Stale`].
    pub fn begin(
        &mut self,
        id: ComponentId,
    ) -> (RenderTicket, CancellationToken, Option<CancellationToken>) {
        let ticket = RenderTicket(self.next_ticket);
        self.next_ticket += 1;

        let cancellation = CancellationToken::new();
        let previous = self.pending.insert(
            id,
            PendingRender {
                ticket,
                cancellation: cancellation.clone(),
            },
        );
        self.states.insert(id, RenderState::RenderPending);

        (ticket, cancellation, previous.map(|p| p.cancellation))
    }

    /// Stop tracking the render identified by `ticket`.
    ///
    /// The entry is removed only if `ticket` is still current, so a stale
    /// settlement can never clear a newer render's entry.
    pub fn settle(&mut self, id: ComponentId, ticket: RenderTicket) -> Settlement {
        match self.pending.get(&id) {
            Some(pending) if pending.ticket == ticket => {
                self.pending.remove(&id);
                Settlement::Current
            }
            _ => Settlement::Stale,
        }
    }

    /// True while a render for `id` is tracked and has not settled.
    pub fn has_pending(&self, id: ComponentId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Trip the cancellation token of the tracked render for `id`.
    pub fn cancel(&self, id: ComponentId) -> bool {
        match self.pending.get(&id) {
            Some(pending) => {
                pending.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    pub fn pending_ids(&self) -> Vec<ComponentId> {
        self.pending.keys().copied().collect()
    }

    pub fn set_state(&mut self, id: ComponentId, state: RenderState) {
        if let Some(current) = self.states.get_mut(&id) {
            *current = state;
        }
    }

    pub fn state(&self, id: ComponentId) -> Option<RenderState> {
        self.states.get(&id).copied()
    }

    /// Forget a removed component. Its pending entry, if any, is left to settle.
    pub fn forget(&mut self, id: ComponentId) {
        self.states.remove(&id);
    }

    /// Drop all tracking. Settlements of renders issued before the reset are stale.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.states.clear();
    }
}
