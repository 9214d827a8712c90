//! Asset manager
//!
//! Owns the component registry and render tracking for one document and keeps
//! them in step with the document's layers:
//!
//! - Change deltas are diffed into rebuilt and removed layers. Old components
//!   are cancelled and removed before fresh ones are registered and rendered.
//! - Every render runs in its own task and re-enters the manager when it
//!   settles, to place, discard or log its result.
//!
//! All state sits behind a single async mutex. Handling a delta holds it from
//! start to finish, so deltas never interleave with each other or with render
//! settlements. Settlements may still arrive after the delta that made them
//! obsolete; they find their component gone and only clean up after themselves.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, warn};

use crate::analyzer::NameAnalyzer;
use crate::component::{Component, ComponentId};
use crate::controller::Listener;
use crate::diff::{ChangeSet, analyze_change, analyze_layer};
use crate::document::{Document, DocumentChange, Layer, LayerId};
use crate::error::{Error, Result};
use crate::files::AssetFiles;
use crate::placement::{self, Placement};
use crate::registry::ComponentRegistry;
use crate::render::{
    RenderEngine, RenderError, RenderRequest, RenderResult, RenderState, RenderTicket,
    RenderTracker, Settlement,
};

/// State guarded by the manager's lock.
#[derive(Debug, Default)]
pub(crate) struct ManagerState {
    pub(crate) registry: ComponentRegistry,
    pub(crate) renders: RenderTracker,
}

pub(crate) struct Inner {
    pub(crate) document: Arc<dyn Document>,
    analyzer: Arc<dyn NameAnalyzer>,
    renderer: Arc<dyn RenderEngine>,
    files: Arc<dyn AssetFiles>,

    state: Mutex<ManagerState>,

    /// Number of render tasks that have not finished handling their result
    in_flight: watch::Sender<usize>,

    /// Change listener while resumed
    pub(crate) listener: StdMutex<Option<Listener>>,

    /// Serializes `resume` and `pause`
    pub(crate) lifecycle: Mutex<()>,
}

/// Derives and maintains the assets of one document.
///
/// Cheap to clone; clones share the same state. Render tasks and the change
/// listener hold clones, so a resumed manager stays alive until paused.
#[derive(Clone)]
pub struct AssetManager {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("document_id", &self.inner.document.id())
            .finish_non_exhaustive()
    }
}

/// Counts one render task as in flight until dropped, also when the task
/// panics or is aborted.
struct InFlight {
    manager: AssetManager,
}

impl InFlight {
    fn enter(manager: AssetManager) -> Self {
        manager.inner.in_flight.send_modify(|n| *n += 1);
        Self { manager }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.manager.inner.in_flight.send_modify(|n| *n -= 1);
    }
}

impl AssetManager {
    pub fn new(
        document: Arc<dyn Document>,
        analyzer: Arc<dyn NameAnalyzer>,
        renderer: Arc<dyn RenderEngine>,
        files: Arc<dyn AssetFiles>,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                document,
                analyzer,
                renderer,
                files,
                state: Mutex::new(ManagerState::default()),
                in_flight,
                listener: StdMutex::new(None),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().await
    }

    /// Apply one change delta.
    ///
    /// Runs to completion before any other delta or render settlement is
    /// handled. Failures are logged per component and never abort the delta.
    pub async fn handle_change(&self, change: DocumentChange) {
        let mut state = self.lock_state().await;

        if change.file {
            self.refresh_base_path().await;
        }

        if change.layers.is_some() {
            let change_set = analyze_change(
                &change,
                self.inner.document.as_ref(),
                self.inner.analyzer.as_ref(),
            );
            debug!(
                changed = change_set.changed.len(),
                removed = change_set.removed.len(),
                skipped = change_set.skipped.len(),
                "Analyzed document change"
            );
            self.apply_change_set(&mut state, change_set).await;
        }
    }

    async fn apply_change_set(&self, state: &mut ManagerState, change_set: ChangeSet) {
        for layer_id in &change_set.removed {
            self.remove_layer_components(state, *layer_id).await;
        }

        for (layer_id, components) in change_set.changed {
            self.remove_layer_components(state, layer_id).await;
            for component in components {
                self.add_component(state, layer_id, component);
            }
        }
    }

    /// Register a component and start rendering it.
    fn add_component(
        &self,
        state: &mut ManagerState,
        layer_id: LayerId,
        component: Component,
    ) -> ComponentId {
        let id = state.registry.add(layer_id, component);
        state.renders.created(id);
        debug!(component_id = %id, layer_id = %layer_id, "Component created");

        if let Err(e) = self.start_render(state, id) {
            warn!(component_id = %id, error = %e, "Failed to request render");
        }
        id
    }

    async fn remove_layer_components(&self, state: &mut ManagerState, layer_id: LayerId) {
        for id in state.registry.components_of(layer_id) {
            self.remove_component(state, id).await;
        }
    }

    /// Tear down one component.
    ///
    /// A pending render is cancelled before the component leaves the registry,
    /// so its settlement can only ever find the component gone.
    async fn remove_component(&self, state: &mut ManagerState, id: ComponentId) {
        if state.renders.has_pending(id) {
            self.cancel_locked(state, id);
        }

        let (layer_id, component) = match state.registry.remove(id) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(component_id = %id, error = %e, "Cannot remove component");
                return;
            }
        };
        state.renders.forget(id);

        match placement::remove_artifact(self.inner.files.as_ref(), &component).await {
            Ok(Some(path)) => {
                debug!(component_id = %id, layer_id = %layer_id, path = %path.display(), "Removed component artifact");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(component_id = %id, layer_id = %layer_id, error = %e, "Failed to remove component artifact");
            }
        }
    }

    /// Issue a render for a registered component.
    ///
    /// A render still pending for the same component is cancelled first.
    pub async fn request_render(&self, id: ComponentId) -> Result<()> {
        let mut state = self.lock_state().await;
        self.start_render(&mut state, id)
    }

    fn start_render(&self, state: &mut ManagerState, id: ComponentId) -> Result<()> {
        let component = state
            .registry
            .get(id)
            .cloned()
            .ok_or(Error::UnknownComponent(id))?;
        let layer_id = state
            .registry
            .layer_of(id)
            .ok_or(Error::UnknownComponent(id))?;
        let layer = self
            .inner
            .document
            .find_layer(layer_id)
            .unwrap_or_else(|| {
                debug!(layer_id = %layer_id, "Owning layer not in document, rendering last known state");
                Layer::unnamed(layer_id)
            });

        let (ticket, cancellation, previous) = state.renders.begin(id);
        if let Some(previous) = previous {
            debug!(component_id = %id, "Cancelling superseded render");
            self.inner.renderer.cancel(id);
            previous.cancel();
        }

        let request = RenderRequest {
            document_id: self.inner.document.id(),
            layer,
            component,
            component_id: id,
            cancellation,
        };

        let in_flight = InFlight::enter(self.clone());
        tokio::spawn(async move {
            let manager = &in_flight.manager;
            let result = manager.inner.renderer.render(request).await;
            manager.finish_render(id, ticket, result).await;
        });

        debug!(component_id = %id, layer_id = %layer_id, "Render requested");
        Ok(())
    }

    /// Handle a settled render.
    async fn finish_render(&self, id: ComponentId, ticket: RenderTicket, result: RenderResult) {
        let mut state = self.lock_state().await;
        let settlement = state.renders.settle(id, ticket);
        let layer_id = state.registry.layer_of(id);
        let component = state.registry.get(id).cloned();
        let current = settlement == Settlement::Current && component.is_some();

        let temp_path = match result {
            Ok(Some(temp_path)) => temp_path,
            Ok(None) => {
                debug!(component_id = %id, "Render produced no output");
                if current {
                    state.renders.set_state(id, RenderState::Discarded);
                }
                return;
            }
            Err(RenderError::Cancelled) => {
                debug!(component_id = %id, layer_id = ?layer_id, "Render cancelled");
                if current {
                    state.renders.set_state(id, RenderState::Cancelled);
                }
                return;
            }
            Err(RenderError::Failed(reason)) => {
                warn!(component_id = %id, layer_id = ?layer_id, error = %reason, "Render failed");
                if current {
                    state.renders.set_state(id, RenderState::Errored);
                }
                return;
            }
        };

        let Some(component) = component.filter(|_| current) else {
            debug!(component_id = %id, path = %temp_path.display(), "Discarding output of stale render");
            if let Err(e) = placement::discard(self.inner.files.as_ref(), &temp_path).await {
                warn!(component_id = %id, error = %e, "Failed to discard render output");
            }
            return;
        };

        let files = self.inner.files.as_ref();
        let new_state = match placement::place(files, &component, &temp_path).await {
            Ok(Placement::Placed(path)) => {
                info!(component_id = %id, layer_id = ?layer_id, path = %path.display(), "Asset placed");
                RenderState::Placed
            }
            Ok(Placement::Discarded) => RenderState::Discarded,
            Err(e) => {
                warn!(component_id = %id, layer_id = ?layer_id, error = %e, "Failed to place asset");
                RenderState::Errored
            }
        };
        debug!(component_id = %id, state = new_state.as_str(), "Render settled");
        state.renders.set_state(id, new_state);
    }

    /// Signal cancellation of the render for `id`. The registry is untouched.
    pub async fn cancel(&self, id: ComponentId) {
        let state = self.lock_state().await;
        self.cancel_locked(&state, id);
    }

    pub(crate) fn cancel_locked(&self, state: &ManagerState, id: ComponentId) {
        self.inner.renderer.cancel(id);
        state.renders.cancel(id);
    }

    /// Cancel every outstanding render of the document.
    pub async fn cancel_all(&self) {
        let state = self.lock_state().await;
        self.cancel_all_locked(&state);
    }

    pub(crate) fn cancel_all_locked(&self, state: &ManagerState) {
        self.inner.renderer.cancel_all(self.inner.document.id());
        for id in state.renders.pending_ids() {
            self.cancel_locked(state, id);
        }
    }

    pub async fn has_pending(&self, id: ComponentId) -> bool {
        self.lock_state().await.renders.has_pending(id)
    }

    /// Lifecycle state of a registered component.
    pub async fn render_state(&self, id: ComponentId) -> Option<RenderState> {
        self.lock_state().await.renders.state(id)
    }

    pub async fn component(&self, id: ComponentId) -> Option<Component> {
        self.lock_state().await.registry.get(id).cloned()
    }

    pub async fn components_of(&self, layer_id: LayerId) -> Vec<ComponentId> {
        self.lock_state().await.registry.components_of(layer_id)
    }

    /// Snapshot of every registered component with its owning layer.
    pub async fn components(&self) -> Vec<(ComponentId, LayerId, Component)> {
        let state = self.lock_state().await;
        state
            .registry
            .iter()
            .filter_map(|(id, component)| {
                let layer_id = state.registry.layer_of(id)?;
                Some((id, layer_id, component.clone()))
            })
            .collect()
    }

    /// Wait until every issued render has settled and been handled.
    pub async fn wait_for_renders(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub(crate) async fn refresh_base_path(&self) {
        let file = self.inner.document.file();
        if let Err(e) = self.inner.files.set_base_path(&file).await {
            warn!(document_file = %file, error = %e, "Failed to update asset base path");
        }
    }

    /// Rebuild everything from the current document.
    ///
    /// Renders still tracked are cancelled, all tracking is dropped, and every
    /// layer is analyzed and rendered afresh.
    pub(crate) async fn reset(&self, state: &mut ManagerState) {
        for id in state.renders.pending_ids() {
            self.cancel_locked(state, id);
        }
        state.renders.clear();
        state.registry.clear();

        self.refresh_base_path().await;

        let mut layers = Vec::new();
        self.inner
            .document
            .visit_layers(&mut |layer| layers.push(layer.clone()));

        let mut created = 0;
        for layer in &layers {
            let (components, _skipped) = analyze_layer(layer, self.inner.analyzer.as_ref());
            for component in components {
                self.add_component(state, layer.id, component);
                created += 1;
            }
        }

        info!(
            document_id = %self.inner.document.id(),
            layers = layers.len(),
            components = created,
            "Derived components from document"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::analyzer::AnalysisResult;
    use crate::config::AssetsConfig;
    use crate::document::DocumentId;
    use crate::files::FsAssetFiles;
    use crate::memory::InMemoryDocument;

    struct PanickingEngine;

    #[async_trait]
    impl RenderEngine for PanickingEngine {
        async fn render(&self, _request: RenderRequest) -> RenderResult {
            panic!("engine crashed");
        }

        fn cancel(&self, _component_id: ComponentId) {}

        fn cancel_all(&self, _document_id: DocumentId) {}
    }

    #[tokio::test]
    async fn test_panicking_render_still_counts_as_settled() {
        let document = Arc::new(
            InMemoryDocument::new(DocumentId(1), "/work/poster.psd")
                .with_layers([Layer::new(LayerId(1), "icon.png")]),
        );
        let analyzer =
            |name: &str| vec![AnalysisResult::component(Component::new(name, name))];
        let manager = AssetManager::new(
            document,
            Arc::new(analyzer),
            Arc::new(PanickingEngine),
            Arc::new(FsAssetFiles::new(AssetsConfig::default())),
        );

        manager.resume().await;
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_renders())
            .await
            .expect("render count never dropped back to zero");
        manager.pause().await;
    }
}
