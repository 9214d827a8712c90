//! Pause and resume
//!
//! While resumed, a listener task feeds every document change into
//! [`AssetManager::handle_change`]. Pausing stops the listener, which drops the
//! subscription, and cancels all outstanding renders.

use std::sync::MutexGuard;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::document::ChangeSubscription;
use crate::manager::AssetManager;

/// A running change listener.
#[derive(Debug)]
pub(crate) struct Listener {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Listener {
    /// Stop listening. A delta already being handled runs to completion first.
    async fn shutdown(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            debug!(error = %e, "Change listener ended abnormally");
        }
    }
}

impl AssetManager {
    /// Start generating assets.
    ///
    /// Subscribes to document changes, then rebuilds every component from the
    /// current document and renders it. Resuming an active manager replaces
    /// its subscription and rebuilds again. Concurrent calls to `resume` and
    /// [`pause`](Self::pause) take effect one after another.
    pub async fn resume(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if let Some(previous) = self.take_listener() {
            previous.shutdown().await;
        }

        // Hold the state lock so the new listener cannot apply a delta before
        // the rebuild below has finished.
        let mut state = self.lock_state().await;

        let subscription = self.inner.document.subscribe();
        let listener = self.spawn_listener(subscription);
        *self.listener_slot() = Some(listener);

        info!(document_id = %self.inner.document.id(), "Resuming asset generation");
        self.reset(&mut state).await;
    }

    /// Stop generating assets.
    ///
    /// Unsubscribes from document changes and cancels every outstanding
    /// render, both in bulk for the document and one by one for each render
    /// still tracked here.
    pub async fn pause(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if let Some(listener) = self.take_listener() {
            listener.shutdown().await;
        }

        let state = self.lock_state().await;
        info!(
            document_id = %self.inner.document.id(),
            pending = state.renders.pending_ids().len(),
            "Pausing asset generation"
        );
        self.cancel_all_locked(&state);
    }

    /// True while resumed.
    pub fn is_active(&self) -> bool {
        self.listener_slot().is_some()
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<Listener>> {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn take_listener(&self) -> Option<Listener> {
        self.listener_slot().take()
    }

    fn spawn_listener(&self, mut subscription: ChangeSubscription) -> Listener {
        let stop = CancellationToken::new();
        let manager = self.clone();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    change = subscription.recv() => match change {
                        Some(change) => manager.handle_change(change).await,
                        None => {
                            debug!("Document stopped publishing changes");
                            break;
                        }
                    },
                }
            }
        });

        Listener { stop, task }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::analyzer::AnalysisResult;
    use crate::component::{Component, ComponentId};
    use crate::config::AssetsConfig;
    use crate::document::{DocumentId, Layer, LayerId};
    use crate::files::FsAssetFiles;
    use crate::memory::InMemoryDocument;
    use crate::render::{RenderEngine, RenderRequest, RenderResult};

    struct NoOutput;

    #[async_trait]
    impl RenderEngine for NoOutput {
        async fn render(&self, _request: RenderRequest) -> RenderResult {
            Ok(None)
        }

        fn cancel(&self, _component_id: ComponentId) {}

        fn cancel_all(&self, _document_id: DocumentId) {}
    }

    fn manager_for(document: Arc<InMemoryDocument>) -> AssetManager {
        let analyzer =
            |name: &str| vec![AnalysisResult::component(Component::new(name, name))];
        AssetManager::new(
            document,
            Arc::new(analyzer),
            Arc::new(NoOutput),
            Arc::new(FsAssetFiles::new(AssetsConfig::default())),
        )
    }

    fn poster() -> Arc<InMemoryDocument> {
        Arc::new(
            InMemoryDocument::new(DocumentId(1), "/work/poster.psd")
                .with_layers([Layer::new(LayerId(1), "icon.png")]),
        )
    }

    #[tokio::test]
    async fn test_resume_and_pause() {
        let document = poster();
        let manager = manager_for(document.clone());
        assert!(!manager.is_active());

        manager.resume().await;
        assert!(manager.is_active());
        assert_eq!(document.subscriber_count(), 1);
        assert_eq!(manager.components_of(LayerId(1)).await.len(), 1);

        manager.pause().await;
        assert!(!manager.is_active());
        assert_eq!(document.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_twice_keeps_one_subscription() {
        let document = poster();
        let manager = manager_for(document.clone());

        manager.resume().await;
        manager.resume().await;
        assert_eq!(document.subscriber_count(), 1);

        manager.pause().await;
        assert_eq!(document.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_resumes_leave_one_listener() {
        let document = poster();
        let manager = manager_for(document.clone());

        // Both resumes start while the state is busy
        let state = manager.lock_state().await;
        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.resume().await }
        });
        let second = tokio::spawn({
            let manager = manager.clone();
            async move { manager.resume().await }
        });
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        drop(state);
        first.await.unwrap();
        second.await.unwrap();

        assert!(manager.is_active());
        assert_eq!(document.subscriber_count(), 1);

        manager.pause().await;
        assert!(!manager.is_active());
        assert_eq!(document.subscriber_count(), 0);
    }
}
