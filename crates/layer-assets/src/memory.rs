//! In-memory document
//!
//! A self-contained [`Document`] implementation holding a parent-linked layer
//! tree. Every mutation publishes the matching [`DocumentChange`] to all live
//! subscribers, which makes it usable both as a host for headless pipelines
//! and as a scripted document in tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use crate::document::{
    ChangeKind, ChangeSubscription, Document, DocumentChange, DocumentId, Layer, LayerId,
};

#[derive(Debug, Default)]
struct Tree {
    file: String,

    layers: BTreeMap<LayerId, Layer>,

    /// Insertion order, used to keep traversal stable
    order: Vec<LayerId>,

    subscribers: Vec<mpsc::UnboundedSender<DocumentChange>>,
}

impl Tree {
    fn children_of(&self, parent: Option<LayerId>) -> Vec<LayerId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.layers.get(id).is_some_and(|layer| layer.parent == parent))
            .collect()
    }

    fn publish(&mut self, change: DocumentChange) {
        // Closed receivers are unsubscribed subscriptions
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

/// A document held entirely in memory.
#[derive(Debug)]
pub struct InMemoryDocument {
    id: DocumentId,
    tree: Mutex<Tree>,
}

impl InMemoryDocument {
    pub fn new(id: DocumentId, file: impl Into<String>) -> Self {
        Self {
            id,
            tree: Mutex::new(Tree {
                file: file.into(),
                ..Tree::default()
            }),
        }
    }

    /// Seed the tree without publishing anything.
    pub fn with_layers(self, layers: impl IntoIterator<Item = Layer>) -> Self {
        {
            let mut tree = self.lock();
            for layer in layers {
                tree.order.push(layer.id);
                tree.layers.insert(layer.id, layer);
            }
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a layer (or replace one with the same id) and publish an `added` change.
    pub fn add_layer(&self, layer: Layer) {
        let mut tree = self.lock();
        if tree.layers.insert(layer.id, layer.clone()).is_none() {
            tree.order.push(layer.id);
        }
        tree.publish(DocumentChange::layer(ChangeKind::Added, layer));
    }

    /// Rename a layer and publish a `changed` change.
    ///
    /// Returns `false` if the layer does not exist.
    pub fn rename_layer(&self, id: LayerId, name: Option<String>) -> bool {
        let mut tree = self.lock();
        let Some(layer) = tree.layers.get_mut(&id) else {
            return false;
        };
        layer.name = name;
        let layer = layer.clone();
        tree.publish(DocumentChange::layer(ChangeKind::Changed, layer));
        true
    }

    /// Remove a layer together with everything nested inside it.
    ///
    /// All removals are published as a single delta.
    pub fn remove_layer(&self, id: LayerId) -> bool {
        let mut tree = self.lock();
        if !tree.layers.contains_key(&id) {
            return false;
        }

        let mut change = DocumentChange::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            stack.extend(tree.children_of(Some(current)));
            if let Some(layer) = tree.layers.remove(&current) {
                change = change.with_layer(ChangeKind::Removed, layer);
            }
        }
        let remaining = tree.layers.clone();
        tree.order.retain(|id| remaining.contains_key(id));
        tree.publish(change);
        true
    }

    /// Move the document's backing file and publish a file change.
    pub fn set_file(&self, file: impl Into<String>) {
        let mut tree = self.lock();
        tree.file = file.into();
        tree.publish(DocumentChange::file_moved());
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut tree = self.lock();
        tree.subscribers.retain(|tx| !tx.is_closed());
        tree.subscribers.len()
    }
}

impl Document for InMemoryDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn file(&self) -> String {
        self.lock().file.clone()
    }

    fn visit_layers(&self, visitor: &mut dyn FnMut(&Layer)) {
        let tree = self.lock();
        let mut stack: Vec<LayerId> = tree.children_of(None).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            if let Some(layer) = tree.layers.get(&id) {
                visitor(layer);
            }
            stack.extend(tree.children_of(Some(id)).into_iter().rev());
        }
    }

    fn find_layer(&self, id: LayerId) -> Option<Layer> {
        self.lock().layers.get(&id).cloned()
    }

    fn subscribe(&self) -> ChangeSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tree = self.lock();
        tree.subscribers.push(tx);
        debug!(document_id = %self.id, subscribers = tree.subscribers.len(), "Subscribed to document changes");
        ChangeSubscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemoryDocument {
        InMemoryDocument::new(DocumentId(1), "/work/poster.psd").with_layers([
            Layer::new(LayerId(1), "group"),
            Layer::new(LayerId(2), "icon.png").in_group(LayerId(1)),
            Layer::new(LayerId(3), "banner.jpg"),
            Layer::unnamed(LayerId(4)).in_group(LayerId(1)),
        ])
    }

    #[test]
    fn test_visit_is_depth_first() {
        let document = sample();
        let mut visited = Vec::new();
        document.visit_layers(&mut |layer| visited.push(layer.id.0));
        assert_eq!(visited, vec![1, 2, 4, 3]);
    }

    #[tokio::test]
    async fn test_rename_publishes_change() {
        let document = sample();
        let mut subscription = document.subscribe();

        assert!(document.rename_layer(LayerId(3), Some("hero.jpg".to_string())));

        let change = subscription.recv().await.unwrap();
        let layers = change.layers.unwrap();
        assert_eq!(layers[&LayerId(3)].kind, ChangeKind::Changed);
        assert_eq!(layers[&LayerId(3)].layer.name.as_deref(), Some("hero.jpg"));
        assert_eq!(
            document.find_layer(LayerId(3)).unwrap().name.as_deref(),
            Some("hero.jpg")
        );
    }

    #[tokio::test]
    async fn test_remove_group_removes_children_in_one_delta() {
        let document = sample();
        let mut subscription = document.subscribe();

        assert!(document.remove_layer(LayerId(1)));

        let layers = subscription.recv().await.unwrap().layers.unwrap();
        let removed: Vec<u32> = layers.keys().map(|id| id.0).collect();
        assert_eq!(removed, vec![1, 2, 4]);
        assert!(layers.values().all(|c| c.kind == ChangeKind::Removed));
        assert!(document.find_layer(LayerId(2)).is_none());
        assert!(document.find_layer(LayerId(3)).is_some());
    }

    #[test]
    fn test_dropped_subscription_unsubscribes() {
        let document = sample();
        let subscription = document.subscribe();
        assert_eq!(document.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(document.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_set_file_publishes_file_change() {
        let document = sample();
        let mut subscription = document.subscribe();

        document.set_file("/elsewhere/poster.psd");

        assert_eq!(subscription.recv().await, Some(DocumentChange::file_moved()));
        assert_eq!(document.file(), "/elsewhere/poster.psd");
    }
}
