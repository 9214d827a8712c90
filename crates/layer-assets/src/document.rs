//! Host document interface
//!
//! The asset manager never owns the document. It reads layers through the
//! [`Document`] trait and learns about edits through a [`ChangeSubscription`],
//! a channel of [`DocumentChange`] deltas that the host publishes after every
//! mutation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identifier of a layer, assigned by the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u32);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a document, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u32);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of the document tree.
///
/// Layers link upwards to their enclosing group. A layer whose `parent` is
/// `None` sits directly under the implicit root group, which is never
/// represented as a layer itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<LayerId>,
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            parent: None,
        }
    }

    /// A layer without a display name.
    pub fn unnamed(id: LayerId) -> Self {
        Self {
            id,
            name: None,
            parent: None,
        }
    }

    /// Nest this layer inside the group `parent`.
    pub fn in_group(mut self, parent: LayerId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// The display name, if it is non-empty.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

/// How a layer changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One entry of a change delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,

    /// The layer as of this change. For removals this is the last known state.
    pub layer: Layer,
}

/// A change notification published by the document.
///
/// Serialized as `{ "layers": { "<id>": { "type": ..., "layer": ... } }, "file": true }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<BTreeMap<LayerId, LayerChange>>,

    /// Set when the document's backing file moved
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub file: bool,
}

impl DocumentChange {
    /// A delta touching a single layer.
    pub fn layer(kind: ChangeKind, layer: Layer) -> Self {
        let mut layers = BTreeMap::new();
        layers.insert(layer.id, LayerChange { kind, layer });
        Self {
            layers: Some(layers),
            file: false,
        }
    }

    /// A delta reporting that the backing file moved.
    pub fn file_moved() -> Self {
        Self {
            layers: None,
            file: true,
        }
    }

    /// Add another layer entry to this delta.
    pub fn with_layer(mut self, kind: ChangeKind, layer: Layer) -> Self {
        self.layers
            .get_or_insert_with(BTreeMap::new)
            .insert(layer.id, LayerChange { kind, layer });
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.file && self.layers.as_ref().is_none_or(BTreeMap::is_empty)
    }
}

/// Receiving end of a document's change notifications.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct ChangeSubscription {
    rx: mpsc::UnboundedReceiver<DocumentChange>,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<DocumentChange>) -> Self {
        Self { rx }
    }

    /// Receive the next change.
    ///
    /// Returns `None` once the document stops publishing.
    pub async fn recv(&mut self) -> Option<DocumentChange> {
        self.rx.recv().await
    }
}

/// Read access to the host document.
pub trait Document: Send + Sync {
    fn id(&self) -> DocumentId;

    /// Path of the document's backing file. Unsaved documents report a bare name.
    fn file(&self) -> String;

    /// Depth-first traversal over every layer, excluding the implicit root group.
    /// Groups are visited before their children.
    fn visit_layers(&self, visitor: &mut dyn FnMut(&Layer));

    fn find_layer(&self, id: LayerId) -> Option<Layer>;

    /// Start receiving change notifications.
    fn subscribe(&self) -> ChangeSubscription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_payload_from_json() {
        let json = r#"{
            "layers": {
                "3": { "type": "changed", "layer": { "id": 3, "name": "icon.png", "parent": 1 } },
                "4": { "type": "removed", "layer": { "id": 4 } }
            },
            "file": true
        }"#;

        let change: DocumentChange = serde_json::from_str(json).unwrap();
        assert!(change.file);

        let layers = change.layers.unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[&LayerId(3)].kind, ChangeKind::Changed);
        assert_eq!(layers[&LayerId(3)].layer.parent, Some(LayerId(1)));
        assert_eq!(layers[&LayerId(4)].kind, ChangeKind::Removed);
        assert!(layers[&LayerId(4)].layer.name.is_none());
    }

    #[test]
    fn test_change_payload_without_layers() {
        let change: DocumentChange = serde_json::from_str(r#"{"file": true}"#).unwrap();
        assert_eq!(change, DocumentChange::file_moved());
        assert!(!change.is_empty());
        assert!(DocumentChange::default().is_empty());
    }

    #[test]
    fn test_display_name_ignores_blank_names() {
        assert_eq!(Layer::new(LayerId(1), "a.png").display_name(), Some("a.png"));
        assert_eq!(Layer::new(LayerId(1), "  ").display_name(), None);
        assert_eq!(Layer::unnamed(LayerId(1)).display_name(), None);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_sender_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = ChangeSubscription::new(rx);

        tx.send(DocumentChange::file_moved()).unwrap();
        drop(tx);

        assert_eq!(subscription.recv().await, Some(DocumentChange::file_moved()));
        assert_eq!(subscription.recv().await, None);
    }
}
