//! Change diffing
//!
//! Turns a raw [`DocumentChange`] into the work the asset manager has to do:
//! which layers need their components rebuilt, and which layers are gone.
//!
//! The algorithm:
//!
//! 1. For every layer in the delta, collect its dependent set: the layer itself
//!    plus every named group enclosing it. Rendering a group includes its
//!    children, so a child edit invalidates the group's artifacts. Ancestor
//!    dependencies are approximated as "all named ancestors".
//! 2. Analyze the name of every dependent layer. Results without a destination
//!    file are recorded as skipped; the rest become that layer's components.
//! 3. Strike every removed layer from the changed set. A layer cannot be torn
//!    down and rebuilt by the same delta; removal wins.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::analyzer::{AnalysisError, NameAnalyzer};
use crate::component::Component;
use crate::document::{ChangeKind, Document, DocumentChange, Layer, LayerChange, LayerId};

/// A component the analyzer described but which will not be built.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedComponent {
    pub layer_id: LayerId,

    /// The partially parsed component, if the analyzer produced one
    pub component: Option<Component>,

    pub errors: Vec<AnalysisError>,
}

/// Work derived from one delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Fresh components for every layer that must be rebuilt. An empty list
    /// means the layer's existing components are torn down and nothing replaces them.
    pub changed: BTreeMap<LayerId, Vec<Component>>,

    /// Layers deleted from the document
    pub removed: BTreeSet<LayerId>,

    /// Analyzer results that did not produce a component
    pub skipped: Vec<SkippedComponent>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Compute the work implied by `change`.
pub fn analyze_change(
    change: &DocumentChange,
    document: &dyn Document,
    analyzer: &dyn NameAnalyzer,
) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    let Some(layers) = change.layers.as_ref() else {
        return change_set;
    };

    // 1. Dependent layers of every touched layer, deduplicated by id
    let mut dependents: BTreeMap<LayerId, Layer> = BTreeMap::new();
    for layer_change in layers.values() {
        for layer in dependent_layers(&layer_change.layer, layers, document) {
            dependents.entry(layer.id).or_insert(layer);
        }
    }

    // Layers named directly in the delta always get an entry so that a layer
    // renamed to a non-component name loses its old components.
    for (layer_id, layer_change) in layers {
        if layer_change.kind != ChangeKind::Removed {
            change_set.changed.entry(*layer_id).or_default();
        }
    }

    // 2. Analyze names
    for layer in dependents.values() {
        let (components, skipped) = analyze_layer(layer, analyzer);
        change_set
            .changed
            .entry(layer.id)
            .or_default()
            .extend(components);
        change_set.skipped.extend(skipped);
    }

    // 3. Removal wins
    change_set.removed = layers
        .iter()
        .filter(|(_, layer_change)| layer_change.kind == ChangeKind::Removed)
        .map(|(layer_id, _)| *layer_id)
        .collect();
    for layer_id in &change_set.removed {
        if change_set.changed.remove(layer_id).is_some() {
            debug!(layer_id = %layer_id, "Dropping components of removed layer");
        }
    }

    change_set
}

/// The layer itself (if named) followed by its named ancestors, innermost first.
///
/// Parents are resolved from the delta first, since it carries the freshest
/// state, and from the document otherwise. The walk stops at the root, at an
/// unknown parent, or on a cycle in malformed parent links.
pub fn dependent_layers(
    layer: &Layer,
    delta: &BTreeMap<LayerId, LayerChange>,
    document: &dyn Document,
) -> Vec<Layer> {
    let mut result = Vec::new();
    let mut visited = BTreeSet::from([layer.id]);

    if layer.display_name().is_some() {
        result.push(layer.clone());
    }

    let mut next = layer.parent;
    while let Some(parent_id) = next {
        if !visited.insert(parent_id) {
            warn!(layer_id = %layer.id, parent_id = %parent_id, "Cycle in layer parent links");
            break;
        }

        let parent = delta
            .get(&parent_id)
            .map(|layer_change| layer_change.layer.clone())
            .or_else(|| document.find_layer(parent_id));
        let Some(parent) = parent else {
            debug!(layer_id = %layer.id, parent_id = %parent_id, "Parent layer not found");
            break;
        };

        next = parent.parent;
        if parent.display_name().is_some() {
            result.push(parent);
        }
    }

    result
}

/// Analyze one layer's name, splitting buildable components from skipped ones.
///
/// Unnamed layers produce nothing. Analysis errors are logged and never stop
/// the remaining results from being used.
pub fn analyze_layer(
    layer: &Layer,
    analyzer: &dyn NameAnalyzer,
) -> (Vec<Component>, Vec<SkippedComponent>) {
    let Some(name) = layer.display_name() else {
        return (Vec::new(), Vec::new());
    };

    let mut components = Vec::new();
    let mut skipped = Vec::new();

    for result in analyzer.analyze(name) {
        for error in &result.errors {
            warn!(layer_id = %layer.id, name = %name, error = %error, "Layer name analysis error");
        }

        match result.component {
            Some(component) if component.file.is_some() => components.push(component),
            component => {
                debug!(layer_id = %layer.id, name = %name, "Skipping component without a destination file");
                skipped.push(SkippedComponent {
                    layer_id: layer.id,
                    component,
                    errors: result.errors,
                });
            }
        }
    }

    (components, skipped)
}
