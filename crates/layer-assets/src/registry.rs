//! Component registry
//!
//! Bookkeeping for which components exist and which layer owns them. The
//! component-to-layer and layer-to-components maps are kept as exact inverses;
//! every mutation goes through [`ComponentRegistry::add`] or
//! [`ComponentRegistry::remove`] so the two sides cannot drift.

use std::collections::{BTreeMap, BTreeSet};

use crate::component::{Component, ComponentId};
use crate::document::LayerId;
use crate::error::{Error, Result};

/// Registry of the components currently derived from a document.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// Next identifier to hand out. Survives [`ComponentRegistry::clear`].
    next_id: u64,

    components: BTreeMap<ComponentId, Component>,

    /// Owning layer of each component
    layer_by_component: BTreeMap<ComponentId, LayerId>,

    /// Components owned by each layer. Never holds an empty set.
    components_by_layer: BTreeMap<LayerId, BTreeSet<ComponentId>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` as owned by `layer_id` and return its new identifier.
    pub fn add(&mut self, layer_id: LayerId, component: Component) -> ComponentId {
        let id = ComponentId(self.next_id);
        self.next_id += 1;

        self.components.insert(id, component);
        self.layer_by_component.insert(id, layer_id);
        self.components_by_layer
            .entry(layer_id)
            .or_default()
            .insert(id);

        id
    }

    /// Remove a component and its layer linkage.
    ///
    /// Returns the removed component together with the layer that owned it.
    /// Removing an unknown id is a contract violation and reports
    /// [`Error::UnknownComponent`] without touching any map.
    pub fn remove(&mut self, id: ComponentId) -> Result<(LayerId, Component)> {
        let layer_id = *self
            .layer_by_component
            .get(&id)
            .ok_or(Error::UnknownComponent(id))?;
        let component = self
            .components
            .remove(&id)
            .ok_or(Error::UnknownComponent(id))?;
        self.layer_by_component.remove(&id);

        if let Some(owned) = self.components_by_layer.get_mut(&layer_id) {
            owned.remove(&id);
            if owned.is_empty() {
                self.components_by_layer.remove(&layer_id);
            }
        }

        Ok((layer_id, component))
    }

    /// Remove every component owned by `layer_id`.
    pub fn remove_all(&mut self, layer_id: LayerId) -> Vec<(ComponentId, Component)> {
        let Some(owned) = self.components_by_layer.remove(&layer_id) else {
            return Vec::new();
        };

        owned
            .into_iter()
            .filter_map(|id| {
                self.layer_by_component.remove(&id);
                self.components.remove(&id).map(|component| (id, component))
            })
            .collect()
    }

    /// Drop every registration. Identifiers already handed out stay retired.
    pub fn clear(&mut self) {
        self.components.clear();
        self.layer_by_component.clear();
        self.components_by_layer.clear();
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Layer that owns `id`, if the component is registered.
    pub fn layer_of(&self, id: ComponentId) -> Option<LayerId> {
        self.layer_by_component.get(&id).copied()
    }

    /// Identifiers of the components owned by `layer_id`, in creation order.
    pub fn components_of(&self, layer_id: LayerId) -> Vec<ComponentId> {
        self.components_by_layer
            .get(&layer_id)
            .map(|owned| owned.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.components.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterate over registered components in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &Component)> {
        self.components.iter().map(|(id, component)| (*id, component))
    }

    /// Layers that currently own at least one component.
    pub fn layers(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.components_by_layer.keys().copied()
    }
}
