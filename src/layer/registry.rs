use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::LayerError;

use super::{Layer, LayerId};

/// Named layers.
///
/// Layers carry no name of their own; the registry resolves names to layers
/// and layers back to names by identity.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    layers: BTreeMap<String, Arc<Layer>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `layer` under `name`. Names must be unique.
    pub fn insert(&mut self, name: impl Into<String>, layer: Layer) -> Result<Arc<Layer>, LayerError> {
        let name = name.into();
        if self.layers.contains_key(&name) {
            return Err(LayerError::config(format!("Duplicate layer name: \"{}\"", name)));
        }

        let layer = Arc::new(layer);
        self.layers.insert(name, layer.clone());
        Ok(layer)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Layer>> {
        self.layers.get(name)
    }

    /// Look up a layer, failing with [`LayerError::UnknownLayer`].
    pub fn require(&self, name: &str) -> Result<&Arc<Layer>, LayerError> {
        self.get(name)
            .ok_or_else(|| LayerError::UnknownLayer(name.to_string()))
    }

    /// The name `layer` is registered under.
    pub fn name_of(&self, layer: &Layer) -> Option<&str> {
        self.name_of_id(layer.id())
    }

    pub fn name_of_id(&self, id: LayerId) -> Option<&str> {
        self.layers
            .iter()
            .find(|(_, layer)| layer.id() == id)
            .map(|(name, _)| name.as_str())
    }

    /// Layer names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Layer>)> {
        self.layers.iter().map(|(name, layer)| (name.as_str(), layer))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
