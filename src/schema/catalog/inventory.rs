use crate::schema::catalog::layer::Layer;

use std::collections::hash_map::HashMap;
use std::option::Option;
use std::string::String;
use std::sync::Arc;
use std::vec::Vec;


/// One immutable snapshot of the layer catalog. Workers read a snapshot for
/// the whole lifetime of a request; administration builds a new snapshot and
/// publishes it atomically, so no reader ever observes a half-updated
/// catalog. Layers are shared between snapshots through `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    layers: HashMap<String, Arc<Layer>>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog {
            layers: HashMap::new(),
        }
    }

    pub fn from_layers(layers: Vec<Layer>) -> Catalog {
        let mut catalog = Catalog::new();
        for layer in layers {
            catalog.layers.insert(layer.id.clone(), Arc::new(layer));
        }
        catalog
    }

    pub fn get_layer(&self, id: &str) -> Option<&Arc<Layer>> {
        self.layers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer identifiers in stable order, for capability documents.
    pub fn layer_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.layers.keys().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        return ids;
    }

    pub fn iter_layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers.values()
    }

    /// A new snapshot with `layer` inserted or replaced.
    pub fn with_layer(&self, layer: Layer) -> Catalog {
        let mut next = self.clone();
        next.layers.insert(layer.id.clone(), Arc::new(layer));
        return next;
    }

    /// A new snapshot with `id` removed.
    pub fn without_layer(&self, id: &str) -> Catalog {
        let mut next = self.clone();
        next.layers.remove(id);
        return next;
    }
}
