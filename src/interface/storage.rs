use crate::schema::catalog::layer::{BoundingBox, Layer};
use crate::schema::response::DataSource;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use std::collections::hash_map::HashMap;
use std::option::Option;
use std::result::Result;
use std::string::String;
use std::vec::Vec;


#[derive(Debug, Error)]
pub enum StorageError {
    #[error("An IO error while reading from the pyramid store")]
    Io(#[from] std::io::Error),
    #[error("Pyramid payload for layer {0} is corrupt: {1}")]
    Corrupt(String, String),
}

/// Boundary to the pyramid store. Decoding and on-disk/object formats live
/// behind this trait; the dispatch engine only asks for addressed payloads.
#[cfg_attr(test, automock)]
pub trait TileStorage: Send + Sync {
    /// The tile at (level, column, row) of the layer's pyramid, or `None`
    /// when the pyramid holds no data there.
    fn read_tile(
        &self,
        layer: &Layer,
        level: &str,
        column: u32,
        row: u32,
    ) -> Result<Option<DataSource>, StorageError>;

    /// A rendered map extract for a bounding box. Re-sampling and
    /// composition are the store's concern.
    fn read_map(
        &self,
        layer: &Layer,
        bbox: &BoundingBox,
        width: u32,
        height: u32,
        format: &str,
    ) -> Result<Option<DataSource>, StorageError>;
}

/// In-memory pyramid store, the reference implementation used by tests and
/// stand-alone deployments.
#[derive(Default)]
pub struct MemoryTileStorage {
    tiles: HashMap<(String, String, u32, u32), DataSource>,
    maps: HashMap<String, DataSource>,
}

impl MemoryTileStorage {
    pub fn new() -> MemoryTileStorage {
        MemoryTileStorage {
            tiles: HashMap::new(),
            maps: HashMap::new(),
        }
    }

    pub fn insert_tile(
        &mut self,
        layer_id: &str,
        level: &str,
        column: u32,
        row: u32,
        content_type: mime::Mime,
        data: Vec<u8>,
    ) {
        self.tiles.insert(
            (layer_id.to_string(), level.to_string(), column, row),
            DataSource::new(content_type, data),
        );
    }

    pub fn insert_map(&mut self, layer_id: &str, content_type: mime::Mime, data: Vec<u8>) {
        self.maps
            .insert(layer_id.to_string(), DataSource::new(content_type, data));
    }
}

impl TileStorage for MemoryTileStorage {
    fn read_tile(
        &self,
        layer: &Layer,
        level: &str,
        column: u32,
        row: u32,
    ) -> Result<Option<DataSource>, StorageError> {
        let key = (layer.id.clone(), level.to_string(), column, row);
        return Ok(self.tiles.get(&key).cloned());
    }

    fn read_map(
        &self,
        layer: &Layer,
        _bbox: &BoundingBox,
        _width: u32,
        _height: u32,
        _format: &str,
    ) -> Result<Option<DataSource>, StorageError> {
        return Ok(self.maps.get(&layer.id).cloned());
    }
}
