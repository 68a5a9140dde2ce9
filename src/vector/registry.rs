use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::errors::Result;
use crate::vector::{MapIdentity, VectorMap};

/// Shared handle to an open map.
pub type MapRef = Arc<Mutex<VectorMap>>;

/// Locks a shared map.
///
/// Lock order is registry, then map, then the native lock. Never take a map
/// lock while holding the native lock.
pub fn lock_map(map: &MapRef) -> MutexGuard<'_, VectorMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Open maps keyed by identity.
///
/// Each map is opened once and shared by all layers opened on it. A map
/// stays open while at least one [`LayerHandle`] refers to it and is closed
/// and forgotten when the last one is released.
#[derive(Debug, Clone, Default)]
pub struct MapRegistry {
    maps: Arc<Mutex<HashMap<MapIdentity, MapRef>>>,
}

impl MapRegistry {
    pub fn new() -> MapRegistry {
        MapRegistry::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MapIdentity, MapRef>> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a layer (category field) of a map, opening the map on first use.
    pub fn open_layer(&self, identity: &MapIdentity, field: i32) -> Result<LayerHandle> {
        let mut maps = self.lock();
        let map = match maps.get(identity) {
            Some(map) => {
                let map = Arc::clone(map);
                let mut guard = lock_map(&map);
                if guard.is_valid() {
                    debug!(map = %identity, "map is already open");
                } else {
                    debug!(map = %identity, "registered map is invalid, reopening");
                    guard.open()?;
                }
                drop(guard);
                map
            }
            None => {
                let mut map = VectorMap::new(identity.clone());
                map.open()?;
                let map = Arc::new(Mutex::new(map));
                maps.insert(identity.clone(), Arc::clone(&map));
                map
            }
        };
        lock_map(&map).open_layer(field);
        Ok(LayerHandle {
            registry: self.clone(),
            map,
            field,
        })
    }

    /// Releases a layer handle. Same as dropping it.
    pub fn close_layer(&self, handle: LayerHandle) {
        drop(handle);
    }

    /// The open map of an identity, if any.
    pub fn get(&self, identity: &MapIdentity) -> Option<MapRef> {
        self.lock().get(identity).cloned()
    }

    pub fn contains(&self, identity: &MapIdentity) -> bool {
        self.lock().contains_key(identity)
    }

    /// Number of open maps.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, map: &MapRef, field: i32) {
        let mut maps = self.lock();
        let mut guard = lock_map(map);
        guard.close_layer(field);
        if guard.user_count() == 0 {
            debug!(map = %guard.identity(), "no more users, closing map");
            guard.close();
            let identity = guard.identity().clone();
            drop(guard);
            maps.remove(&identity);
        }
    }
}

/// A user of one layer of a shared map. Dropping it releases the layer.
#[derive(Debug)]
pub struct LayerHandle {
    registry: MapRegistry,
    map: MapRef,
    field: i32,
}

impl LayerHandle {
    pub fn field(&self) -> i32 {
        self.field
    }

    pub fn map_ref(&self) -> &MapRef {
        &self.map
    }

    /// Locks the map the layer belongs to.
    pub fn map(&self) -> MutexGuard<'_, VectorMap> {
        lock_map(&self.map)
    }
}

impl Drop for LayerHandle {
    fn drop(&mut self) {
        self.registry.release(&self.map, self.field);
    }
}
