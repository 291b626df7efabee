//! Registry of online entities
//!
//! Single source of truth for who is online, and owner of the [`AoiManager`].
//! The registry map and the per-cell member sets are two independent lock
//! domains: the map sits behind one read/write lock, every cell has its own.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::world::aoi::{AoiManager, GridId};
use crate::world::constants::capacity::REGISTRY_INITIAL_CAPACITY;
use crate::world::entity::{Entity, EntityId};
use crate::world::error::{WorldError, WorldResult};

pub struct EntityRegistry {
    aoi: AoiManager,
    entities: RwLock<HashMap<EntityId, Arc<Entity>>>,
}

impl EntityRegistry {
    pub fn new(aoi: AoiManager) -> Self {
        Self {
            aoi,
            entities: RwLock::new(HashMap::with_capacity(REGISTRY_INITIAL_CAPACITY)),
        }
    }

    #[inline]
    pub fn aoi(&self) -> &AoiManager {
        &self.aoi
    }

    /// Insert an entity and index it in the cell matching its current position
    ///
    /// Returns the cell it was placed in. An already registered id is never overwritten.
    pub fn register(&self, entity: Arc<Entity>) -> WorldResult<GridId> {
        let id = entity.id;
        let position = entity.position();
        let gid = self.aoi.clamped_grid_id_for(position.x, position.z);

        {
            let mut entities = self.entities.write();
            if entities.contains_key(&id) {
                return Err(WorldError::DuplicateIdentity(id));
            }
            entities.insert(id, entity);
        }

        self.aoi.add_entity(id, gid)?;
        trace!("Registered entity {} in cell {}", id, gid);
        Ok(gid)
    }

    /// Remove an entity from the registry only
    ///
    /// The caller must already have removed it from its cell, using the
    /// position it had before this call.
    pub fn unregister(&self, id: EntityId) -> WorldResult<Arc<Entity>> {
        self.entities
            .write()
            .remove(&id)
            .ok_or(WorldError::UnknownEntity(id))
    }

    pub fn get(&self, id: EntityId) -> WorldResult<Arc<Entity>> {
        self.entities
            .read()
            .get(&id)
            .cloned()
            .ok_or(WorldError::UnknownEntity(id))
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.read().contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Snapshot of every online entity
    pub fn all_entities(&self) -> Vec<Arc<Entity>> {
        self.entities.read().values().cloned().collect()
    }

    /// Entities resident in one cell
    ///
    /// Ids present in the cell but already gone from the registry are skipped.
    pub fn entities_in_cell(&self, gid: GridId) -> WorldResult<Vec<Arc<Entity>>> {
        let ids = self.aoi.entity_ids_in(gid)?;
        let entities = self.entities.read();
        Ok(ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }

    /// Entities resident anywhere in `gid`'s neighborhood
    pub fn entities_around(&self, gid: GridId) -> WorldResult<Vec<Arc<Entity>>> {
        let ids = self.aoi.entity_ids_around(gid)?;
        let entities = self.entities.read();
        Ok(ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::aoi::AoiRegion;
    use crate::world::entity::Position;
    use crate::world::notify::ChannelOutbound;

    fn registry() -> EntityRegistry {
        EntityRegistry::new(AoiManager::new(AoiRegion::new(0, 300, 3, 0, 300, 3)).unwrap())
    }

    fn entity_at(id: EntityId, x: f32, z: f32) -> Arc<Entity> {
        let (outbound, _rx) = ChannelOutbound::new();
        Arc::new(Entity::new(id, Position::new(x, 0.0, z, 0.0), Arc::new(outbound)))
    }

    #[test]
    fn test_register_places_entity_in_cell() {
        let reg = registry();
        let gid = reg.register(entity_at(1, 150.0, 150.0)).unwrap();

        assert_eq!(gid, 4);
        assert!(reg.contains(1));
        assert!(reg.aoi().entity_ids_in(4).unwrap().contains(&1));
    }

    #[test]
    fn test_register_duplicate_is_rejected() {
        let reg = registry();
        reg.register(entity_at(1, 50.0, 50.0)).unwrap();

        let result = reg.register(entity_at(1, 250.0, 250.0));
        assert_eq!(result, Err(WorldError::DuplicateIdentity(1)));

        // The first registration is untouched
        assert_eq!(reg.get(1).unwrap().position().x, 50.0);
        assert!(reg.aoi().entity_ids_in(8).unwrap().is_empty());
    }

    #[test]
    fn test_register_out_of_region_is_clamped() {
        let reg = registry();
        let gid = reg.register(entity_at(1, -20.0, 999.0)).unwrap();
        assert_eq!(gid, 6);
    }

    #[test]
    fn test_unregister_leaves_grid_to_caller() {
        let reg = registry();
        reg.register(entity_at(1, 50.0, 50.0)).unwrap();

        let removed = reg.unregister(1).unwrap();
        assert_eq!(removed.id, 1);
        assert!(!reg.contains(1));
        assert!(reg.aoi().entity_ids_in(0).unwrap().contains(&1));

        assert!(matches!(reg.unregister(1), Err(WorldError::UnknownEntity(1))));
    }

    #[test]
    fn test_get_unknown() {
        let reg = registry();
        assert!(matches!(reg.get(99), Err(WorldError::UnknownEntity(99))));
    }

    #[test]
    fn test_all_entities_is_a_snapshot() {
        let reg = registry();
        reg.register(entity_at(1, 50.0, 50.0)).unwrap();
        reg.register(entity_at(2, 150.0, 50.0)).unwrap();

        let snapshot = reg.all_entities();
        reg.register(entity_at(3, 250.0, 50.0)).unwrap();
        reg.unregister(1).unwrap();

        let mut ids: Vec<EntityId> = snapshot.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_entities_in_cell_skips_stale_ids() {
        let reg = registry();
        reg.register(entity_at(1, 50.0, 50.0)).unwrap();
        reg.register(entity_at(2, 60.0, 60.0)).unwrap();
        reg.unregister(2).unwrap();

        let residents = reg.entities_in_cell(0).unwrap();
        assert_eq!(residents.len(), 1);
        assert_eq!(residents[0].id, 1);

        assert!(matches!(reg.entities_in_cell(50), Err(WorldError::UnknownCell(50))));
    }

    #[test]
    fn test_entities_around() {
        let reg = registry();
        reg.register(entity_at(1, 50.0, 50.0)).unwrap();
        reg.register(entity_at(2, 150.0, 150.0)).unwrap();
        reg.register(entity_at(3, 250.0, 250.0)).unwrap();

        let mut ids: Vec<EntityId> = reg.entities_around(0).unwrap().iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }
}
