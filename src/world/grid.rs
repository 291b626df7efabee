//! A single AOI cell
//!
//! Each cell owns its own member set behind its own lock, so mutations on
//! different cells never contend with each other.

use std::fmt;

use hashbrown::HashSet;
use parking_lot::RwLock;

use crate::world::aoi::GridId;
use crate::world::constants::capacity::CELL_INITIAL_CAPACITY;
use crate::world::entity::EntityId;

/// One rectangular cell of the world region
#[derive(Debug)]
pub struct Grid {
    /// Cell id (`row * cnts_x + col`)
    pub gid: GridId,
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    members: RwLock<HashSet<EntityId>>,
}

impl Grid {
    pub fn new(gid: GridId, min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self {
            gid,
            min_x,
            max_x,
            min_y,
            max_y,
            members: RwLock::new(HashSet::with_capacity(CELL_INITIAL_CAPACITY)),
        }
    }

    /// Add an entity to this cell. Adding a present id is a no-op.
    pub fn add(&self, id: EntityId) {
        self.members.write().insert(id);
    }

    /// Remove an entity from this cell. Removing an absent id is a no-op.
    pub fn remove(&self, id: EntityId) {
        self.members.write().remove(&id);
    }

    /// Snapshot of the current members
    ///
    /// The returned set is a copy; later mutations of the cell are not visible through it.
    pub fn members(&self) -> HashSet<EntityId> {
        self.members.read().clone()
    }

    /// Append the current members to `out` without allocating an intermediate set
    pub fn extend_members_into(&self, out: &mut HashSet<EntityId>) {
        out.extend(self.members.read().iter().copied());
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.members.read().contains(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Whether a ground-plane point lies inside this cell's rectangle (max edges exclusive)
    pub fn contains_point(&self, x: f32, z: f32) -> bool {
        x >= self.min_x as f32 && x < self.max_x as f32 && z >= self.min_y as f32 && z < self.max_y as f32
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<EntityId> = self.members.read().iter().copied().collect();
        ids.sort_unstable();
        write!(
            f,
            "Grid id: {}, minX:{}, maxX:{}, minY:{}, maxY:{}, entityIds:{:?}",
            self.gid, self.min_x, self.max_x, self.min_y, self.max_y, ids
        )
    }
}
