use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::world::constants::{identity, spawn};
use crate::world::error::{WorldError, WorldResult};
use crate::world::notify::{Notification, Outbound};

/// Entity identifier, unique for the lifetime of a connection
pub type EntityId = u32;

/// Position and heading of an entity
///
/// `x` and `z` span the ground plane indexed by the AOI grid; `height` is
/// carried along but never used for cell lookups. `heading` is in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub height: f32,
    pub z: f32,
    pub heading: f32,
}

impl Position {
    pub const fn new(x: f32, height: f32, z: f32, heading: f32) -> Self {
        Self { x, height, z, heading }
    }

    /// No NaN or infinite component
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.height.is_finite() && self.z.is_finite() && self.heading.is_finite()
    }
}

/// A connected, mobile entity
pub struct Entity {
    pub id: EntityId,
    position: RwLock<Position>,
    outbound: Arc<dyn Outbound>,
}

impl Entity {
    pub fn new(id: EntityId, position: Position, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            id,
            position: RwLock::new(position),
            outbound,
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        *self.position.read()
    }

    /// Replace the stored position, returning the previous one
    pub fn set_position(&self, position: Position) -> Position {
        std::mem::replace(&mut *self.position.write(), position)
    }

    /// Hand a notification to this entity's outbound channel
    ///
    /// Failures are logged and swallowed: a closed channel means the peer is
    /// already going away and its disconnect path will clean it up.
    pub fn send(&self, notification: Notification) -> bool {
        match self.outbound.send(notification) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping notification for entity {}: {}", self.id, e);
                false
            }
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("position", &self.position())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Identity assignment
// ============================================================================

/// Monotonic entity id source shared by all connection tasks
#[derive(Debug)]
pub struct IdAllocator {
    next: Mutex<EntityId>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(identity::FIRST_ENTITY_ID)
    }

    pub fn starting_at(first: EntityId) -> Self {
        Self { next: Mutex::new(first) }
    }

    /// Hand out the next id. Once the counter would wrap, every call fails.
    pub fn next_id(&self) -> WorldResult<EntityId> {
        let mut next = self.next.lock();
        let id = *next;
        *next = id.checked_add(1).ok_or(WorldError::IdsExhausted)?;
        Ok(id)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Spawn policy
// ============================================================================

/// Spawn point plus the random offset range applied on each axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub anchor_x: f32,
    pub anchor_z: f32,
    /// Offset drawn from `[0, jitter_x)`; 0 disables jitter on this axis
    pub jitter_x: u32,
    pub jitter_z: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            anchor_x: spawn::ANCHOR_X,
            anchor_z: spawn::ANCHOR_Z,
            jitter_x: spawn::JITTER_X,
            jitter_z: spawn::JITTER_Z,
        }
    }
}

impl SpawnConfig {
    /// Pick a spawn position: anchor plus a whole-unit random offset, height and heading zero
    pub fn spawn_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let dx = if self.jitter_x > 0 { rng.gen_range(0..self.jitter_x) } else { 0 };
        let dz = if self.jitter_z > 0 { rng.gen_range(0..self.jitter_z) } else { 0 };
        Position::new(self.anchor_x + dx as f32, 0.0, self.anchor_z + dz as f32, 0.0)
    }
}
