//! World context
//!
//! [`World`] is the explicitly constructed context every connection task shares.
//! It owns the registry (and through it the AOI grid), the id allocator and the
//! spawn/pacing policy. Each `on_*` operation plans its notifications first and
//! delivers them afterwards, with no lock held during delivery.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::WorldConfig;
use crate::metrics::Metrics;
use crate::world::aoi::{AoiManager, GridId};
use crate::world::entity::{Entity, EntityId, IdAllocator, Position, SpawnConfig};
use crate::world::error::{WorldError, WorldResult};
use crate::world::notify::{ChatTarget, Fanout, Outbound};
use crate::world::registry::EntityRegistry;
use crate::world::visibility;

pub struct World {
    registry: EntityRegistry,
    ids: IdAllocator,
    spawn: SpawnConfig,
    pacing: Option<Duration>,
    metrics: Arc<Metrics>,
}

impl World {
    /// Build the cell table and an empty registry. Degenerate regions fail here.
    pub fn new(config: &WorldConfig, metrics: Arc<Metrics>) -> WorldResult<Self> {
        let aoi = AoiManager::new(config.region)?;
        info!(
            "World region [{}, {}] x [{}, {}] split into {}x{} cells of {}x{}",
            config.region.min_x,
            config.region.max_x,
            config.region.min_y,
            config.region.max_y,
            config.region.cnts_x,
            config.region.cnts_y,
            config.region.cell_width(),
            config.region.cell_length()
        );

        Ok(Self {
            registry: EntityRegistry::new(aoi),
            ids: IdAllocator::new(),
            spawn: config.spawn,
            pacing: config.notify_pacing,
            metrics,
        })
    }

    #[inline]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    #[inline]
    pub fn aoi(&self) -> &AoiManager {
        self.registry.aoi()
    }

    #[inline]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn online_count(&self) -> usize {
        self.registry.len()
    }

    /// Cell the entity is currently indexed under
    pub fn cell_of(&self, id: EntityId) -> WorldResult<GridId> {
        let position = self.registry.get(id)?.position();
        Ok(self.aoi().clamped_grid_id_for(position.x, position.z))
    }

    async fn deliver(&self, fanout: Fanout) -> usize {
        let planned = fanout.len();
        let sent = fanout.deliver(self.pacing).await;
        self.metrics.record_fanout(planned, sent);
        sent
    }

    /// A connection was established: assign an id and spawn near the spawn anchor
    pub async fn on_connect(&self, outbound: Arc<dyn Outbound>) -> WorldResult<EntityId> {
        let position = self.spawn.spawn_position(&mut rand::thread_rng());
        self.spawn_at(outbound, position).await
    }

    /// Connect with an explicit spawn position
    pub async fn spawn_at(&self, outbound: Arc<dyn Outbound>, position: Position) -> WorldResult<EntityId> {
        ensure_finite(position)?;
        let id = self.ids.next_id()?;
        let entity = Arc::new(Entity::new(id, position, outbound));
        let fanout = visibility::apply_spawn(&self.registry, &entity)?;

        self.metrics.entities_online.store(self.registry.len() as u64, Ordering::Relaxed);
        info!("Entity {} arrived at ({}, {})", id, position.x, position.z);

        self.deliver(fanout).await;
        Ok(id)
    }

    /// The connection bound to `id` terminated
    pub async fn on_disconnect(&self, id: EntityId) -> WorldResult<()> {
        let fanout = visibility::apply_despawn(&self.registry, id)?;

        self.metrics.entities_online.store(self.registry.len() as u64, Ordering::Relaxed);
        info!("Entity {} left", id);

        self.deliver(fanout).await;
        Ok(())
    }

    /// Entity `id` reports a new position and heading
    pub async fn on_move(&self, id: EntityId, position: Position) -> WorldResult<()> {
        ensure_finite(position)?;
        let mover = self.registry.get(id)?;
        let outcome = visibility::apply_move(&self.registry, &mover, position)?;

        self.metrics.moves_total.fetch_add(1, Ordering::Relaxed);
        if outcome.crossed_cells() {
            self.metrics.cell_transitions_total.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            "Entity {} moved to ({}, {}, {}) heading {}",
            id, position.x, position.height, position.z, position.heading
        );

        self.deliver(outcome.fanout).await;
        Ok(())
    }

    /// Route chat text to one entity or everyone online
    pub async fn on_chat(&self, from: EntityId, target: ChatTarget, text: &str) -> WorldResult<()> {
        let fanout = visibility::chat(&self.registry, from, target, text)?;
        self.metrics.chat_messages_total.fetch_add(1, Ordering::Relaxed);
        self.deliver(fanout).await;
        Ok(())
    }

    /// Send `id` one batch snapshot of everything in its neighborhood
    pub async fn on_request_surroundings(&self, id: EntityId) -> WorldResult<()> {
        let fanout = visibility::surroundings(&self.registry, id)?;
        self.deliver(fanout).await;
        Ok(())
    }
}

/// NaN or infinite coordinates never reach the index or other clients
fn ensure_finite(position: Position) -> WorldResult<()> {
    if position.is_finite() {
        Ok(())
    } else {
        Err(WorldError::InvalidCoordinates {
            x: position.x,
            z: position.z,
        })
    }
}
