//! Visibility transitions
//!
//! Every function here mutates the spatial index / registry as required and
//! returns the resulting notifications as an ordered [`Fanout`]. Nothing is sent
//! from in here, so no registry or cell lock is ever held while a peer's
//! outbound channel is touched.
//!
//! For a cross-cell move the batch is ordered: leave notifications, then enter
//! notifications, then the position refresh for the whole new neighborhood.

use std::sync::Arc;

use tracing::debug;

use crate::world::aoi::{GridId, Neighborhood};
use crate::world::entity::{Entity, EntityId, Position};
use crate::world::error::WorldResult;
use crate::world::notify::{ChatTarget, EntitySnapshot, Fanout, Notification};
use crate::world::registry::EntityRegistry;

/// Result of applying a position update
pub struct MoveOutcome {
    pub old_gid: GridId,
    pub new_gid: GridId,
    pub fanout: Fanout,
}

impl MoveOutcome {
    /// Whether the move changed the entity's cell
    #[inline]
    pub fn crossed_cells(&self) -> bool {
        self.old_gid != self.new_gid
    }
}

/// Cells in `a` that are not in `b`
fn difference(a: &Neighborhood, b: &Neighborhood) -> Neighborhood {
    a.iter().copied().filter(|gid| !b.contains(gid)).collect()
}

/// Other entities resident in any of `cells`
fn residents_of(registry: &EntityRegistry, cells: &[GridId], exclude: EntityId) -> WorldResult<Vec<Arc<Entity>>> {
    let mut residents = Vec::new();
    for &gid in cells {
        residents.extend(
            registry
                .entities_in_cell(gid)?
                .into_iter()
                .filter(|e| e.id != exclude),
        );
    }
    Ok(residents)
}

/// Mutual visibility loss between `mover` and every resident of `cells`
fn push_leaving(registry: &EntityRegistry, mover: &Arc<Entity>, cells: &[GridId], fanout: &mut Fanout) -> WorldResult<()> {
    for resident in residents_of(registry, cells, mover.id)? {
        fanout.push(&resident, Notification::EntityLeftView { id: mover.id });
        fanout.push(mover, Notification::EntityLeftView { id: resident.id });
    }
    Ok(())
}

/// Mutual visibility gain between `mover` and every resident of `cells`
fn push_entering(
    registry: &EntityRegistry,
    mover: &Arc<Entity>,
    position: Position,
    cells: &[GridId],
    fanout: &mut Fanout,
) -> WorldResult<()> {
    for resident in residents_of(registry, cells, mover.id)? {
        fanout.push(&resident, Notification::EntityEnteredView { id: mover.id, position });
        fanout.push(
            mover,
            Notification::EntityEnteredView {
                id: resident.id,
                position: resident.position(),
            },
        );
    }
    Ok(())
}

/// Fresh coordinates of `mover` to everyone in `gid`'s neighborhood, the mover included
fn push_refresh(
    registry: &EntityRegistry,
    mover: &Arc<Entity>,
    position: Position,
    gid: GridId,
    fanout: &mut Fanout,
) -> WorldResult<()> {
    for peer in registry.entities_around(gid)? {
        fanout.push(&peer, Notification::PositionSnapshot { id: mover.id, position });
    }
    Ok(())
}

/// Apply a position update and plan its notifications
pub fn apply_move(registry: &EntityRegistry, mover: &Arc<Entity>, position: Position) -> WorldResult<MoveOutcome> {
    let aoi = registry.aoi();
    let previous = mover.position();
    let old_gid = aoi.clamped_grid_id_for(previous.x, previous.z);
    let new_gid = aoi.clamped_grid_id_for(position.x, position.z);

    mover.set_position(position);

    let mut fanout = Fanout::new();
    if old_gid != new_gid {
        let old_hood = aoi.neighborhood_of(old_gid)?;
        let new_hood = aoi.neighborhood_of(new_gid)?;

        aoi.move_entity(mover.id, old_gid, new_gid)?;

        let leaving = difference(&old_hood, &new_hood);
        let entering = difference(&new_hood, &old_hood);
        debug!(
            "Entity {} crossed cell {} -> {} (leaving {:?}, entering {:?})",
            mover.id, old_gid, new_gid, leaving, entering
        );

        push_leaving(registry, mover, &leaving, &mut fanout)?;
        push_entering(registry, mover, position, &entering, &mut fanout)?;
    }
    push_refresh(registry, mover, position, new_gid, &mut fanout)?;

    Ok(MoveOutcome { old_gid, new_gid, fanout })
}

/// Register a freshly created entity and plan its arrival notifications
///
/// The new entity first learns its identity and spawn position, then every
/// cell of its spawn neighborhood is treated as entering. It finishes with one
/// batch snapshot of everything it can now see.
pub fn apply_spawn(registry: &EntityRegistry, entity: &Arc<Entity>) -> WorldResult<Fanout> {
    let position = entity.position();
    let mut fanout = Fanout::new();
    fanout.push(entity, Notification::IdentityAssigned { id: entity.id });
    fanout.push(entity, Notification::PositionSnapshot { id: entity.id, position });

    let gid = registry.register(entity.clone())?;
    let hood = registry.aoi().neighborhood_of(gid)?;
    push_entering(registry, entity, position, &hood, &mut fanout)?;
    fanout.push(entity, batch_around(registry, entity.id, gid)?);

    debug!("Entity {} spawned in cell {} at ({}, {})", entity.id, gid, position.x, position.z);
    Ok(fanout)
}

/// Remove an entity from its cell and the registry, planning leave notifications
///
/// Unknown ids are a hard failure here.
pub fn apply_despawn(registry: &EntityRegistry, id: EntityId) -> WorldResult<Fanout> {
    let entity = registry.get(id)?;
    let position = entity.position();
    let gid = registry.aoi().clamped_grid_id_for(position.x, position.z);

    let mut fanout = Fanout::new();
    for peer in registry.entities_around(gid)? {
        if peer.id != id {
            fanout.push(&peer, Notification::EntityLeftView { id });
        }
    }

    registry.aoi().remove_entity(id, gid)?;
    registry.unregister(id)?;

    debug!("Entity {} despawned from cell {}", id, gid);
    Ok(fanout)
}

/// One batch snapshot of every other entity in the requester's neighborhood
pub fn surroundings(registry: &EntityRegistry, id: EntityId) -> WorldResult<Fanout> {
    let entity = registry.get(id)?;
    let position = entity.position();
    let gid = registry.aoi().clamped_grid_id_for(position.x, position.z);

    let mut fanout = Fanout::with_capacity(1);
    fanout.push(&entity, batch_around(registry, id, gid)?);
    Ok(fanout)
}

/// Snapshot of every entity around `gid` except `viewer`
fn batch_around(registry: &EntityRegistry, viewer: EntityId, gid: GridId) -> WorldResult<Notification> {
    let entities: Vec<EntitySnapshot> = registry
        .entities_around(gid)?
        .into_iter()
        .filter(|peer| peer.id != viewer)
        .map(|peer| EntitySnapshot {
            id: peer.id,
            position: peer.position(),
        })
        .collect();
    Ok(Notification::BatchSnapshot { entities })
}

/// Route chat text: no spatial index involved
pub fn chat(registry: &EntityRegistry, from: EntityId, target: ChatTarget, text: &str) -> WorldResult<Fanout> {
    registry.get(from)?;

    let notification = Notification::Chat {
        from,
        target,
        text: text.to_string(),
    };

    let mut fanout = Fanout::new();
    match target {
        ChatTarget::World => {
            for peer in registry.all_entities() {
                fanout.push(&peer, notification.clone());
            }
        }
        ChatTarget::Entity(to) => {
            let peer = registry.get(to)?;
            fanout.push(&peer, notification);
        }
    }
    Ok(fanout)
}
