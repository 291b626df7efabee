use crate::world::aoi::GridId;
use crate::world::entity::EntityId;

/// Errors raised by the spatial index, the registry and the entity lifecycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error("Invalid world configuration: {0}")]
    InvalidConfig(String),
    #[error("Coordinates ({x}, {z}) are outside the world region")]
    InvalidCoordinates { x: f32, z: f32 },
    #[error("Unknown cell: {0}")]
    UnknownCell(GridId),
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),
    #[error("Entity {0} is already registered")]
    DuplicateIdentity(EntityId),
    #[error("Entity id space exhausted")]
    IdsExhausted,
}

pub type WorldResult<T> = Result<T, WorldError>;
