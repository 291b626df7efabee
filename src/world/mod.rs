//! Spatial visibility core
//!
//! AOI cell partition, entity registry and the visibility-transition protocol
//! that decides who must hear about an entity appearing, moving or leaving.

pub mod aoi;
pub mod constants;
pub mod entity;
pub mod error;
pub mod grid;
pub mod manager;
pub mod notify;
pub mod registry;
pub mod visibility;

pub use aoi::{AoiManager, AoiRegion, GridId, Neighborhood};
pub use entity::{Entity, EntityId, Position, SpawnConfig};
pub use error::{WorldError, WorldResult};
pub use manager::World;
pub use notify::{ChannelOutbound, ChatTarget, EntitySnapshot, Fanout, Notification, Outbound};
