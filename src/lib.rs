//! AOI World Server Library
//!
//! Spatial visibility core for a multiplayer world server: a rectangular
//! region is split into cells, each entity sees the 3x3 block of cells around
//! its own, and every spawn, move and despawn is turned into the minimal set
//! of enter/leave/refresh notifications.

pub mod config;
pub mod metrics;
pub mod net;
pub mod world;
