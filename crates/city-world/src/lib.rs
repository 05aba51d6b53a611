//! Geography for the City simulation: the static tile map, collision
//! resolution, A* pathfinding, and forageable nodes.
//!
//! Everything in this crate is synchronous and free of I/O; the tick
//! worker calls into it directly. The map itself is immutable during a
//! run -- only forageable node state changes, and that lives in world
//! state rather than the map.
//!
//! # Modules
//!
//! - [`tilemap`] -- grids, buildings, doors, spatial queries
//! - [`collision`] -- three-step wall-slide movement resolution
//! - [`pathfind`] -- budgeted 4-directional A*
//! - [`forage`] -- berry bushes and springs with regrowth
//! - [`starting_map`] -- the built-in development town

pub mod collision;
pub mod error;
pub mod forage;
pub mod pathfind;
pub mod starting_map;
pub mod tilemap;

pub use collision::{resolve_movement, MovementResolution};
pub use error::WorldError;
pub use forage::ForageableNode;
pub use pathfind::{find_path, DEFAULT_EXPANSION_BUDGET};
pub use starting_map::{create_starting_map, default_forageables, StartingBuildingIds};
pub use tilemap::{BuildingPlacement, Door, TileMap, TileMapData, TileRect};
