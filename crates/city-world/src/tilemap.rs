//! The static tile map: grids, buildings, doors, and spatial queries.
//!
//! The map is immutable for the lifetime of a run. It is produced by an
//! external map-data tool and loaded from JSON, or built in-process by
//! [`crate::starting_map`] for development and tests.
//!
//! Two row-major grids cover the world: a ground grid (cosmetic tile
//! types) and an obstacle grid where `0` means passable and any other
//! value blocks movement. Buildings sit on top of the grids as typed
//! placements with doors, interior rectangles, and per-verb interaction
//! zones.

use std::collections::BTreeMap;

use city_types::{BuildingId, BuildingRole, Direction};
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// An axis-aligned rectangle in tile coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    /// Left tile column.
    pub x: u32,
    /// Top tile row.
    pub y: u32,
    /// Width in tiles (at least 1).
    pub w: u32,
    /// Height in tiles (at least 1).
    pub h: u32,
}

impl TileRect {
    /// Whether the rect contains the tile `(tx, ty)`.
    pub const fn contains(&self, tx: u32, ty: u32) -> bool {
        tx >= self.x
            && ty >= self.y
            && tx < self.x.saturating_add(self.w)
            && ty < self.y.saturating_add(self.h)
    }
}

/// A door in a building's wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Door {
    /// Door tile x.
    pub tx: u32,
    /// Door tile y.
    pub ty: u32,
    /// Which way the door faces (the outside direction).
    pub facing: Direction,
}

/// A building placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingPlacement {
    /// Stable building id.
    pub id: BuildingId,
    /// Civic role.
    pub role: BuildingRole,
    /// Footprint in tile coordinates.
    pub bbox: TileRect,
    /// Doors through the footprint walls. Every building has at least one.
    pub doors: Vec<Door>,
    /// Interaction zones keyed by action verb (`buy`, `use_toilet`, ...).
    /// A verb with no zone entry is legal anywhere inside the building.
    #[serde(default)]
    pub zones: BTreeMap<String, TileRect>,
}

impl BuildingPlacement {
    /// Whether the pixel position lies inside the building footprint.
    pub fn contains_pixel(&self, x: f64, y: f64, tile_size: u32) -> bool {
        let ts = f64::from(tile_size);
        let left = f64::from(self.bbox.x) * ts;
        let top = f64::from(self.bbox.y) * ts;
        let right = f64::from(self.bbox.x.saturating_add(self.bbox.w)) * ts;
        let bottom = f64::from(self.bbox.y.saturating_add(self.bbox.h)) * ts;
        x >= left && x < right && y >= top && y < bottom
    }
}

/// Raw map data as produced by the external map tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMapData {
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Row-major ground tile types.
    pub ground: Vec<u16>,
    /// Row-major obstacle types; `0` is passable.
    pub obstacles: Vec<u16>,
    /// Building placements.
    pub buildings: Vec<BuildingPlacement>,
    /// Spawn point x in pixels (the station platform).
    pub spawn_x: f64,
    /// Spawn point y in pixels.
    pub spawn_y: f64,
}

/// The validated, query-ready tile map.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: u32,
    height: u32,
    tile_size: u32,
    ground: Vec<u16>,
    obstacles: Vec<u16>,
    buildings: BTreeMap<BuildingId, BuildingPlacement>,
    spawn_x: f64,
    spawn_y: f64,
}

impl TileMap {
    /// Validate raw map data and build the queryable map.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidMapData`] when grid lengths do not
    /// match the declared dimensions, a building footprint leaves the map,
    /// or a building has no doors.
    pub fn from_data(data: TileMapData) -> Result<Self, WorldError> {
        let expected = (data.width as usize)
            .checked_mul(data.height as usize)
            .ok_or(WorldError::ArithmeticOverflow)?;

        if data.width == 0 || data.height == 0 || data.tile_size == 0 {
            return Err(WorldError::InvalidMapData {
                reason: String::from("map dimensions must be nonzero"),
            });
        }
        if data.ground.len() != expected {
            return Err(WorldError::InvalidMapData {
                reason: format!(
                    "ground grid has {} cells, expected {expected}",
                    data.ground.len()
                ),
            });
        }
        if data.obstacles.len() != expected {
            return Err(WorldError::InvalidMapData {
                reason: format!(
                    "obstacle grid has {} cells, expected {expected}",
                    data.obstacles.len()
                ),
            });
        }

        let mut buildings = BTreeMap::new();
        for building in data.buildings {
            let right = building.bbox.x.saturating_add(building.bbox.w);
            let bottom = building.bbox.y.saturating_add(building.bbox.h);
            if right > data.width || bottom > data.height {
                return Err(WorldError::InvalidMapData {
                    reason: format!("building {} footprint leaves the map", building.id),
                });
            }
            if building.doors.is_empty() {
                return Err(WorldError::InvalidMapData {
                    reason: format!("building {} has no doors", building.id),
                });
            }
            buildings.insert(building.id, building);
        }

        Ok(Self {
            width: data.width,
            height: data.height,
            tile_size: data.tile_size,
            ground: data.ground,
            obstacles: data.obstacles,
            buildings,
            spawn_x: data.spawn_x,
            spawn_y: data.spawn_y,
        })
    }

    /// Map width in tiles.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Map height in tiles.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Tile edge length in pixels.
    pub const fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Map width in pixels.
    pub fn pixel_width(&self) -> f64 {
        f64::from(self.width) * f64::from(self.tile_size)
    }

    /// Map height in pixels.
    pub fn pixel_height(&self) -> f64 {
        f64::from(self.height) * f64::from(self.tile_size)
    }

    /// The spawn point (station platform) in pixels.
    pub const fn spawn_point(&self) -> (f64, f64) {
        (self.spawn_x, self.spawn_y)
    }

    /// Ground tile type at `(tx, ty)`, or `None` outside the map.
    pub fn ground_at(&self, tx: u32, ty: u32) -> Option<u16> {
        self.grid_index(tx, ty)
            .and_then(|i| self.ground.get(i).copied())
    }

    /// Whether the tile is blocked. Tiles outside the map always block.
    pub fn is_tile_blocked(&self, tx: i64, ty: i64) -> bool {
        if tx < 0 || ty < 0 {
            return true;
        }
        let (Ok(utx), Ok(uty)) = (u32::try_from(tx), u32::try_from(ty)) else {
            return true;
        };
        if utx >= self.width || uty >= self.height {
            return true;
        }
        self.grid_index(utx, uty)
            .and_then(|i| self.obstacles.get(i).copied())
            .is_none_or(|v| v != 0)
    }

    /// Whether a hitbox centred at `(x, y)` with half-extent `hitbox_half`
    /// overlaps any blocked tile or leaves the map.
    ///
    /// The circle is approximated by its bounding square's four corners,
    /// which is exact enough at tile granularity.
    pub fn is_position_blocked(&self, x: f64, y: f64, hitbox_half: f64) -> bool {
        let corners = [
            (x - hitbox_half, y - hitbox_half),
            (x + hitbox_half, y - hitbox_half),
            (x - hitbox_half, y + hitbox_half),
            (x + hitbox_half, y + hitbox_half),
        ];
        corners.iter().any(|&(cx, cy)| {
            let (tx, ty) = self.tile_of(cx, cy);
            self.is_tile_blocked(tx, ty)
        })
    }

    /// The tile containing the pixel `(x, y)`.
    pub fn tile_of(&self, x: f64, y: f64) -> (i64, i64) {
        let ts = f64::from(self.tile_size);
        (
            (x / ts).floor() as i64,
            (y / ts).floor() as i64,
        )
    }

    /// The pixel centre of the tile `(tx, ty)`.
    pub fn tile_center(&self, tx: i64, ty: i64) -> (f64, f64) {
        let ts = f64::from(self.tile_size);
        let half = ts / 2.0;
        ((tx as f64).mul_add(ts, half), (ty as f64).mul_add(ts, half))
    }

    /// Look up a building by id.
    pub fn building(&self, id: BuildingId) -> Option<&BuildingPlacement> {
        self.buildings.get(&id)
    }

    /// All buildings in id order.
    pub fn buildings(&self) -> impl Iterator<Item = &BuildingPlacement> {
        self.buildings.values()
    }

    /// The first building with the given role, if any.
    pub fn building_by_role(&self, role: BuildingRole) -> Option<&BuildingPlacement> {
        self.buildings.values().find(|b| b.role == role)
    }

    /// The nearest door of `building` to the pixel `(x, y)`, with its
    /// pixel centre and distance.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::BuildingNotFound`] for an unknown building.
    pub fn nearest_door(
        &self,
        building: BuildingId,
        x: f64,
        y: f64,
    ) -> Result<(Door, f64, f64, f64), WorldError> {
        let placement = self
            .buildings
            .get(&building)
            .ok_or(WorldError::BuildingNotFound(building))?;

        let mut best: Option<(Door, f64, f64, f64)> = None;
        for door in &placement.doors {
            let (dx, dy) = self.tile_center(i64::from(door.tx), i64::from(door.ty));
            let dist = (dx - x).hypot(dy - y);
            if best.as_ref().is_none_or(|(_, _, _, d)| dist < *d) {
                best = Some((*door, dx, dy, dist));
            }
        }
        best.ok_or(WorldError::BuildingNotFound(building))
    }

    /// The pixel centre of the outside tile adjacent to a door, i.e. where
    /// a resident stands after exiting through it.
    pub fn door_outside_position(&self, door: Door) -> (f64, f64) {
        let (tx, ty) = (i64::from(door.tx), i64::from(door.ty));
        let (otx, oty) = match door.facing {
            Direction::North => (tx, ty.saturating_sub(1)),
            Direction::South => (tx, ty.saturating_add(1)),
            Direction::East => (tx.saturating_add(1), ty),
            Direction::West => (tx.saturating_sub(1), ty),
        };
        self.tile_center(otx, oty)
    }

    /// Whether a pixel position lies inside the named interaction zone of
    /// a building. A building without a zone for `verb` accepts the verb
    /// anywhere inside its footprint.
    pub fn in_interaction_zone(
        &self,
        building: BuildingId,
        verb: &str,
        x: f64,
        y: f64,
    ) -> bool {
        let Some(placement) = self.buildings.get(&building) else {
            return false;
        };
        match placement.zones.get(verb) {
            Some(zone) => {
                let (tx, ty) = self.tile_of(x, y);
                let (Ok(utx), Ok(uty)) = (u32::try_from(tx), u32::try_from(ty)) else {
                    return false;
                };
                zone.contains(utx, uty)
            }
            None => placement.contains_pixel(x, y, self.tile_size),
        }
    }

    /// Whether the straight segment between two points crosses any blocked
    /// tile, sampled at quarter-tile steps. Used for sound attenuation;
    /// sight is never wall-blocked in this top-down world.
    pub fn segment_crosses_wall(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> bool {
        let length = (x1 - x0).hypot(y1 - y0);
        if length <= f64::EPSILON {
            return false;
        }
        let step = f64::from(self.tile_size) / 4.0;
        let samples = (length / step).ceil().max(1.0) as u64;
        for i in 0..=samples {
            let t = (i as f64) / (samples as f64);
            let sx = (x1 - x0).mul_add(t, x0);
            let sy = (y1 - y0).mul_add(t, y0);
            let (tx, ty) = self.tile_of(sx, sy);
            if self.is_tile_blocked(tx, ty) {
                return true;
            }
        }
        false
    }

    /// Row-major grid index of an in-bounds tile.
    fn grid_index(&self, tx: u32, ty: u32) -> Option<usize> {
        if tx >= self.width || ty >= self.height {
            return None;
        }
        (ty as usize)
            .checked_mul(self.width as usize)
            .and_then(|row| row.checked_add(tx as usize))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A 4x4 map with one blocked tile at (2, 1).
    fn small_map() -> TileMap {
        let mut obstacles = vec![0_u16; 16];
        if let Some(cell) = obstacles.get_mut(6) {
            *cell = 1;
        }
        TileMap::from_data(TileMapData {
            width: 4,
            height: 4,
            tile_size: 32,
            ground: vec![0; 16],
            obstacles,
            buildings: Vec::new(),
            spawn_x: 16.0,
            spawn_y: 16.0,
        })
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_grids() {
        let result = TileMap::from_data(TileMapData {
            width: 4,
            height: 4,
            tile_size: 32,
            ground: vec![0; 15],
            obstacles: vec![0; 16],
            buildings: Vec::new(),
            spawn_x: 0.0,
            spawn_y: 0.0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn out_of_bounds_blocks() {
        let map = small_map();
        assert!(map.is_tile_blocked(-1, 0));
        assert!(map.is_tile_blocked(0, -1));
        assert!(map.is_tile_blocked(4, 0));
        assert!(map.is_tile_blocked(0, 4));
    }

    #[test]
    fn obstacle_tile_blocks() {
        let map = small_map();
        assert!(map.is_tile_blocked(2, 1));
        assert!(!map.is_tile_blocked(1, 1));
    }

    #[test]
    fn position_block_accounts_for_hitbox() {
        let map = small_map();
        // Centre of tile (1, 1) is (48, 48); tile (2, 1) starting at x=64
        // is blocked. A 16-px half-extent hitbox at x=50 reaches 66.
        assert!(!map.is_position_blocked(48.0, 48.0, 15.0));
        assert!(map.is_position_blocked(50.0, 48.0, 16.0));
    }

    #[test]
    fn tile_center_roundtrip() {
        let map = small_map();
        let (cx, cy) = map.tile_center(3, 2);
        assert!((cx - 112.0).abs() < f64::EPSILON);
        assert!((cy - 80.0).abs() < f64::EPSILON);
        assert_eq!(map.tile_of(cx, cy), (3, 2));
    }

    #[test]
    fn segment_crossing_detects_wall() {
        let map = small_map();
        // Horizontal line through row 1 crosses the blocked tile (2, 1).
        assert!(map.segment_crosses_wall(16.0, 48.0, 112.0, 48.0));
        // Line through row 3 stays clear.
        assert!(!map.segment_crosses_wall(16.0, 112.0, 112.0, 112.0));
    }

    #[test]
    fn building_must_have_doors() {
        let building = BuildingPlacement {
            id: BuildingId::new(),
            role: BuildingRole::Shop,
            bbox: TileRect { x: 0, y: 0, w: 2, h: 2 },
            doors: Vec::new(),
            zones: BTreeMap::new(),
        };
        let result = TileMap::from_data(TileMapData {
            width: 4,
            height: 4,
            tile_size: 32,
            ground: vec![0; 16],
            obstacles: vec![0; 16],
            buildings: vec![building],
            spawn_x: 0.0,
            spawn_y: 0.0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn map_data_parses_from_producer_json() {
        let raw = r#"{
            "width": 2, "height": 2, "tile_size": 32,
            "ground": [0, 0, 0, 0],
            "obstacles": [0, 1, 0, 0],
            "buildings": [],
            "spawn_x": 16.0, "spawn_y": 16.0
        }"#;
        let data: TileMapData = serde_json::from_str(raw).unwrap();
        let map = TileMap::from_data(data).unwrap();
        assert!(map.is_tile_blocked(1, 0));
        assert!(!map.is_tile_blocked(0, 0));
    }

    #[test]
    fn door_outside_position_faces_out() {
        let map = small_map();
        let door = Door {
            tx: 1,
            ty: 1,
            facing: Direction::South,
        };
        let (x, y) = map.door_outside_position(door);
        assert_eq!(map.tile_of(x, y), (1, 2));
    }
}
