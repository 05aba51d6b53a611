//! Default starting map for the City.
//!
//! A 64x48-tile town with the eight civic buildings, perimeter walls for
//! each footprint with door gaps, the station platform spawn point, and a
//! handful of forageable nodes along the green edges. Production runs load
//! map data from the external map tool; this map backs development runs
//! and tests.

use city_types::{BuildingId, BuildingRole, Direction, ForageKind};

use crate::error::WorldError;
use crate::forage::ForageableNode;
use crate::tilemap::{BuildingPlacement, Door, TileMap, TileMapData, TileRect};

/// Map width in tiles.
const MAP_WIDTH: u32 = 64;

/// Map height in tiles.
const MAP_HEIGHT: u32 = 48;

/// Tile edge length in pixels.
const TILE_SIZE: u32 = 32;

/// Identifiers for the starting buildings, returned alongside the map so
/// callers can reference specific buildings for job sites and spawning.
#[derive(Debug, Clone, Copy)]
pub struct StartingBuildingIds {
    /// Train station (north-west); the platform is the spawn point.
    pub station: BuildingId,
    /// General store on the main street.
    pub shop: BuildingId,
    /// Bank, where UBI is collected.
    pub bank: BuildingId,
    /// City hall, home of petitions.
    pub hall: BuildingId,
    /// Public toilet block.
    pub toilet: BuildingId,
    /// Mortuary at the south edge.
    pub mortuary: BuildingId,
    /// Police station.
    pub police: BuildingId,
    /// Information kiosk by the station.
    pub info: BuildingId,
}

/// Helper to build a placement with one door and optional zones.
fn place(
    id: BuildingId,
    role: BuildingRole,
    bbox: TileRect,
    door: Door,
    zones: Vec<(&str, TileRect)>,
) -> BuildingPlacement {
    BuildingPlacement {
        id,
        role,
        bbox,
        doors: vec![door],
        zones: zones
            .into_iter()
            .map(|(verb, rect)| (verb.to_owned(), rect))
            .collect(),
    }
}

/// Write a building's perimeter walls into the obstacle grid, leaving the
/// door tiles open.
fn wall_in(
    obstacles: &mut [u16],
    bbox: TileRect,
    doors: &[Door],
) {
    let is_door = |tx: u32, ty: u32| doors.iter().any(|d| d.tx == tx && d.ty == ty);
    let right = bbox.x.saturating_add(bbox.w).saturating_sub(1);
    let bottom = bbox.y.saturating_add(bbox.h).saturating_sub(1);

    for tx in bbox.x..=right {
        for ty in bbox.y..=bottom {
            let on_edge = tx == bbox.x || tx == right || ty == bbox.y || ty == bottom;
            if on_edge && !is_door(tx, ty) {
                let index = (ty as usize)
                    .saturating_mul(MAP_WIDTH as usize)
                    .saturating_add(tx as usize);
                if let Some(cell) = obstacles.get_mut(index) {
                    *cell = 1;
                }
            }
        }
    }
}

/// Build the default starting map.
///
/// # Errors
///
/// Returns [`WorldError::InvalidMapData`] if the construction produces an
/// inconsistent map (a programming error rather than a runtime condition).
pub fn create_starting_map() -> Result<(TileMap, StartingBuildingIds), WorldError> {
    let ids = StartingBuildingIds {
        station: BuildingId::new(),
        shop: BuildingId::new(),
        bank: BuildingId::new(),
        hall: BuildingId::new(),
        toilet: BuildingId::new(),
        mortuary: BuildingId::new(),
        police: BuildingId::new(),
        info: BuildingId::new(),
    };

    let buildings = vec![
        // Station along the north edge; door opens south onto the platform.
        place(
            ids.station,
            BuildingRole::Station,
            TileRect { x: 4, y: 2, w: 10, h: 5 },
            Door { tx: 9, ty: 6, facing: Direction::South },
            Vec::new(),
        ),
        place(
            ids.info,
            BuildingRole::Info,
            TileRect { x: 16, y: 2, w: 4, h: 4 },
            Door { tx: 17, ty: 5, facing: Direction::South },
            Vec::new(),
        ),
        // Main street, middle band.
        place(
            ids.shop,
            BuildingRole::Shop,
            TileRect { x: 8, y: 14, w: 7, h: 6 },
            Door { tx: 11, ty: 14, facing: Direction::North },
            vec![("buy", TileRect { x: 9, y: 16, w: 5, h: 3 })],
        ),
        place(
            ids.bank,
            BuildingRole::Bank,
            TileRect { x: 20, y: 14, w: 7, h: 6 },
            Door { tx: 23, ty: 14, facing: Direction::North },
            vec![("collect_ubi", TileRect { x: 21, y: 16, w: 5, h: 3 })],
        ),
        place(
            ids.hall,
            BuildingRole::Hall,
            TileRect { x: 32, y: 14, w: 9, h: 7 },
            Door { tx: 36, ty: 14, facing: Direction::North },
            Vec::new(),
        ),
        place(
            ids.toilet,
            BuildingRole::Toilet,
            TileRect { x: 46, y: 14, w: 4, h: 4 },
            Door { tx: 47, ty: 14, facing: Direction::North },
            Vec::new(),
        ),
        // South band.
        place(
            ids.police,
            BuildingRole::Police,
            TileRect { x: 14, y: 30, w: 8, h: 6 },
            Door { tx: 17, ty: 30, facing: Direction::North },
            Vec::new(),
        ),
        place(
            ids.mortuary,
            BuildingRole::Mortuary,
            TileRect { x: 30, y: 30, w: 7, h: 6 },
            Door { tx: 33, ty: 30, facing: Direction::North },
            Vec::new(),
        ),
    ];

    let cell_count = (MAP_WIDTH as usize).saturating_mul(MAP_HEIGHT as usize);
    let ground = vec![0_u16; cell_count];
    let mut obstacles = vec![0_u16; cell_count];
    for building in &buildings {
        wall_in(&mut obstacles, building.bbox, &building.doors);
    }

    // Platform tile just south of the station door.
    let spawn_x = 9.0 * f64::from(TILE_SIZE) + f64::from(TILE_SIZE) / 2.0;
    let spawn_y = 8.0 * f64::from(TILE_SIZE) + f64::from(TILE_SIZE) / 2.0;

    let map = TileMap::from_data(TileMapData {
        width: MAP_WIDTH,
        height: MAP_HEIGHT,
        tile_size: TILE_SIZE,
        ground,
        obstacles,
        buildings,
        spawn_x,
        spawn_y,
    })?;

    Ok((map, ids))
}

/// Forageable nodes for the starting map: berry bushes along the eastern
/// green and fresh springs near the south-west corner.
pub fn default_forageables() -> Vec<ForageableNode> {
    vec![
        ForageableNode::new(ForageKind::BerryBush, 1800.0, 320.0, 5, 1800.0),
        ForageableNode::new(ForageKind::BerryBush, 1860.0, 420.0, 5, 1800.0),
        ForageableNode::new(ForageKind::BerryBush, 1780.0, 900.0, 4, 1800.0),
        ForageableNode::new(ForageKind::FreshSpring, 200.0, 1300.0, 8, 900.0),
        ForageableNode::new(ForageKind::FreshSpring, 320.0, 1380.0, 8, 900.0),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn starting_map_builds() {
        let (map, ids) = create_starting_map().unwrap();
        assert_eq!(map.width(), MAP_WIDTH);
        assert_eq!(map.height(), MAP_HEIGHT);
        assert!(map.building(ids.shop).is_some());
        assert!(map.building(ids.mortuary).is_some());
    }

    #[test]
    fn spawn_point_is_passable() {
        let (map, _) = create_starting_map().unwrap();
        let (sx, sy) = map.spawn_point();
        assert!(!map.is_position_blocked(sx, sy, 14.0));
    }

    #[test]
    fn doors_are_open_and_walls_closed() {
        let (map, ids) = create_starting_map().unwrap();
        let shop = map.building(ids.shop).unwrap();
        let door = shop.doors.first().copied().unwrap();
        assert!(!map.is_tile_blocked(i64::from(door.tx), i64::from(door.ty)));
        // A corner of the footprint is walled.
        assert!(map.is_tile_blocked(
            i64::from(shop.bbox.x),
            i64::from(shop.bbox.y)
        ));
    }

    #[test]
    fn every_role_is_present() {
        let (map, _) = create_starting_map().unwrap();
        for role in [
            BuildingRole::Station,
            BuildingRole::Shop,
            BuildingRole::Bank,
            BuildingRole::Hall,
            BuildingRole::Toilet,
            BuildingRole::Mortuary,
            BuildingRole::Police,
            BuildingRole::Info,
        ] {
            assert!(map.building_by_role(role).is_some(), "missing {role:?}");
        }
    }

    #[test]
    fn forageables_sit_outside_buildings() {
        let (map, _) = create_starting_map().unwrap();
        for node in default_forageables() {
            assert!(!map.is_position_blocked(node.x, node.y, 1.0));
        }
    }
}
