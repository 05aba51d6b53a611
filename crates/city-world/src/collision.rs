//! Movement resolution against the obstacle grid.
//!
//! The resolver implements the classic three-step wall slide: try the full
//! move; if the destination is blocked, try moving along x only, then along
//! y only; otherwise stay put. The surviving axis preserves momentum along
//! walls, which is what keeps diagonal approaches from sticking.

use crate::tilemap::TileMap;

/// Result of resolving one movement step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementResolution {
    /// Resolved x in pixels.
    pub x: f64,
    /// Resolved y in pixels.
    pub y: f64,
    /// Whether any axis of the requested move was blocked.
    pub blocked: bool,
}

/// Resolve a movement from `(from_x, from_y)` towards `(to_x, to_y)` for a
/// hitbox with half-extent `hitbox_half`.
///
/// The resolution never leaves the mover inside a wall: if even the
/// single-axis moves are blocked the position is unchanged.
pub fn resolve_movement(
    map: &TileMap,
    from_x: f64,
    from_y: f64,
    to_x: f64,
    to_y: f64,
    hitbox_half: f64,
) -> MovementResolution {
    // Full move first.
    if !map.is_position_blocked(to_x, to_y, hitbox_half) {
        return MovementResolution {
            x: to_x,
            y: to_y,
            blocked: false,
        };
    }

    // Slide along x, keeping y.
    if !map.is_position_blocked(to_x, from_y, hitbox_half) {
        return MovementResolution {
            x: to_x,
            y: from_y,
            blocked: true,
        };
    }

    // Slide along y, keeping x.
    if !map.is_position_blocked(from_x, to_y, hitbox_half) {
        return MovementResolution {
            x: from_x,
            y: to_y,
            blocked: true,
        };
    }

    // Fully blocked: stay.
    MovementResolution {
        x: from_x,
        y: from_y,
        blocked: true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tilemap::TileMapData;

    /// An 8x8 open map with a vertical wall on tile column 4.
    fn walled_map() -> TileMap {
        let mut obstacles = vec![0_u16; 64];
        for row in 0..8_usize {
            if let Some(cell) = obstacles.get_mut(row * 8 + 4) {
                *cell = 1;
            }
        }
        TileMap::from_data(TileMapData {
            width: 8,
            height: 8,
            tile_size: 32,
            ground: vec![0; 64],
            obstacles,
            buildings: Vec::new(),
            spawn_x: 16.0,
            spawn_y: 16.0,
        })
        .unwrap()
    }

    #[test]
    fn open_move_is_unblocked() {
        let map = walled_map();
        let res = resolve_movement(&map, 48.0, 48.0, 80.0, 80.0, 14.0);
        assert!(!res.blocked);
        assert!((res.x - 80.0).abs() < f64::EPSILON);
        assert!((res.y - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn diagonal_into_wall_slides_along_y() {
        let map = walled_map();
        // Wall column 4 covers x in [128, 160). Moving diagonally into it
        // keeps the y component.
        let res = resolve_movement(&map, 100.0, 100.0, 130.0, 130.0, 14.0);
        assert!(res.blocked);
        assert!((res.x - 100.0).abs() < f64::EPSILON);
        assert!((res.y - 130.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fully_blocked_stays_put() {
        let map = walled_map();
        // Target deep inside the wall with both axes blocked by a corner
        // hug: x move blocked by the wall, y move blocked by the map edge.
        let res = resolve_movement(&map, 110.0, 14.0, 140.0, -10.0, 14.0);
        assert!(res.blocked);
        assert!((res.x - 110.0).abs() < f64::EPSILON);
        assert!((res.y - 14.0).abs() < f64::EPSILON);
    }

    #[test]
    fn head_on_wall_preserves_free_axis() {
        let map = walled_map();
        // Straight east into the wall: x blocked, y unchanged -> stays at
        // the same position but reports blocked.
        let res = resolve_movement(&map, 110.0, 100.0, 140.0, 100.0, 14.0);
        assert!(res.blocked);
        assert!((res.x - 110.0).abs() < f64::EPSILON);
        assert!((res.y - 100.0).abs() < f64::EPSILON);
    }
}
