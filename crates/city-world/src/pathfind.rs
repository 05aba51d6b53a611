//! A* pathfinding over the tile grid.
//!
//! The search is 4-directional with a Manhattan heuristic and a binary-heap
//! open set. Expansion is bounded: a search that exhausts its budget fails
//! with [`WorldError::NoPath`] rather than stalling the tick worker.
//!
//! Waypoints are tile centres, except the last: when the exact goal tile is
//! reachable the final waypoint is the literal target pixel. An unreachable
//! goal tile (for example a door interior) degrades to any adjacent
//! passable tile; a fully enclosed goal fails with `NoPath`.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use crate::error::WorldError;
use crate::tilemap::TileMap;

/// Default cap on expanded tiles per search.
pub const DEFAULT_EXPANSION_BUDGET: usize = 4096;

/// 4-directional neighbour offsets in deterministic order.
const NEIGHBOURS: [(i64, i64); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// Find a waypoint path from `from` to `to` in pixel coordinates.
///
/// # Errors
///
/// Returns [`WorldError::NoPath`] when the goal is enclosed, the start is
/// inside a wall, or the expansion budget runs out.
pub fn find_path(
    map: &TileMap,
    from: (f64, f64),
    to: (f64, f64),
    budget: usize,
) -> Result<Vec<(f64, f64)>, WorldError> {
    let no_path = || WorldError::NoPath {
        from_x: from.0,
        from_y: from.1,
        to_x: to.0,
        to_y: to.1,
    };

    let start = map.tile_of(from.0, from.1);
    if map.is_tile_blocked(start.0, start.1) {
        return Err(no_path());
    }

    // Degrade a blocked goal tile to an adjacent passable one. The exact
    // pixel target only survives when the goal tile itself is passable.
    let requested_goal = map.tile_of(to.0, to.1);
    let (goal, exact) = if map.is_tile_blocked(requested_goal.0, requested_goal.1) {
        let adjacent = NEIGHBOURS.iter().find_map(|&(dx, dy)| {
            let candidate = (
                requested_goal.0.saturating_add(dx),
                requested_goal.1.saturating_add(dy),
            );
            (!map.is_tile_blocked(candidate.0, candidate.1)).then_some(candidate)
        });
        (adjacent.ok_or_else(no_path)?, false)
    } else {
        (requested_goal, true)
    };

    if start == goal {
        let last = if exact { to } else { map.tile_center(goal.0, goal.1) };
        return Ok(vec![last]);
    }

    // A* over tiles. Keys are (f, g, tile) so heap ordering is total and
    // deterministic for equal costs.
    let mut open: BinaryHeap<Reverse<(u64, u64, (i64, i64))>> = BinaryHeap::new();
    let mut g_score: BTreeMap<(i64, i64), u64> = BTreeMap::new();
    let mut came_from: BTreeMap<(i64, i64), (i64, i64)> = BTreeMap::new();

    g_score.insert(start, 0);
    open.push(Reverse((manhattan(start, goal), 0, start)));

    let mut expanded = 0_usize;
    let mut reached = false;

    while let Some(Reverse((_, g, tile))) = open.pop() {
        if tile == goal {
            reached = true;
            break;
        }

        // Skip stale heap entries.
        if g_score.get(&tile).copied().unwrap_or(u64::MAX) < g {
            continue;
        }

        expanded = expanded.saturating_add(1);
        if expanded > budget {
            return Err(no_path());
        }

        for &(dx, dy) in &NEIGHBOURS {
            let next = (tile.0.saturating_add(dx), tile.1.saturating_add(dy));
            if map.is_tile_blocked(next.0, next.1) {
                continue;
            }
            let tentative = g.saturating_add(1);
            if tentative < g_score.get(&next).copied().unwrap_or(u64::MAX) {
                g_score.insert(next, tentative);
                came_from.insert(next, tile);
                let f = tentative.saturating_add(manhattan(next, goal));
                open.push(Reverse((f, tentative, next)));
            }
        }
    }

    if !reached {
        return Err(no_path());
    }

    // Walk the parent chain back to the start.
    let mut tiles = vec![goal];
    let mut cursor = goal;
    while let Some(&parent) = came_from.get(&cursor) {
        if parent == start {
            break;
        }
        tiles.push(parent);
        cursor = parent;
    }
    tiles.reverse();

    let mut waypoints: Vec<(f64, f64)> = tiles
        .iter()
        .map(|&(tx, ty)| map.tile_center(tx, ty))
        .collect();
    if exact {
        if let Some(last) = waypoints.last_mut() {
            *last = to;
        }
    }

    Ok(waypoints)
}

/// Manhattan distance between two tiles.
fn manhattan(a: (i64, i64), b: (i64, i64)) -> u64 {
    let dx = a.0.abs_diff(b.0);
    let dy = a.1.abs_diff(b.1);
    dx.saturating_add(dy)
}
