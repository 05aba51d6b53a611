//! World bootstrap: map loading and reconstitution from the repository.
//!
//! The repository is authoritative across restarts. At startup every
//! resident row is rebuilt into a live entity: spawned residents resume
//! in place, registered-but-unspawned residents rejoin the train queue,
//! and the dead stay dead (their identity rows persist for the read
//! surface and leaderboard).

use city_core::WorldState;
use city_db::ResidentRow;
use city_residents::{default_jobs, default_laws, JobBoard, Resident};
use city_types::{
    Appearance, BuildingRole, Employment, ItemKind, InventoryEntry, JobId, ResidentId,
    ResidentKind, ResidentStatus,
};
use city_world::{create_starting_map, default_forageables, TileMap, TileMapData};
use tracing::{info, warn};

use crate::error::EngineSetupError;

/// Load the tile map: from the configured JSON path, or the built-in
/// starting town when no path is configured.
pub fn load_map(map_path: &str) -> Result<TileMap, EngineSetupError> {
    if map_path.is_empty() {
        let (map, _) = create_starting_map().map_err(|e| EngineSetupError::Map {
            message: e.to_string(),
        })?;
        info!("using the built-in starting map");
        return Ok(map);
    }

    let contents =
        std::fs::read_to_string(map_path).map_err(|e| EngineSetupError::Map {
            message: format!("failed to read {map_path}: {e}"),
        })?;
    let data: TileMapData =
        serde_json::from_str(&contents).map_err(|e| EngineSetupError::Map {
            message: format!("failed to parse {map_path}: {e}"),
        })?;
    let map = TileMap::from_data(data).map_err(|e| EngineSetupError::Map {
        message: e.to_string(),
    })?;
    info!(map_path, "map data loaded");
    Ok(map)
}

/// Capture raw map data for the gateway's `GET /map` before the map is
/// consumed by world state.
pub fn load_map_data(map_path: &str) -> Result<TileMapData, EngineSetupError> {
    if map_path.is_empty() {
        // Rebuild the starting map's raw form for serving.
        let (map, _) = create_starting_map().map_err(|e| EngineSetupError::Map {
            message: e.to_string(),
        })?;
        return Ok(raw_map_data(&map));
    }
    let contents =
        std::fs::read_to_string(map_path).map_err(|e| EngineSetupError::Map {
            message: format!("failed to read {map_path}: {e}"),
        })?;
    serde_json::from_str(&contents).map_err(|e| EngineSetupError::Map {
        message: format!("failed to parse {map_path}: {e}"),
    })
}

/// Project a validated map back to its serde form.
fn raw_map_data(map: &TileMap) -> TileMapData {
    let (spawn_x, spawn_y) = map.spawn_point();
    TileMapData {
        width: map.width(),
        height: map.height(),
        tile_size: map.tile_size(),
        ground: (0..map.height())
            .flat_map(|ty| {
                (0..map.width()).map(move |tx| (tx, ty))
            })
            .map(|(tx, ty)| map.ground_at(tx, ty).unwrap_or(0))
            .collect(),
        obstacles: (0..map.height())
            .flat_map(|ty| {
                (0..map.width()).map(move |tx| (tx, ty))
            })
            .map(|(tx, ty)| {
                u16::from(map.is_tile_blocked(i64::from(tx), i64::from(ty)))
            })
            .collect(),
        buildings: map.buildings().cloned().collect(),
        spawn_x,
        spawn_y,
    }
}

/// Build a world over the map with the standard civic tables.
///
/// # Errors
///
/// Returns [`EngineSetupError::Map`] when a required building role is
/// missing from the map.
pub fn build_world(map: TileMap, train_interval: f64) -> Result<WorldState, EngineSetupError> {
    let role_id = |role: BuildingRole| {
        map.building_by_role(role)
            .map(|b| b.id)
            .ok_or_else(|| EngineSetupError::Map {
                message: format!("map has no {role:?} building"),
            })
    };
    let shop = role_id(BuildingRole::Shop)?;
    let hall = role_id(BuildingRole::Hall)?;
    let police = role_id(BuildingRole::Police)?;
    let mortuary = role_id(BuildingRole::Mortuary)?;

    let jobs = JobBoard::with_jobs(default_jobs(shop, hall, police, mortuary));
    Ok(WorldState::new(
        map,
        default_forageables(),
        jobs,
        default_laws(),
        train_interval,
    ))
}

/// Reconstitute persisted residents into the world.
///
/// Returns how many residents were restored live and how many rejoined
/// the train queue.
pub fn restore_residents(world: &mut WorldState, rows: Vec<ResidentRow>) -> (usize, usize) {
    let mut live = 0_usize;
    let mut queued = 0_usize;

    for row in rows {
        let resident = match rebuild_resident(&row) {
            Some(resident) => resident,
            None => {
                warn!(passport = row.passport, "skipping unreadable resident row");
                continue;
            }
        };
        let id = resident.id;
        let spawned = resident.arrived_at.is_some();
        let alive = resident.status == ResidentStatus::Alive;

        if let Some(job) = row.job_id {
            world.jobs.assignments.insert(id, JobId::from(job));
        }
        world.residents.insert(id, resident);

        if alive && !spawned {
            world.train_queue.push_back(id);
            queued = queued.saturating_add(1);
        } else if alive {
            live = live.saturating_add(1);
        }
    }

    (live, queued)
}

/// Rebuild one resident entity from its durable row.
fn rebuild_resident(row: &ResidentRow) -> Option<Resident> {
    let kind = match row.kind.as_str() {
        "agent" => ResidentKind::Agent,
        "human" => ResidentKind::Human,
        _ => return None,
    };
    let status = match row.status.as_str() {
        "alive" => ResidentStatus::Alive,
        "deceased" => ResidentStatus::Deceased,
        "departed" => ResidentStatus::Departed,
        _ => return None,
    };

    let mut resident = Resident::register(
        ResidentId::from(row.id),
        row.passport.clone(),
        row.full_name.clone(),
        row.preferred_name.clone(),
        row.origin.clone(),
        kind,
        Appearance::default(),
    );
    resident.status = status;
    resident.registered_at = row.registered_at;
    resident.x = row.x;
    resident.y = row.y;
    resident.wallet = row.wallet;
    resident.needs.hunger = row.hunger;
    resident.needs.thirst = row.thirst;
    resident.needs.energy = row.energy;
    resident.needs.bladder = row.bladder;
    resident.needs.health = row.health;
    resident.needs.social = row.social;
    resident.needs.clamp_all();
    resident.arrived_at = row.arrived_at;
    resident.loiter_anchor = (row.x, row.y);

    for entry in &row.inventory {
        let Some(item) = ItemKind::from_db_str(&entry.item) else {
            continue;
        };
        let quantity = u32::try_from(entry.quantity.max(1)).unwrap_or(1);
        let mut stack = InventoryEntry::new(item, quantity);
        stack.remaining_uses = entry
            .remaining_uses
            .and_then(|uses| u32::try_from(uses).ok())
            .or(stack.remaining_uses);
        resident.inventory.push(stack);
    }

    if let Some(job) = row.job_id {
        resident.employment = Some(Employment::new(JobId::from(job)));
    }

    Some(resident)
}
