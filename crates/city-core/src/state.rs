//! The single in-memory world snapshot.
//!
//! [`WorldState`] owns every entity: the map, residents, bodies,
//! forageables, the train queue, shop stock, and the civic tables. All
//! cross-entity links are ids resolved at the use site, and only the tick
//! worker mutates anything here. External readers get the
//! [`PublicSnapshot`] projection, captured between ticks.

use std::collections::{BTreeMap, VecDeque};

use city_residents::{JobBoard, PetitionBoard, Resident, ShopState};
use city_types::{
    BodyRecord, BuildingId, BuildingRole, ForageableId, LawId, LawRecord,
    PublicResidentRecord, ResidentId, ResidentStatus, SpeechAct, WorldEvent,
};
use city_world::{ForageableNode, TileMap};
use serde::{Deserialize, Serialize};

/// Number of feed events retained for the read surface.
pub const FEED_CAPACITY: usize = 256;

/// The complete mutable world.
#[derive(Debug)]
pub struct WorldState {
    /// The immutable tile map.
    pub map: TileMap,
    /// Every resident ever registered this run, keyed by id.
    pub residents: BTreeMap<ResidentId, Resident>,
    /// Bodies awaiting collection or processing.
    pub bodies: BTreeMap<ResidentId, BodyRecord>,
    /// Forageable nodes.
    pub forageables: BTreeMap<ForageableId, ForageableNode>,
    /// Residents waiting for the next train, in registration order.
    pub train_queue: VecDeque<ResidentId>,
    /// The shop shelf.
    pub shop: ShopState,
    /// Job postings and assignments.
    pub jobs: JobBoard,
    /// Petitions and votes.
    pub petitions: PetitionBoard,
    /// The statute book.
    pub laws: BTreeMap<LawId, LawRecord>,
    /// Speech acts queued for the current perception window.
    pub speech_window: Vec<SpeechAct>,
    /// Game-time of the next train arrival.
    pub next_train_at: f64,
    /// Recent narrative events for the activity feed, newest last.
    pub feed: VecDeque<WorldEvent>,
}

impl WorldState {
    /// Build a world over a map with the given starting tables.
    pub fn new(
        map: TileMap,
        forageables: Vec<ForageableNode>,
        jobs: JobBoard,
        laws: Vec<LawRecord>,
        train_interval: f64,
    ) -> Self {
        Self {
            map,
            residents: BTreeMap::new(),
            bodies: BTreeMap::new(),
            forageables: forageables.into_iter().map(|n| (n.id, n)).collect(),
            train_queue: VecDeque::new(),
            shop: ShopState::stocked(),
            jobs,
            petitions: PetitionBoard::default(),
            laws: laws.into_iter().map(|l| (l.id, l)).collect(),
            speech_window: Vec::new(),
            next_train_at: train_interval,
            feed: VecDeque::new(),
        }
    }

    /// Resolve a resident by id.
    pub fn resident(&self, id: ResidentId) -> Option<&Resident> {
        self.residents.get(&id)
    }

    /// Resolve a resident mutably by id.
    pub fn resident_mut(&mut self, id: ResidentId) -> Option<&mut Resident> {
        self.residents.get_mut(&id)
    }

    /// Resolve a resident by passport number.
    pub fn resident_by_passport(&self, passport: &str) -> Option<&Resident> {
        self.residents.values().find(|r| r.passport == passport)
    }

    /// Ids of residents that are alive and spawned, in id order.
    pub fn active_ids(&self) -> Vec<ResidentId> {
        self.residents
            .values()
            .filter(|r| r.is_active())
            .map(|r| r.id)
            .collect()
    }

    /// Number of living residents (spawned or still queued).
    pub fn alive_count(&self) -> usize {
        self.residents
            .values()
            .filter(|r| r.status == ResidentStatus::Alive)
            .count()
    }

    /// Register a resident and queue them for the next train.
    pub fn admit(&mut self, resident: Resident) {
        let id = resident.id;
        self.residents.insert(id, resident);
        self.train_queue.push_back(id);
    }

    /// Drain the train queue onto the platform. Returns the spawned ids.
    ///
    /// Passengers fan out along the platform so they do not overlap.
    pub fn spawn_from_queue(&mut self, world_time: f64, hitbox: f64) -> Vec<ResidentId> {
        let (spawn_x, spawn_y) = self.map.spawn_point();
        let mut spawned = Vec::new();
        let mut slot = 0_u32;
        while let Some(id) = self.train_queue.pop_front() {
            if let Some(resident) = self.residents.get_mut(&id) {
                if resident.status != ResidentStatus::Alive {
                    continue;
                }
                let offset = f64::from(slot) * (hitbox * 2.5);
                resident.spawn_at(spawn_x + offset, spawn_y, world_time);
                spawned.push(id);
                slot = slot.saturating_add(1);
            }
        }
        spawned
    }

    /// Record a narrative event in the bounded activity feed.
    pub fn record_feed(&mut self, event: WorldEvent) {
        self.feed.push_back(event);
        while self.feed.len() > FEED_CAPACITY {
            self.feed.pop_front();
        }
    }

    /// Forage nodes with at least one use, in id order.
    pub fn available_forageables(&self) -> impl Iterator<Item = &ForageableNode> {
        self.forageables.values().filter(|n| n.is_available())
    }

    /// Capture the read-only projection served by the gateway.
    pub fn public_snapshot(&self, world_time: f64, day: u64) -> PublicSnapshot {
        let mut residents: Vec<PublicResidentRecord> = self
            .residents
            .values()
            .map(|r| PublicResidentRecord {
                id: r.id,
                passport: r.passport.clone(),
                name: r.preferred_name.clone(),
                origin: r.origin.clone(),
                status: match r.status {
                    ResidentStatus::Alive => String::from("alive"),
                    ResidentStatus::Deceased => String::from("deceased"),
                    ResidentStatus::Departed => String::from("departed"),
                },
                wallet: r.wallet,
                arrived_at: r.arrived_at,
                registered_at: r.registered_at,
            })
            .collect();
        residents.sort_by(|a, b| a.passport.cmp(&b.passport));

        let mut leaderboard: Vec<LeaderboardEntry> = self
            .residents
            .values()
            .map(|r| LeaderboardEntry {
                passport: r.passport.clone(),
                name: r.preferred_name.clone(),
                alive: r.status == ResidentStatus::Alive,
                survived_game_seconds: r
                    .arrived_at
                    .map_or(0.0, |arrived| (world_time - arrived).max(0.0)),
                wallet: r.wallet,
            })
            .collect();
        leaderboard.sort_by(|a, b| {
            b.alive
                .cmp(&a.alive)
                .then(
                    b.survived_game_seconds
                        .total_cmp(&a.survived_game_seconds),
                )
                .then(b.wallet.cmp(&a.wallet))
        });

        let buildings = self
            .map
            .buildings()
            .map(|b| BuildingInfo {
                id: b.id,
                role: b.role,
                doors: b.doors.len(),
                occupants: self
                    .residents
                    .values()
                    .filter(|r| r.building == Some(b.id))
                    .count(),
            })
            .collect();

        PublicSnapshot {
            world_time,
            day,
            alive: self.alive_count(),
            queued_for_train: self.train_queue.len(),
            bodies: self.bodies.len(),
            residents,
            leaderboard,
            buildings,
            feed: self.feed.iter().rev().cloned().collect(),
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Passport number.
    pub passport: String,
    /// Preferred name.
    pub name: String,
    /// Still alive.
    pub alive: bool,
    /// Game-seconds survived since arrival.
    pub survived_game_seconds: f64,
    /// Wallet balance.
    pub wallet: i64,
}

/// Per-building info payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingInfo {
    /// Building id.
    pub id: BuildingId,
    /// Civic role.
    pub role: BuildingRole,
    /// Number of doors.
    pub doors: usize,
    /// Residents currently inside.
    pub occupants: usize,
}

/// Read-only projection of world state for the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicSnapshot {
    /// Game-time at capture.
    pub world_time: f64,
    /// Game-day at capture.
    pub day: u64,
    /// Living residents.
    pub alive: usize,
    /// Residents queued for the train.
    pub queued_for_train: usize,
    /// Unprocessed bodies.
    pub bodies: usize,
    /// Public records, passport order.
    pub residents: Vec<PublicResidentRecord>,
    /// Leaderboard, alive first then longevity then wallet.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Per-building payloads.
    pub buildings: Vec<BuildingInfo>,
    /// Recent narrative events, newest first.
    pub feed: Vec<WorldEvent>,
}

impl Default for PublicSnapshot {
    fn default() -> Self {
        Self {
            world_time: 0.0,
            day: 0,
            alive: 0,
            queued_for_train: 0,
            bodies: 0,
            residents: Vec::new(),
            leaderboard: Vec::new(),
            buildings: Vec::new(),
            feed: Vec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use city_residents::default_jobs;
    use city_types::{Appearance, EventKind, ResidentKind};
    use city_world::{create_starting_map, default_forageables};

    use super::*;

    fn test_world() -> WorldState {
        let (map, ids) = create_starting_map().unwrap();
        let jobs = JobBoard::with_jobs(default_jobs(
            ids.shop,
            ids.hall,
            ids.police,
            ids.mortuary,
        ));
        WorldState::new(
            map,
            default_forageables(),
            jobs,
            city_residents::default_laws(),
            900.0,
        )
    }

    fn test_resident(name: &str) -> Resident {
        Resident::register(
            ResidentId::new(),
            format!("CITY-{name}"),
            name.to_owned(),
            name.to_owned(),
            String::from("Elsewhere"),
            ResidentKind::Agent,
            Appearance::default(),
        )
    }

    #[test]
    fn admit_queues_for_train() {
        let mut world = test_world();
        let r = test_resident("AAA01");
        let id = r.id;
        world.admit(r);
        assert_eq!(world.train_queue.len(), 1);
        assert!(!world.resident(id).unwrap().is_active());
    }

    #[test]
    fn spawn_drains_queue_without_overlap() {
        let mut world = test_world();
        let a = test_resident("AAA01");
        let b = test_resident("BBB02");
        world.admit(a);
        world.admit(b);

        let spawned = world.spawn_from_queue(900.0, 16.0);
        assert_eq!(spawned.len(), 2);
        assert!(world.train_queue.is_empty());

        let first = world.resident(*spawned.first().unwrap()).unwrap();
        let second = world.resident(*spawned.get(1).unwrap()).unwrap();
        let gap = (first.x - second.x).hypot(first.y - second.y);
        assert!(gap >= 32.0);
    }

    #[test]
    fn passport_lookup() {
        let mut world = test_world();
        let r = test_resident("AAA01");
        world.admit(r);
        assert!(world.resident_by_passport("CITY-AAA01").is_some());
        assert!(world.resident_by_passport("CITY-ZZZ99").is_none());
    }

    #[test]
    fn feed_is_bounded() {
        let mut world = test_world();
        for i in 0..300 {
            world.record_feed(WorldEvent::new(EventKind::Speak, f64::from(i)));
        }
        assert_eq!(world.feed.len(), FEED_CAPACITY);
    }

    #[test]
    fn snapshot_orders_leaderboard_alive_first() {
        let mut world = test_world();
        let mut alive = test_resident("AAA01");
        alive.spawn_at(0.0, 0.0, 0.0);
        let mut dead = test_resident("BBB02");
        dead.spawn_at(0.0, 0.0, 0.0);
        dead.status = ResidentStatus::Deceased;
        dead.wallet = 1000;
        world.admit(alive);
        world.admit(dead);

        let snapshot = world.public_snapshot(5000.0, 0);
        let top = snapshot.leaderboard.first().unwrap();
        assert!(top.alive);
        assert_eq!(snapshot.alive, 1);
    }
}
