//! Perception assembly: the bounded view of the world for one resident.
//!
//! Run once per living, spawned resident per perception tick. Visibility
//! is a union of an omnidirectional ambient radius and a forward cone;
//! walls never block sight in this top-down world, but they do attenuate
//! sound. Audibility covers the speech window accumulated since the last
//! perception tick. The builder also flushes the resident's notification
//! buffer and updates their forageable-node knowledge, so it takes the
//! world mutably -- it runs on the tick worker like everything else.

use city_types::{
    AudibleSpeech, ForageDelta, LawView, NeedsView, PerceptionUpdate, ResidentId, SelfView,
    SpeechAct, VisibleBuilding, VisibleObject, VisibleResident,
};

use crate::config::{MovementConfig, PerceptionConfig};
use crate::state::WorldState;

/// Geometry helper: whether a target point is visible from an observer.
///
/// Visible when within `ambient_range` in any direction, or within
/// `fov_range` inside the facing cone of `fov_angle_degrees`.
pub fn is_visible(
    config: &PerceptionConfig,
    observer_x: f64,
    observer_y: f64,
    facing_degrees: f64,
    target_x: f64,
    target_y: f64,
) -> bool {
    let dx = target_x - observer_x;
    let dy = target_y - observer_y;
    let distance = dx.hypot(dy);

    if distance <= config.ambient_range {
        return true;
    }
    if distance > config.fov_range {
        return false;
    }

    let facing = facing_degrees.to_radians();
    let (fy, fx) = facing.sin_cos();
    let dot = (dx / distance).mul_add(fx, (dy / distance) * fy);
    let half_angle = (config.fov_angle_degrees / 2.0).to_radians();
    dot >= half_angle.cos()
}

/// Whether a listener at the given distance hears a speech act.
///
/// Directed speech reaches its addressee anywhere inside the unscaled
/// volume envelope; everything else is attenuated by the wall factor
/// when the straight line crosses a blocked tile.
fn is_audible(
    state: &WorldState,
    config: &PerceptionConfig,
    act: &SpeechAct,
    listener: ResidentId,
    listener_x: f64,
    listener_y: f64,
) -> bool {
    let distance = (act.x - listener_x).hypot(act.y - listener_y);
    let envelope = act.volume.range();

    if act.to == Some(listener) {
        return distance <= envelope;
    }

    let crosses = state
        .map
        .segment_crosses_wall(act.x, act.y, listener_x, listener_y);
    let effective = if crosses {
        envelope * config.wall_sound_factor
    } else {
        envelope
    };
    distance <= effective
}

/// Assemble one perception update and flush the resident's buffers.
///
/// Returns `None` for residents who are dead, departed, or still on the
/// train. `speech` is the window accumulated since the last perception
/// tick (the engine clears it after all residents are built).
pub fn build_perception(
    state: &mut WorldState,
    id: ResidentId,
    tick: u64,
    world_time: f64,
    time_of_day: &str,
    perception: &PerceptionConfig,
    movement: &MovementConfig,
    speech: &[SpeechAct],
) -> Option<PerceptionUpdate> {
    let me = state.resident(id)?;
    if !me.is_active() {
        return None;
    }
    let (my_x, my_y, my_facing) = (me.x, me.y, me.facing);
    let my_building = me.building;

    // Visible living residents (never the observer, never the dead).
    let mut residents: Vec<VisibleResident> = state
        .residents
        .values()
        .filter(|other| other.id != id && other.is_active())
        .filter(|other| {
            is_visible(perception, my_x, my_y, my_facing, other.x, other.y)
        })
        .map(|other| VisibleResident {
            id: other.id,
            name: other.preferred_name.clone(),
            x: other.x,
            y: other.y,
            facing: other.facing,
            sleeping: other.sleeping,
            distance: (other.x - my_x).hypot(other.y - my_y),
        })
        .collect();
    residents.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    // Bodies and live forageables as objects.
    let mut objects: Vec<VisibleObject> = Vec::new();
    for body in state.bodies.values() {
        if is_visible(perception, my_x, my_y, my_facing, body.x, body.y) {
            objects.push(VisibleObject {
                id: body.resident.into_inner(),
                kind: String::from("body"),
                label: body.name.clone(),
                x: body.x,
                y: body.y,
                is_dead: true,
            });
        }
    }
    for node in state.forageables.values().filter(|n| n.is_available()) {
        if is_visible(perception, my_x, my_y, my_facing, node.x, node.y) {
            objects.push(VisibleObject {
                id: node.id.into_inner(),
                kind: match node.kind {
                    city_types::ForageKind::BerryBush => String::from("berry_bush"),
                    city_types::ForageKind::FreshSpring => String::from("fresh_spring"),
                },
                label: String::new(),
                x: node.x,
                y: node.y,
                is_dead: false,
            });
        }
    }

    // Buildings: ambient range only, facing ignored.
    let mut buildings: Vec<VisibleBuilding> = Vec::new();
    for placement in state.map.buildings() {
        if let Ok((_, door_x, door_y, distance)) =
            state.map.nearest_door(placement.id, my_x, my_y)
            && distance <= perception.ambient_range
        {
            buildings.push(VisibleBuilding {
                id: placement.id,
                role: placement.role,
                door_x,
                door_y,
                distance,
            });
        }
    }
    buildings.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    // Audible speech from the window.
    let audible: Vec<AudibleSpeech> = speech
        .iter()
        .filter(|act| is_audible(state, perception, act, id, my_x, my_y))
        .map(|act| AudibleSpeech {
            speaker: act.speaker,
            speaker_name: act.speaker_name.clone(),
            text: act.text.clone(),
            volume: act.volume,
            directed: act.to == Some(id),
        })
        .collect();

    // Legal interaction verbs, deterministic order.
    let interactions = legal_interactions(state, id, perception, movement);

    // Forage knowledge delta, then the flush below records it.
    let mut forage_delta: Vec<ForageDelta> = Vec::new();
    for node in state.forageables.values() {
        let known = state
            .resident(id)
            .and_then(|r| r.forage_knowledge.get(&node.id).copied());
        if known != Some(node.uses_remaining) {
            forage_delta.push(ForageDelta {
                id: node.id,
                kind: node.kind,
                uses_remaining: node.uses_remaining,
            });
        }
    }

    let node_uses: Vec<(city_types::ForageableId, u32)> = state
        .forageables
        .values()
        .map(|n| (n.id, n.uses_remaining))
        .collect();

    let me = state.resident_mut(id)?;
    let notifications = std::mem::take(&mut me.pending_notifications);
    for (node_id, uses) in node_uses {
        me.forage_knowledge.insert(node_id, uses);
    }
    me.last_perception_tick = tick;

    let self_view = SelfView {
        id: me.id,
        passport: me.passport.clone(),
        name: me.preferred_name.clone(),
        x: me.x,
        y: me.y,
        facing: me.facing,
        building: my_building,
        sleeping: me.sleeping,
        needs: NeedsView {
            hunger: me.needs.hunger,
            thirst: me.needs.thirst,
            energy: me.needs.energy,
            bladder: me.needs.bladder,
            health: me.needs.health,
            social: me.needs.social,
        },
        wallet: me.wallet,
        inventory: me.inventory.clone(),
        employment: me.employment.clone(),
        law: LawView {
            wanted: me.law.is_wanted(),
            violations: me
                .law
                .violations
                .iter()
                .map(|v| format!("{v:?}").to_lowercase())
                .collect(),
            imprisoned_until: me.law.imprisoned_until,
        },
        feedback_token: None,
    };

    Some(PerceptionUpdate {
        tick,
        world_time,
        time_of_day: time_of_day.to_owned(),
        self_view,
        residents,
        objects,
        buildings,
        audible,
        interactions,
        notifications,
        forage_delta,
    })
}

/// The ordered list of verbs currently legal for a resident.
fn legal_interactions(
    state: &WorldState,
    id: ResidentId,
    perception: &PerceptionConfig,
    _movement: &MovementConfig,
) -> Vec<String> {
    let Some(me) = state.resident(id) else {
        return Vec::new();
    };
    let mut verbs = Vec::new();

    if let Some(building_id) = me.building {
        verbs.push(String::from("exit_building"));
        if let Some(building) = state.map.building(building_id) {
            match building.role {
                city_types::BuildingRole::Shop => verbs.push(String::from("buy")),
                city_types::BuildingRole::Bank => verbs.push(String::from("collect_ubi")),
                city_types::BuildingRole::Toilet => {
                    verbs.push(String::from("use_toilet"));
                }
                city_types::BuildingRole::Hall => {
                    verbs.push(String::from("write_petition"));
                    verbs.push(String::from("vote_petition"));
                }
                city_types::BuildingRole::Mortuary => {
                    if me.law.carrying.is_some_and(|c| state.bodies.contains_key(&c)) {
                        verbs.push(String::from("process_body"));
                    }
                }
                city_types::BuildingRole::Police => {
                    if me.law.carrying.is_some_and(|c| !state.bodies.contains_key(&c)) {
                        verbs.push(String::from("book_suspect"));
                    }
                }
                _ => {}
            }
        }
    } else {
        for building in state.map.buildings() {
            if let Ok((_, _, _, distance)) =
                state.map.nearest_door(building.id, me.x, me.y)
                && distance <= perception.interact_range
            {
                verbs.push(format!("enter_building:{}", building.id));
            }
        }
        for node in state.available_forageables() {
            let distance = (node.x - me.x).hypot(node.y - me.y);
            if distance <= perception.interact_range {
                verbs.push(format!("forage:{}", node.id));
            }
        }
        for body in state.bodies.values() {
            if body.carried_by.is_none() {
                let distance = (body.x - me.x).hypot(body.y - me.y);
                if distance <= perception.interact_range {
                    verbs.push(format!("collect_body:{}", body.resident));
                }
            }
        }
    }

    if city_residents::inventory::first_edible(&me.inventory).is_some() {
        verbs.push(String::from("eat"));
    }
    if city_residents::inventory::first_drinkable(&me.inventory).is_some() {
        verbs.push(String::from("drink"));
    }
    if me.sleeping {
        verbs.push(String::from("wake"));
    } else if me.needs.energy <= 90.0 {
        verbs.push(String::from("sleep"));
    }

    verbs
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use city_residents::{default_jobs, JobBoard, Resident};
    use city_types::{Appearance, ResidentKind, SpeechVolume};
    use city_world::{create_starting_map, default_forageables};

    use super::*;
    use crate::config::CityConfig;
    use crate::state::WorldState;

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

    fn spawn_resident(world: &mut WorldState, name: &str, x: f64, y: f64) -> ResidentId {
        let mut r = Resident::register(
            ResidentId::new(),
            format!("CITY-{name}"),
            name.to_owned(),
            name.to_owned(),
            String::from("Elsewhere"),
            ResidentKind::Agent,
            Appearance::default(),
        );
        r.spawn_at(x, y, 0.0);
        let id = r.id;
        world.residents.insert(id, r);
        id
    }

    fn speech(x: f64, y: f64, volume: SpeechVolume, to: Option<ResidentId>) -> SpeechAct {
        SpeechAct {
            speaker: ResidentId::new(),
            speaker_name: String::from("Speaker"),
            text: String::from("hi"),
            volume,
            to,
            x,
            y,
            world_time: 0.0,
        }
    }

    #[test]
    fn ambient_range_sees_all_directions() {
        let config = CityConfig::default();
        // Target directly behind the observer, inside ambient range.
        assert!(is_visible(&config.perception, 0.0, 0.0, 0.0, -100.0, 0.0));
        // Behind and outside ambient range: hidden.
        assert!(!is_visible(&config.perception, 0.0, 0.0, 0.0, -200.0, 0.0));
    }

    #[test]
    fn cone_extends_ambient_forward() {
        let config = CityConfig::default();
        // Facing east (0 degrees): a target 300px east is inside the cone.
        assert!(is_visible(&config.perception, 0.0, 0.0, 0.0, 300.0, 0.0));
        // 300px north is outside the 90-degree cone.
        assert!(!is_visible(&config.perception, 0.0, 0.0, 0.0, 0.0, -300.0));
        // Beyond fov range even dead ahead: hidden.
        assert!(!is_visible(&config.perception, 0.0, 0.0, 0.0, 400.0, 0.0));
    }

    #[test]
    fn shout_carries_900_pixels() {
        let mut world = test_world();
        let config = CityConfig::default();
        let listener_a = spawn_resident(&mut world, "AAA01", 100.0, 900.0);
        let listener_b = spawn_resident(&mut world, "BBB02", 100.0, 1001.0);
        let act = speech(100.0, 0.0, SpeechVolume::Shout, None);

        let update_a = build_perception(
            &mut world,
            listener_a,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            std::slice::from_ref(&act),
        )
        .unwrap();
        assert_eq!(update_a.audible.len(), 1);

        let update_b = build_perception(
            &mut world,
            listener_b,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            std::slice::from_ref(&act),
        )
        .unwrap();
        assert!(update_b.audible.is_empty());
    }

    #[test]
    fn directed_speech_reaches_addressee_in_envelope() {
        let mut world = test_world();
        let config = CityConfig::default();
        let listener = spawn_resident(&mut world, "AAA01", 100.0, 250.0);
        let act = speech(100.0, 0.0, SpeechVolume::Normal, Some(listener));

        let update = build_perception(
            &mut world,
            listener,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            std::slice::from_ref(&act),
        )
        .unwrap();
        assert_eq!(update.audible.len(), 1);
        assert!(update.audible.first().unwrap().directed);
    }

    #[test]
    fn notifications_flush_once() {
        let mut world = test_world();
        let config = CityConfig::default();
        let id = spawn_resident(&mut world, "AAA01", 500.0, 500.0);
        world.resident_mut(id).unwrap().notify("welcome to the city");

        let update = build_perception(
            &mut world,
            id,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        )
        .unwrap();
        assert_eq!(update.notifications.len(), 1);

        let update = build_perception(
            &mut world,
            id,
            2,
            0.25,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        )
        .unwrap();
        assert!(update.notifications.is_empty());
    }

    #[test]
    fn forage_delta_only_on_change() {
        let mut world = test_world();
        let config = CityConfig::default();
        let id = spawn_resident(&mut world, "AAA01", 500.0, 500.0);

        let update = build_perception(
            &mut world,
            id,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        )
        .unwrap();
        // First perception: every node is news.
        assert_eq!(update.forage_delta.len(), world.forageables.len());

        let update = build_perception(
            &mut world,
            id,
            2,
            0.25,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        )
        .unwrap();
        assert!(update.forage_delta.is_empty());

        // Harvest one node; only it appears in the next delta.
        let node_id = *world.forageables.keys().next().unwrap();
        let _ = world
            .forageables
            .get_mut(&node_id)
            .unwrap()
            .harvest(1.0)
            .unwrap();
        let update = build_perception(
            &mut world,
            id,
            3,
            0.5,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        )
        .unwrap();
        assert_eq!(update.forage_delta.len(), 1);
        assert_eq!(update.forage_delta.first().unwrap().id, node_id);
    }

    #[test]
    fn dead_residents_get_no_perception() {
        let mut world = test_world();
        let config = CityConfig::default();
        let id = spawn_resident(&mut world, "AAA01", 500.0, 500.0);
        world.resident_mut(id).unwrap().status =
            city_types::ResidentStatus::Deceased;
        let update = build_perception(
            &mut world,
            id,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        );
        assert!(update.is_none());
    }

    #[test]
    fn bodies_report_dead_objects() {
        let mut world = test_world();
        let config = CityConfig::default();
        let observer = spawn_resident(&mut world, "AAA01", 500.0, 500.0);
        let corpse = spawn_resident(&mut world, "BBB02", 520.0, 500.0);
        let (name, x, y) = {
            let r = world.resident_mut(corpse).unwrap();
            r.status = city_types::ResidentStatus::Deceased;
            (r.preferred_name.clone(), r.x, r.y)
        };
        world.bodies.insert(
            corpse,
            city_types::BodyRecord {
                resident: corpse,
                name,
                x,
                y,
                died_at: 10.0,
                carried_by: None,
            },
        );

        let update = build_perception(
            &mut world,
            observer,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        )
        .unwrap();
        // The dead resident is not in the residents list.
        assert!(update.residents.is_empty());
        let body = update.objects.iter().find(|o| o.kind == "body").unwrap();
        assert!(body.is_dead);
    }

    #[test]
    fn nearby_door_offers_enter_verb() {
        let mut world = test_world();
        let config = CityConfig::default();
        let shop = world
            .map
            .building_by_role(city_types::BuildingRole::Shop)
            .unwrap()
            .id;
        let door = world
            .map
            .building(shop)
            .unwrap()
            .doors
            .first()
            .copied()
            .unwrap();
        let (door_x, door_y) = world.map.door_outside_position(door);
        let id = spawn_resident(&mut world, "AAA01", door_x, door_y);

        let update = build_perception(
            &mut world,
            id,
            1,
            0.0,
            "morning",
            &config.perception,
            &config.movement,
            &[],
        )
        .unwrap();
        let expected = format!("enter_building:{shop}");
        assert!(update.interactions.contains(&expected));
    }
}
