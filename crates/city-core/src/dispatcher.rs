//! The action dispatcher: validates and applies inbound client commands.
//!
//! Every command produces exactly one `action_result`. Preconditions are
//! checked before the first mutation, so a refused command leaves no
//! observable state change. Movement commands only set intent -- the
//! position phase integrates it. Speech is queued into the perception
//! window; the speaker gets an immediate echo in their result data.

use city_residents::needs::activity_costs;
use city_residents::{inventory, policing, shop, MoveIntent};
use city_types::{
    ActionFailure, ActionResultMessage, BuildingId, BuildingRole, ClientCommand,
    CommandEnvelope, EventKind, InspectReport, MoveSpeed, ResidentId, ResidentStatus,
    ServerMessage, SpeechAct, WorldEvent, MAX_PETITION_LEN, MAX_SPEECH_LEN,
};
use serde_json::json;
use tracing::debug;

use crate::config::CityConfig;
use crate::state::WorldState;

/// Everything a dispatched command produced besides its state changes.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// The single reply for the command.
    pub result: ActionResultMessage,
    /// Narrative events to persist and feed.
    pub events: Vec<WorldEvent>,
    /// Extra messages for the acting resident's own session.
    pub direct: Vec<ServerMessage>,
    /// Messages for other residents' sessions.
    pub to_others: Vec<(ResidentId, ServerMessage)>,
    /// The resident departed; the engine closes the session.
    pub departed: bool,
}

impl DispatchOutcome {
    fn ok(request_id: Option<String>, action: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            result: ActionResultMessage::ok(request_id, action, data),
            events: Vec::new(),
            direct: Vec::new(),
            to_others: Vec::new(),
            departed: false,
        }
    }

    fn error(request_id: Option<String>, action: &str, failure: &ActionFailure) -> Self {
        Self {
            result: ActionResultMessage::error(request_id, action, failure),
            events: Vec::new(),
            direct: Vec::new(),
            to_others: Vec::new(),
            departed: false,
        }
    }
}

/// Apply one command from a player session against world state.
pub fn dispatch(
    state: &mut WorldState,
    config: &CityConfig,
    world_time: f64,
    id: ResidentId,
    envelope: CommandEnvelope,
) -> DispatchOutcome {
    let action = envelope.command.verb();
    let request_id = envelope.request_id;

    match apply(state, config, world_time, id, envelope.command) {
        Ok(mut outcome) => {
            outcome.result.request_id = request_id;
            outcome
        }
        Err(failure) => {
            debug!(%id, action, %failure, "command refused");
            DispatchOutcome::error(request_id, action, &failure)
        }
    }
}

/// Precondition helper: the resident must exist, be alive, and be in the
/// world (off the train).
fn require_active<'a>(
    state: &'a WorldState,
    id: ResidentId,
) -> Result<&'a city_residents::Resident, ActionFailure> {
    let resident = state.resident(id).ok_or(ActionFailure::NotFound)?;
    match resident.status {
        ResidentStatus::Deceased => Err(ActionFailure::AlreadyDead),
        ResidentStatus::Departed => Err(ActionFailure::NotFound),
        ResidentStatus::Alive if resident.arrived_at.is_none() => {
            Err(ActionFailure::ValidationFailed {
                detail: String::from("still aboard the train"),
            })
        }
        ResidentStatus::Alive => Ok(resident),
    }
}

/// Precondition helper: awake residents only.
fn require_awake(resident: &city_residents::Resident) -> Result<(), ActionFailure> {
    if resident.sleeping {
        return Err(ActionFailure::Asleep);
    }
    Ok(())
}

/// Precondition helper: not serving a sentence.
fn require_free(
    resident: &city_residents::Resident,
    world_time: f64,
) -> Result<(), ActionFailure> {
    if resident.law.is_imprisoned(world_time) {
        let end = resident.law.imprisoned_until.unwrap_or(world_time);
        return Err(ActionFailure::Cooldown {
            remaining: (end - world_time).max(0.0),
        });
    }
    Ok(())
}

/// Precondition helper: inside a building of a specific role.
fn require_building_role(
    state: &WorldState,
    resident: &city_residents::Resident,
    role: BuildingRole,
) -> Result<BuildingId, ActionFailure> {
    let building = resident.building.ok_or(ActionFailure::NotInBuilding)?;
    let placement = state
        .map
        .building(building)
        .ok_or(ActionFailure::NotInBuilding)?;
    if placement.role != role {
        return Err(ActionFailure::WrongBuilding);
    }
    Ok(building)
}

/// Straight-line distance between two residents.
fn distance_between(a: &city_residents::Resident, b: &city_residents::Resident) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

#[allow(clippy::too_many_lines)]
fn apply(
    state: &mut WorldState,
    config: &CityConfig,
    world_time: f64,
    id: ResidentId,
    command: ClientCommand,
) -> Result<DispatchOutcome, ActionFailure> {
    let action = command.verb();

    match command {
        ClientCommand::Auth { .. } => Err(ActionFailure::ValidationFailed {
            detail: String::from("session is already authenticated"),
        }),

        ClientCommand::Move { dx, dy, speed } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            require_free(me, world_time)?;
            if !dx.is_finite() || !dy.is_finite() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("direction must be finite"),
                });
            }
            let length = dx.hypot(dy);
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            if length <= f64::EPSILON || speed == MoveSpeed::Stop {
                me.move_intent = MoveIntent::Idle;
            } else {
                let (ndx, ndy) = (dx / length, dy / length);
                me.facing = ndy.atan2(ndx).to_degrees().rem_euclid(360.0);
                me.move_intent = MoveIntent::Direction {
                    dx: ndx,
                    dy: ndy,
                    speed,
                };
            }
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::MoveTo { x, y } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            require_free(me, world_time)?;
            if !x.is_finite() || !y.is_finite() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("target must be finite"),
                });
            }
            if x < 0.0 || y < 0.0 || x >= state.map.pixel_width() || y >= state.map.pixel_height() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("target is outside the map"),
                });
            }
            let (from_x, from_y) = (me.x, me.y);
            let path = city_world::find_path(
                &state.map,
                (from_x, from_y),
                (x, y),
                city_world::DEFAULT_EXPANSION_BUDGET,
            )
            .map_err(|_| ActionFailure::NoPath)?;
            let waypoints = path.len();

            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.move_intent = MoveIntent::Waypoints {
                path,
                speed: MoveSpeed::Walk,
            };
            Ok(DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "waypoints": waypoints })),
            ))
        }

        ClientCommand::Stop => {
            let _ = require_active(state, id)?;
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.move_intent = MoveIntent::Idle;
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::Face { degrees } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            if !degrees.is_finite() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("heading must be finite"),
                });
            }
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.facing = degrees.rem_euclid(360.0);
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::Speak { text, volume, to } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            if text.is_empty() || text.len() > MAX_SPEECH_LEN {
                return Err(ActionFailure::ValidationFailed {
                    detail: format!("speech must be 1..={MAX_SPEECH_LEN} characters"),
                });
            }
            if me.needs.energy < activity_costs::SPEAK {
                return Err(ActionFailure::InsufficientEnergy);
            }
            if let Some(target) = to {
                let target_resident =
                    state.resident(target).ok_or(ActionFailure::NotFound)?;
                if target_resident.is_dead() {
                    return Err(ActionFailure::AlreadyDead);
                }
            }

            let (x, y, name) = {
                let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
                city_residents::apply_energy_cost(me, activity_costs::SPEAK);
                if to.is_some() {
                    me.last_conversation = to.map(|t| (t, world_time));
                    me.needs.social = (me.needs.social + 1.0).clamp(0.0, 100.0);
                }
                (me.x, me.y, me.preferred_name.clone())
            };
            if let Some(target) = to
                && let Some(partner) = state.resident_mut(target)
            {
                partner.last_conversation = Some((id, world_time));
                partner.needs.social = (partner.needs.social + 1.0).clamp(0.0, 100.0);
            }

            state.speech_window.push(SpeechAct {
                speaker: id,
                speaker_name: name,
                text: text.clone(),
                volume,
                to,
                x,
                y,
                world_time,
            });

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "text": text, "volume": volume })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::Speak, world_time)
                    .with_resident(id)
                    .at(x, y)
                    .with_data(json!({ "volume": volume, "directed": to.is_some() })),
            );
            Ok(outcome)
        }

        ClientCommand::Eat => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let item = inventory::first_edible(&me.inventory).ok_or_else(|| {
                ActionFailure::ValidationFailed {
                    detail: String::from("nothing edible in inventory"),
                }
            })?;
            consume_item(state, id, action, item)
        }

        ClientCommand::Drink => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let item = inventory::first_drinkable(&me.inventory).ok_or_else(|| {
                ActionFailure::ValidationFailed {
                    detail: String::from("nothing drinkable in inventory"),
                }
            })?;
            consume_item(state, id, action, item)
        }

        ClientCommand::Consume { item } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            if !item.is_consumable() {
                return Err(ActionFailure::ValidationFailed {
                    detail: format!("{item:?} cannot be consumed"),
                });
            }
            if inventory::count_item(&me.inventory, item) == 0 {
                return Err(ActionFailure::NotFound);
            }
            consume_item(state, id, action, item)
        }

        ClientCommand::Sleep => {
            let me = require_active(state, id)?;
            if me.sleeping {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("already asleep"),
                });
            }
            if me.needs.energy > config.needs.sleep_energy_limit {
                return Err(ActionFailure::NotSleepy);
            }
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.sleeping = true;
            me.collapsed = false;
            me.move_intent = MoveIntent::Idle;
            // A sleeping bag wears one use per sleep.
            if inventory::has_usable(&me.inventory, city_types::ItemKind::SleepingBag) {
                let _ = inventory::spend_use(
                    &mut me.inventory,
                    city_types::ItemKind::SleepingBag,
                );
            }
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::Wake => {
            let me = require_active(state, id)?;
            if !me.sleeping {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("not asleep"),
                });
            }
            if me.collapsed && me.needs.energy < config.needs.collapse_wake_energy {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("too exhausted to wake"),
                });
            }
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.sleeping = false;
            me.collapsed = false;
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::UseToilet => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let _building = require_building_role(state, me, BuildingRole::Toilet)?;
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.needs.bladder = 0.0;
            city_residents::apply_energy_cost(me, activity_costs::USE_TOILET);
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::EnterBuilding { building } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            require_free(me, world_time)?;
            if me.building.is_some() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("already inside a building"),
                });
            }
            let (_door, door_x, door_y, distance) = state
                .map
                .nearest_door(building, me.x, me.y)
                .map_err(|_| ActionFailure::NotFound)?;
            if distance > config.perception.interact_range {
                return Err(ActionFailure::RangeExceeded);
            }
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.building = Some(building);
            me.x = door_x;
            me.y = door_y;
            me.move_intent = MoveIntent::Idle;
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::ExitBuilding => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let building = me.building.ok_or(ActionFailure::NotInBuilding)?;
            let (door, _, _, _) = state
                .map
                .nearest_door(building, me.x, me.y)
                .map_err(|_| ActionFailure::NotInBuilding)?;
            let (out_x, out_y) = state.map.door_outside_position(door);
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.building = None;
            me.x = out_x;
            me.y = out_y;
            me.move_intent = MoveIntent::Idle;
            Ok(DispatchOutcome::ok(None, action, None))
        }

        ClientCommand::Buy { item, quantity } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let building = require_building_role(state, me, BuildingRole::Shop)?;
            // Take the shop out of the world so the buyer can be borrowed
            // mutably alongside it.
            let mut shop_state = std::mem::replace(
                &mut state.shop,
                shop::ShopState {
                    stock: std::collections::BTreeMap::new(),
                    last_restock: 0.0,
                },
            );
            let result = state
                .resident_mut(id)
                .ok_or(ActionFailure::NotFound)
                .and_then(|me| shop::buy(&mut shop_state, me, item, quantity));
            state.shop = shop_state;
            let receipt = result?;

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({
                    "item": item,
                    "quantity": receipt.quantity,
                    "paid": receipt.total_price,
                })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::Buy, world_time)
                    .with_resident(id)
                    .with_building(building)
                    .with_data(json!({
                        "item": item,
                        "quantity": receipt.quantity,
                        "paid": receipt.total_price,
                    })),
            );
            Ok(outcome)
        }

        ClientCommand::CollectUbi => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let building = require_building_role(state, me, BuildingRole::Bank)?;
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            let credited = shop::collect_ubi(me, config.economy.ubi, world_time)?;

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "credited": credited })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::CollectUbi, world_time)
                    .with_resident(id)
                    .with_building(building)
                    .with_data(json!({ "credited": credited })),
            );
            Ok(outcome)
        }

        ClientCommand::Inspect { target } => {
            let me = require_active(state, id)?;
            let report = if let Some(body) = state.bodies.get(&target) {
                let distance = (body.x - me.x).hypot(body.y - me.y);
                if distance > config.perception.ambient_range {
                    return Err(ActionFailure::RangeExceeded);
                }
                let record = state.resident(target).ok_or(ActionFailure::NotFound)?;
                InspectReport {
                    resident: target,
                    passport: record.passport.clone(),
                    name: record.preferred_name.clone(),
                    origin: record.origin.clone(),
                    is_dead: true,
                    sleeping: false,
                    wanted: false,
                    x: body.x,
                    y: body.y,
                }
            } else {
                let other = require_active(state, target)?;
                let distance = distance_between(me, other);
                if distance > config.perception.ambient_range {
                    return Err(ActionFailure::RangeExceeded);
                }
                InspectReport {
                    resident: target,
                    passport: other.passport.clone(),
                    name: other.preferred_name.clone(),
                    origin: other.origin.clone(),
                    is_dead: false,
                    sleeping: other.sleeping,
                    wanted: other.law.is_wanted(),
                    x: other.x,
                    y: other.y,
                }
            };

            let mut outcome = DispatchOutcome::ok(None, action, None);
            outcome.direct.push(ServerMessage::InspectResult(report));
            Ok(outcome)
        }

        ClientCommand::Trade {
            target,
            offer_item,
            offer_quantity,
            ask_price,
        } => {
            if offer_quantity == 0 || ask_price < 0 {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("offer must be positive"),
                });
            }
            let me = require_active(state, id)?;
            require_awake(me)?;
            let other = require_active(state, target)?;
            if distance_between(me, other) > config.perception.interact_range {
                return Err(ActionFailure::RangeExceeded);
            }
            if inventory::count_item(&me.inventory, offer_item) < offer_quantity {
                return Err(ActionFailure::NotFound);
            }
            if other.wallet < ask_price {
                return Err(ActionFailure::InsufficientWallet);
            }

            // Apply both legs.
            {
                let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
                inventory::remove_item(&mut me.inventory, offer_item, offer_quantity)
                    .map_err(|_| ActionFailure::NotFound)?;
                me.wallet = me.wallet.saturating_add(ask_price);
            }
            {
                let other = state.resident_mut(target).ok_or(ActionFailure::NotFound)?;
                other.wallet = other.wallet.saturating_sub(ask_price);
                inventory::add_item(&mut other.inventory, offer_item, offer_quantity);
                other.notify(format!(
                    "received {offer_quantity} {offer_item:?} for {ask_price}"
                ));
            }

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({
                    "item": offer_item,
                    "quantity": offer_quantity,
                    "received": ask_price,
                })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::Trade, world_time)
                    .with_resident(id)
                    .with_target(target)
                    .with_data(json!({
                        "item": offer_item,
                        "quantity": offer_quantity,
                        "price": ask_price,
                    })),
            );
            Ok(outcome)
        }

        ClientCommand::Give {
            target,
            item,
            quantity,
        } => {
            if quantity == 0 {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("quantity must be positive"),
                });
            }
            let me = require_active(state, id)?;
            require_awake(me)?;
            let other = require_active(state, target)?;
            if distance_between(me, other) > config.perception.interact_range {
                return Err(ActionFailure::RangeExceeded);
            }
            if inventory::count_item(&me.inventory, item) < quantity {
                return Err(ActionFailure::NotFound);
            }

            {
                let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
                inventory::remove_item(&mut me.inventory, item, quantity)
                    .map_err(|_| ActionFailure::NotFound)?;
            }
            {
                let other = state.resident_mut(target).ok_or(ActionFailure::NotFound)?;
                inventory::add_item(&mut other.inventory, item, quantity);
                other.notify(format!("received {quantity} {item:?} as a gift"));
            }

            let mut outcome = DispatchOutcome::ok(None, action, None);
            outcome.events.push(
                WorldEvent::new(EventKind::Give, world_time)
                    .with_resident(id)
                    .with_target(target)
                    .with_data(json!({ "item": item, "quantity": quantity })),
            );
            Ok(outcome)
        }

        ClientCommand::ApplyJob { job } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let me_id = me.id;
            let title = {
                let mut board = std::mem::take(&mut state.jobs);
                let result = {
                    let me = state.resident_mut(me_id).ok_or(ActionFailure::NotFound)?;
                    board.apply(me, job).map(|j| j.title.clone())
                };
                state.jobs = board;
                result?
            };

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "job": job, "title": title })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::ApplyJob, world_time)
                    .with_resident(id)
                    .with_data(json!({ "job": job, "title": title })),
            );
            Ok(outcome)
        }

        ClientCommand::QuitJob => {
            let me = require_active(state, id)?;
            let me_id = me.id;
            let quit_job = {
                let mut board = std::mem::take(&mut state.jobs);
                let result = {
                    let me = state.resident_mut(me_id).ok_or(ActionFailure::NotFound)?;
                    board.quit(me)
                };
                state.jobs = board;
                result?
            };

            let mut outcome = DispatchOutcome::ok(None, action, None);
            outcome.events.push(
                WorldEvent::new(EventKind::QuitJob, world_time)
                    .with_resident(id)
                    .with_data(json!({ "job": quit_job })),
            );
            Ok(outcome)
        }

        ClientCommand::WritePetition {
            category,
            description,
        } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let building = require_building_role(state, me, BuildingRole::Hall)?;
            if category.is_empty() || description.is_empty() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("category and description are required"),
                });
            }
            if description.len() > MAX_PETITION_LEN {
                return Err(ActionFailure::ValidationFailed {
                    detail: format!("description exceeds {MAX_PETITION_LEN} characters"),
                });
            }
            if me.needs.energy < city_residents::PETITION_ENERGY_COST {
                return Err(ActionFailure::InsufficientEnergy);
            }
            if me.wallet < city_residents::PETITION_WALLET_COST {
                return Err(ActionFailure::InsufficientWallet);
            }

            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            city_residents::apply_energy_cost(me, city_residents::PETITION_ENERGY_COST);
            me.wallet = me.wallet.saturating_sub(city_residents::PETITION_WALLET_COST);
            let petition = state
                .petitions
                .open(id, category.clone(), description, world_time);

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "petition": petition })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::WritePetition, world_time)
                    .with_resident(id)
                    .with_building(building)
                    .with_data(json!({ "petition": petition, "category": category })),
            );
            Ok(outcome)
        }

        ClientCommand::VotePetition { petition, approve } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let building = require_building_role(state, me, BuildingRole::Hall)?;
            if me.needs.energy < activity_costs::VOTE {
                return Err(ActionFailure::InsufficientEnergy);
            }

            state.petitions.vote(petition, id, approve)?;
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            city_residents::apply_energy_cost(me, activity_costs::VOTE);

            let mut outcome = DispatchOutcome::ok(None, action, None);
            outcome.events.push(
                WorldEvent::new(EventKind::VotePetition, world_time)
                    .with_resident(id)
                    .with_building(building)
                    .with_data(json!({ "petition": petition, "approve": approve })),
            );
            Ok(outcome)
        }

        ClientCommand::CollectBody { body } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            if me.law.carrying.is_some() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("already carrying something"),
                });
            }
            let record = state.bodies.get(&body).ok_or(ActionFailure::NotFound)?;
            if record.carried_by.is_some() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("someone else is carrying that body"),
                });
            }
            let distance = (record.x - me.x).hypot(record.y - me.y);
            if distance > config.perception.interact_range {
                return Err(ActionFailure::RangeExceeded);
            }

            if let Some(record) = state.bodies.get_mut(&body) {
                record.carried_by = Some(id);
            }
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.law.carrying = Some(body);

            let mut outcome = DispatchOutcome::ok(None, action, None);
            outcome.events.push(
                WorldEvent::new(EventKind::CollectBody, world_time)
                    .with_resident(id)
                    .with_target(body),
            );
            Ok(outcome)
        }

        ClientCommand::ProcessBody => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let building = require_building_role(state, me, BuildingRole::Mortuary)?;
            let carried = me.law.carrying.ok_or(ActionFailure::NothingCarried)?;
            if !state.bodies.contains_key(&carried) {
                return Err(ActionFailure::NothingCarried);
            }

            state.bodies.remove(&carried);
            let bounty = config.economy.body_bounty;
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.law.carrying = None;
            me.wallet = me.wallet.saturating_add(bounty);

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "bounty": bounty })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::ProcessBody, world_time)
                    .with_resident(id)
                    .with_target(carried)
                    .with_building(building)
                    .with_data(json!({ "bounty": bounty })),
            );
            Ok(outcome)
        }

        ClientCommand::Depart => {
            let me = require_active(state, id)?;
            let (x, y) = (me.x, me.y);
            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            me.status = ResidentStatus::Departed;
            me.move_intent = MoveIntent::Idle;
            state.jobs.assignments.remove(&id);

            let mut outcome = DispatchOutcome::ok(None, action, None);
            outcome.departed = true;
            outcome.events.push(
                WorldEvent::new(EventKind::Depart, world_time)
                    .with_resident(id)
                    .at(x, y),
            );
            Ok(outcome)
        }

        ClientCommand::ListJobs => {
            let _ = require_active(state, id)?;
            let listings: Vec<serde_json::Value> = state
                .jobs
                .jobs
                .values()
                .map(|job| {
                    json!({
                        "id": job.id,
                        "title": job.title,
                        "building": job.building,
                        "wage": job.wage,
                        "shift_hours": job.shift_hours,
                        "openings": state.jobs.openings(job.id),
                        "description": job.description,
                    })
                })
                .collect();
            Ok(DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "jobs": listings })),
            ))
        }

        ClientCommand::ListPetitions => {
            let _ = require_active(state, id)?;
            let listings: Vec<serde_json::Value> = state
                .petitions
                .list()
                .into_iter()
                .map(|p| serde_json::to_value(p).unwrap_or(serde_json::Value::Null))
                .collect();
            Ok(DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "petitions": listings })),
            ))
        }

        ClientCommand::Arrest { target } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            if !state.jobs.is_police(id) {
                return Err(ActionFailure::NotPolice);
            }
            let _ = require_active(state, target)?;

            // Take both residents out to satisfy the borrow checker.
            let mut officer = state
                .residents
                .remove(&id)
                .ok_or(ActionFailure::NotFound)?;
            let mut suspect = match state.residents.remove(&target) {
                Some(s) => s,
                None => {
                    state.residents.insert(id, officer);
                    return Err(ActionFailure::NotFound);
                }
            };
            let result = policing::arrest(
                &mut officer,
                &mut suspect,
                true,
                &config.policing,
            );
            state.residents.insert(id, officer);
            state.residents.insert(target, suspect);
            result?;

            let mut outcome = DispatchOutcome::ok(None, action, None);
            outcome.events.push(
                WorldEvent::new(EventKind::Arrest, world_time)
                    .with_resident(id)
                    .with_target(target),
            );
            outcome.to_others.push((
                target,
                ServerMessage::SystemAnnouncement {
                    text: String::from("You have been arrested."),
                },
            ));
            Ok(outcome)
        }

        ClientCommand::BookSuspect => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            let building = require_building_role(state, me, BuildingRole::Police)?;
            let carried = me.law.carrying.ok_or(ActionFailure::NothingCarried)?;
            if state.bodies.contains_key(&carried) {
                return Err(ActionFailure::NothingCarried);
            }
            let law = state
                .laws
                .values()
                .next()
                .cloned()
                .ok_or(ActionFailure::NotFound)?;

            let mut officer = state
                .residents
                .remove(&id)
                .ok_or(ActionFailure::NotFound)?;
            let Some(mut suspect) = state.residents.remove(&carried) else {
                state.residents.insert(id, officer);
                return Err(ActionFailure::NothingCarried);
            };
            let sentence_end = policing::book_suspect(
                &mut officer,
                &mut suspect,
                &law,
                &config.policing,
                world_time,
            );
            state.residents.insert(id, officer);
            state.residents.insert(carried, suspect);

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "imprisoned_until": sentence_end })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::BookSuspect, world_time)
                    .with_resident(id)
                    .with_target(carried)
                    .with_building(building)
                    .with_data(json!({ "law": law.name, "until": sentence_end })),
            );
            outcome.to_others.push((
                carried,
                ServerMessage::SystemAnnouncement {
                    text: format!(
                        "You have been booked for {} and are held until {:.0}.",
                        law.name, sentence_end
                    ),
                },
            ));
            Ok(outcome)
        }

        ClientCommand::Forage { node } => {
            let me = require_active(state, id)?;
            require_awake(me)?;
            require_free(me, world_time)?;
            if me.needs.energy < activity_costs::FORAGE {
                return Err(ActionFailure::InsufficientEnergy);
            }
            let (mx, my) = (me.x, me.y);
            let record = state
                .forageables
                .get_mut(&node)
                .ok_or(ActionFailure::NotFound)?;
            let distance = (record.x - mx).hypot(record.y - my);
            if distance > config.perception.interact_range {
                return Err(ActionFailure::RangeExceeded);
            }
            let item = record.harvest(world_time).map_err(|_| {
                ActionFailure::ValidationFailed {
                    detail: String::from("the node is picked clean"),
                }
            })?;
            let uses_left = record.uses_remaining;

            let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
            inventory::add_item(&mut me.inventory, item, 1);
            city_residents::apply_energy_cost(me, activity_costs::FORAGE);

            let mut outcome = DispatchOutcome::ok(
                None,
                action,
                Some(json!({ "item": item, "uses_left": uses_left })),
            );
            outcome.events.push(
                WorldEvent::new(EventKind::Forage, world_time)
                    .with_resident(id)
                    .with_data(json!({ "node": node, "item": item })),
            );
            Ok(outcome)
        }

        ClientCommand::SubmitFeedback { text } => {
            let _ = require_active(state, id)?;
            if text.is_empty() {
                return Err(ActionFailure::ValidationFailed {
                    detail: String::from("feedback text is required"),
                });
            }
            debug!(%id, chars = text.len(), "feedback received");
            Ok(DispatchOutcome::ok(None, action, None))
        }
    }
}

/// Shared tail of eat/drink/consume: remove one unit, apply nutrition,
/// debit energy.
fn consume_item(
    state: &mut WorldState,
    id: ResidentId,
    action: &str,
    item: city_types::ItemKind,
) -> Result<DispatchOutcome, ActionFailure> {
    let me = state.resident_mut(id).ok_or(ActionFailure::NotFound)?;
    inventory::remove_item(&mut me.inventory, item, 1)
        .map_err(|_| ActionFailure::NotFound)?;
    city_residents::apply_nutrition(me, item);
    city_residents::apply_energy_cost(me, activity_costs::CONSUME);
    Ok(DispatchOutcome::ok(
        None,
        action,
        Some(json!({ "item": item })),
    ))
}
