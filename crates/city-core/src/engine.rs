//! The engine: owns world state and all subsystems, runs the tick loop.
//!
//! Everything mutable lives behind this one value; there are no module
//! globals. Sessions talk to the engine exclusively through the bounded
//! [`EngineCommand`] channel and their [`SessionOutbox`]es, so the tick
//! worker never awaits a socket. The persistence queue is write-only from
//! here; a full queue halts tick progression until it drains.
//!
//! Phase order per wall-clock iteration: drain inbound, position
//! (catch-up sub-steps), simulation (catch-up sub-steps), perception (at
//! most once). Cancellation is cooperative at iteration boundaries.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use city_db::{CheckpointRow, PersistHandle, PersistRequest, PetitionRow, ResidentRow};
use city_residents::needs::activity_costs;
use city_residents::{
    accrue_shift, apply_needs_tick, process_death, update_loiter, MoveIntent,
    NeedsTickContext, Resident,
};
use city_types::{
    ActionFailure, ActionResultMessage, CommandEnvelope, EventKind, MoveSpeed, ResidentId,
    ServerMessage, SessionId, WorldEvent,
};
use city_world::collision;
use serde_json::json;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use crate::clock::WorldClock;
use crate::config::CityConfig;
use crate::detector::{DetectedSignal, EventDetector};
use crate::dispatcher;
use crate::outbox::SessionOutbox;
use crate::perception::build_perception;
use crate::scheduler::{SchedulerError, StallDetector, TickSchedule};
use crate::state::{PublicSnapshot, WorldState};

/// Bound of the engine command channel.
pub const ENGINE_CHANNEL_CAPACITY: usize = 1024;

/// Errors fatal to the engine run loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The scheduler stalled or was misconfigured.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },

    /// The clock configuration was invalid.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: crate::clock::ClockError,
    },
}

/// Messages from sessions and the gateway into the tick worker.
#[derive(Debug)]
pub enum EngineCommand {
    /// A freshly registered resident joins the train queue.
    Admit {
        /// The new resident.
        resident: Box<Resident>,
    },
    /// A player session binds to its resident.
    AttachPlayer {
        /// The session.
        session: SessionId,
        /// The controlled resident.
        resident: ResidentId,
        /// The session's outbound queue.
        outbox: Arc<SessionOutbox>,
    },
    /// A spectator session subscribes to a resident's perception stream.
    AttachSpectator {
        /// The session.
        session: SessionId,
        /// The followed resident.
        resident: ResidentId,
        /// The session's outbound queue.
        outbox: Arc<SessionOutbox>,
    },
    /// A session's socket closed.
    Detach {
        /// The session.
        session: SessionId,
    },
    /// A command frame from a player session.
    Command {
        /// The sending session.
        session: SessionId,
        /// The resident the session controls.
        resident: ResidentId,
        /// The decoded frame.
        envelope: CommandEnvelope,
    },
}

/// Cloneable handle the gateway uses to reach the engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Send a command to the engine, waiting for channel room.
    pub async fn send(&self, command: EngineCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }

    /// Send without waiting; returns `false` when the channel is full.
    pub fn try_send(&self, command: EngineCommand) -> bool {
        self.tx.try_send(command).is_ok()
    }
}

/// A bound player session.
#[derive(Debug, Clone)]
struct PlayerSlot {
    session: SessionId,
    outbox: Arc<SessionOutbox>,
}

/// Session bookkeeping on the tick worker.
#[derive(Debug, Default)]
struct Sessions {
    players: BTreeMap<ResidentId, PlayerSlot>,
    spectators: BTreeMap<SessionId, (ResidentId, Arc<SessionOutbox>)>,
    session_residents: BTreeMap<SessionId, ResidentId>,
    detached: BTreeMap<ResidentId, (Instant, Arc<SessionOutbox>)>,
}

impl Sessions {
    fn player_outbox(&self, resident: ResidentId) -> Option<&Arc<SessionOutbox>> {
        self.players.get(&resident).map(|slot| &slot.outbox)
    }

    fn spectator_outboxes(
        &self,
        resident: ResidentId,
    ) -> impl Iterator<Item = &Arc<SessionOutbox>> {
        self.spectators
            .values()
            .filter(move |(followed, _)| *followed == resident)
            .map(|(_, outbox)| outbox)
    }

    /// Residents that currently need a perception stream.
    fn streamed_residents(&self) -> Vec<ResidentId> {
        let mut ids: Vec<ResidentId> = self.players.keys().copied().collect();
        for (followed, _) in self.spectators.values() {
            if !ids.contains(followed) {
                ids.push(*followed);
            }
        }
        ids.sort_unstable();
        ids
    }
}

/// The engine value constructed at startup; owns every subsystem.
pub struct Engine {
    state: WorldState,
    clock: WorldClock,
    config: CityConfig,
    schedule: TickSchedule,
    stall: StallDetector,
    detector: EventDetector,
    sessions: Sessions,
    inbound: mpsc::Receiver<EngineCommand>,
    pending: BTreeMap<ResidentId, VecDeque<(SessionId, CommandEnvelope)>>,
    persist: PersistHandle,
    snapshot: Arc<RwLock<PublicSnapshot>>,
    shutdown: watch::Receiver<bool>,
    perception_tick: u64,
    last_checkpoint: Instant,
    persist_halted: bool,
    train_announced: bool,
}

impl Engine {
    /// Assemble an engine over prepared world state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scheduler`] or [`EngineError::Clock`] for
    /// invalid rate or time-scale configuration.
    pub fn new(
        state: WorldState,
        clock: WorldClock,
        config: CityConfig,
        persist: PersistHandle,
    ) -> Result<(Self, EngineHandle, watch::Sender<bool>, Arc<RwLock<PublicSnapshot>>), EngineError>
    {
        let schedule = TickSchedule::new(
            config.rates.position,
            config.rates.simulation,
            config.rates.perception,
        )?;
        let (tx, rx) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let snapshot = Arc::new(RwLock::new(PublicSnapshot::default()));

        let engine = Self {
            state,
            clock,
            config,
            schedule,
            stall: StallDetector::new(),
            detector: EventDetector::new(),
            sessions: Sessions::default(),
            inbound: rx,
            pending: BTreeMap::new(),
            persist,
            snapshot: Arc::clone(&snapshot),
            shutdown: shutdown_rx,
            perception_tick: 0,
            last_checkpoint: Instant::now(),
            persist_halted: false,
            train_announced: false,
        };
        Ok((engine, EngineHandle { tx }, shutdown_tx, snapshot))
    }

    /// Run the tick loop until shutdown or a fatal scheduler error.
    pub async fn run(mut self) -> Result<(), EngineError> {
        let position_interval =
            Duration::from_secs_f64(self.schedule.position_step());
        let mut ticker = tokio::time::interval(position_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last = Instant::now();

        info!(
            residents = self.state.residents.len(),
            world_time = self.clock.world_time(),
            "engine entering tick loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
            }

            let now = Instant::now();
            let real_dt = now.duration_since(last).as_secs_f64();
            last = now;

            self.drain_inbound();

            // A full persistence queue halts tick progression entirely.
            if self.persist_halted {
                if self.persist.has_capacity() {
                    self.persist_halted = false;
                    self.announce("persistence backlog cleared, resuming");
                } else {
                    continue;
                }
            }

            self.schedule.accumulate(real_dt);
            while self.schedule.take_position_step() {
                self.step_position();
            }
            while self.schedule.take_simulation_step() {
                self.step_simulation();
            }
            if self.schedule.take_perception_step() {
                self.run_perception();
            }

            self.maybe_checkpoint();
            self.close_overflowed_sessions();

            let iteration_secs = now.elapsed().as_secs_f64();
            self.stall
                .record(iteration_secs, self.schedule.position_step())?;
        }

        info!("engine shutting down");
        self.flush_on_shutdown();
        Ok(())
    }

    // -----------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------

    /// Drain the command channel and process per-resident queues in id
    /// order, bounded per resident per tick.
    pub fn drain_inbound(&mut self) {
        while let Ok(command) = self.inbound.try_recv() {
            self.accept(command);
        }

        let ids: Vec<ResidentId> = self.pending.keys().copied().collect();
        for id in ids {
            let mut budget = self.config.session.inbound_per_tick;
            while budget > 0 {
                let Some((session, envelope)) =
                    self.pending.get_mut(&id).and_then(VecDeque::pop_front)
                else {
                    break;
                };
                budget = budget.saturating_sub(1);
                self.process_command(session, id, envelope);
            }
            // Anything beyond the bound this tick is refused outright.
            let refusals: Vec<ActionResultMessage> = if let Some(queue) = self.pending.get_mut(&id)
            {
                queue
                    .drain(..)
                    .map(|(_, envelope)| {
                        ActionResultMessage::error(
                            envelope.request_id.clone(),
                            envelope.command.verb(),
                            &ActionFailure::ValidationFailed {
                                detail: String::from("command rate exceeded for this tick"),
                            },
                        )
                    })
                    .collect()
            } else {
                Vec::new()
            };
            for refusal in refusals {
                self.push_to_player(id, ServerMessage::ActionResult(refusal));
            }
        }
        self.pending.retain(|_, queue| !queue.is_empty());
    }

    /// Route one engine command.
    fn accept(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Admit { resident } => {
                let id = resident.id;
                let passport = resident.passport.clone();
                self.enqueue_persist(PersistRequest::Resident(Box::new(resident_row(
                    &resident, None,
                ))));
                self.state.admit(*resident);
                info!(%id, passport, "resident admitted to the train queue");
            }
            EngineCommand::AttachPlayer {
                session,
                resident,
                outbox,
            } => self.attach_player(session, resident, &outbox),
            EngineCommand::AttachSpectator {
                session,
                resident,
                outbox,
            } => {
                if self.state.resident(resident).is_none() {
                    let _ = outbox.push(ServerMessage::Error {
                        reason: String::from("unknown_resident"),
                    });
                    outbox.close();
                    return;
                }
                self.sessions
                    .spectators
                    .insert(session, (resident, outbox));
                self.sessions.session_residents.insert(session, resident);
            }
            EngineCommand::Detach { session } => self.detach(session),
            EngineCommand::Command {
                session,
                resident,
                envelope,
            } => {
                // Only the bound player session may act for a resident.
                let is_player = self
                    .sessions
                    .players
                    .get(&resident)
                    .is_some_and(|slot| slot.session == session);
                if !is_player {
                    if let Some((_, outbox)) = self.sessions.spectators.get(&session) {
                        let _ = outbox.push(ServerMessage::Error {
                            reason: String::from("validation_failed"),
                        });
                    }
                    return;
                }
                self.pending
                    .entry(resident)
                    .or_default()
                    .push_back((session, envelope));
            }
        }
    }

    fn attach_player(
        &mut self,
        session: SessionId,
        resident: ResidentId,
        outbox: &Arc<SessionOutbox>,
    ) {
        let Some(record) = self.state.resident(resident) else {
            let _ = outbox.push(ServerMessage::Error {
                reason: String::from("unknown_resident"),
            });
            outbox.close();
            return;
        };
        if record.is_dead() {
            let _ = outbox.push(ServerMessage::Error {
                reason: String::from("already_dead"),
            });
            outbox.close();
            return;
        }

        // Replace any existing player session for this resident.
        if let Some(previous) = self.sessions.players.remove(&resident) {
            self.sessions.session_residents.remove(&previous.session);
            previous.outbox.close();
        }

        // Reconnect within the grace window: hand over undelivered
        // messages from the detached outbox. Stale perception frames are
        // discarded -- the first perception after reconnect must be the
        // live world, never a replay.
        if let Some((since, old_outbox)) = self.sessions.detached.remove(&resident) {
            let grace = Duration::from_secs_f64(self.config.session.reconnect_grace_secs);
            if since.elapsed() <= grace {
                while let Some(message) = old_outbox.try_pop() {
                    if !message.is_droppable() {
                        let _ = outbox.push(message);
                    }
                }
            }
        }

        let welcome = ServerMessage::Welcome {
            resident,
            passport: record.passport.clone(),
            name: record.preferred_name.clone(),
            world_time: self.clock.world_time(),
            spawned: record.arrived_at.is_some(),
        };
        let _ = outbox.push(welcome);

        self.sessions.players.insert(
            resident,
            PlayerSlot {
                session,
                outbox: Arc::clone(outbox),
            },
        );
        self.sessions.session_residents.insert(session, resident);
        debug!(%resident, %session, "player session attached");
    }

    fn detach(&mut self, session: SessionId) {
        let Some(resident) = self.sessions.session_residents.remove(&session) else {
            return;
        };
        if let Some(slot) = self.sessions.players.get(&resident)
            && slot.session == session
        {
            let slot = self.sessions.players.remove(&resident);
            if let Some(slot) = slot {
                // Keep the outbox for the reconnect grace window.
                self.sessions
                    .detached
                    .insert(resident, (Instant::now(), slot.outbox));
            }
            // Pending commands from the dead socket are discarded.
            self.pending.remove(&resident);
        }
        self.sessions.spectators.remove(&session);
    }

    /// Dispatch one command and route its outcome.
    fn process_command(
        &mut self,
        _session: SessionId,
        resident: ResidentId,
        envelope: CommandEnvelope,
    ) {
        let outcome = dispatcher::dispatch(
            &mut self.state,
            &self.config,
            self.clock.world_time(),
            resident,
            envelope,
        );

        self.push_to_player(resident, ServerMessage::ActionResult(outcome.result.clone()));
        for message in outcome.direct {
            self.push_to_player(resident, message);
        }
        for (target, message) in outcome.to_others {
            self.push_to_player(target, message);
        }
        for event in outcome.events {
            self.record_event(event);
        }

        if outcome.result.status == city_types::ActionStatus::Ok {
            self.persist_resident(resident);
        }

        if outcome.departed {
            if let Some(slot) = self.sessions.players.remove(&resident) {
                self.sessions.session_residents.remove(&slot.session);
                slot.outbox.close();
            }
        }
    }

    // -----------------------------------------------------------------
    // Position phase
    // -----------------------------------------------------------------

    /// One position sub-step: integrate movement intents and resolve
    /// collisions, deterministically in resident-id order.
    pub fn step_position(&mut self) {
        let dt = self.schedule.position_step();
        let hitbox = self.config.movement.resident_hitbox;
        let world_time = self.clock.world_time();
        let ids = self.state.active_ids();

        for id in ids {
            let Some(me) = self.state.resident(id) else {
                continue;
            };
            if me.sleeping || me.law.is_imprisoned(world_time) {
                continue;
            }

            let (from_x, from_y) = (me.x, me.y);
            let building = me.building;
            let intent = me.move_intent.clone();
            let (target, new_intent, speed) = match intent {
                MoveIntent::Idle => continue,
                MoveIntent::Direction { dx, dy, speed } => {
                    let velocity = self.speed_pixels(speed);
                    let step = velocity * dt;
                    (
                        (dx.mul_add(step, from_x), dy.mul_add(step, from_y)),
                        None,
                        speed,
                    )
                }
                MoveIntent::Waypoints { path, speed } => {
                    let Some(&(wx, wy)) = path.first() else {
                        if let Some(r) = self.state.resident_mut(id) {
                            r.move_intent = MoveIntent::Idle;
                        }
                        continue;
                    };
                    let velocity = self.speed_pixels(speed);
                    let step = velocity * dt;
                    let to_wp = (wx - from_x).hypot(wy - from_y);
                    if to_wp <= step.max(2.0) {
                        // Arrive at the waypoint and advance the path.
                        let mut remaining = path;
                        remaining.remove(0);
                        ((wx, wy), Some(remaining), speed)
                    } else {
                        let (dx, dy) = ((wx - from_x) / to_wp, (wy - from_y) / to_wp);
                        (
                            (dx.mul_add(step, from_x), dy.mul_add(step, from_y)),
                            None,
                            speed,
                        )
                    }
                }
            };

            let resolution = collision::resolve_movement(
                &self.state.map,
                from_x,
                from_y,
                target.0,
                target.1,
                hitbox,
            );

            // No two residents may overlap after resolution.
            let overlaps = self.state.residents.values().any(|other| {
                other.id != id
                    && other.is_active()
                    && other.building == building
                    && (other.x - resolution.x).hypot(other.y - resolution.y)
                        < hitbox * 2.0
            });
            let (final_x, final_y) = if overlaps {
                (from_x, from_y)
            } else {
                (resolution.x, resolution.y)
            };

            let moved = (final_x - from_x).hypot(final_y - from_y);
            let tile_size = f64::from(self.config.movement.tile_size);
            let Some(me) = self.state.resident_mut(id) else {
                continue;
            };
            me.x = final_x;
            me.y = final_y;
            if moved > f64::EPSILON {
                me.facing = (final_y - from_y)
                    .atan2(final_x - from_x)
                    .to_degrees()
                    .rem_euclid(360.0);
                city_residents::apply_energy_cost(
                    me,
                    moved / tile_size * activity_costs::WALK_PER_TILE,
                );
            }
            if let Some(remaining) = new_intent {
                me.move_intent = if remaining.is_empty() {
                    MoveIntent::Idle
                } else {
                    MoveIntent::Waypoints {
                        path: remaining,
                        speed,
                    }
                };
            }
        }
    }

    /// Pixels per real second for a pace.
    fn speed_pixels(&self, speed: MoveSpeed) -> f64 {
        match speed {
            MoveSpeed::Stop => 0.0,
            MoveSpeed::Walk => self.config.movement.walk_speed,
            MoveSpeed::Run => self.config.movement.run_speed,
        }
    }

    // -----------------------------------------------------------------
    // Simulation phase
    // -----------------------------------------------------------------

    /// One simulation sub-step: clock, needs, economy, deaths, trains.
    pub fn step_simulation(&mut self) {
        let game_dt = self.clock.advance(self.schedule.simulation_step());
        let world_time = self.clock.world_time();

        self.run_world_timers(world_time);
        self.run_needs(game_dt, world_time);
        self.run_employment(game_dt, world_time);
        self.run_policing(world_time);
        self.run_detector(world_time);
    }

    /// Trains, restocks, petition aging, forage regrowth.
    fn run_world_timers(&mut self, world_time: f64) {
        // Announce the train one minute of game time ahead.
        let until_train = self.state.next_train_at - world_time;
        if until_train <= 60.0 && !self.train_announced {
            self.train_announced = true;
            let passengers = u32::try_from(self.state.train_queue.len()).unwrap_or(u32::MAX);
            self.broadcast_players(ServerMessage::TrainArriving {
                arriving_in: until_train.max(0.0),
                passengers,
            });
        }
        if world_time >= self.state.next_train_at {
            self.train_announced = false;
            self.state.next_train_at = world_time + self.config.train.interval;
            let spawned = self
                .state
                .spawn_from_queue(world_time, self.config.movement.resident_hitbox);
            for id in spawned {
                let (name, x, y) = match self.state.resident(id) {
                    Some(r) => (r.preferred_name.clone(), r.x, r.y),
                    None => continue,
                };
                self.broadcast_players(ServerMessage::Spawn {
                    resident: id,
                    name: name.clone(),
                    x,
                    y,
                });
                self.record_event(
                    WorldEvent::new(EventKind::Arrival, world_time)
                        .with_resident(id)
                        .at(x, y)
                        .with_data(json!({ "name": name })),
                );
                self.persist_resident(id);
            }
        }

        if world_time - self.state.shop.last_restock
            >= self.config.economy.shop_restock_interval
        {
            self.state.shop.restock(world_time);
            for (item, stock) in self.state.shop.stock.clone() {
                self.enqueue_persist(PersistRequest::ShopStock {
                    item: item.as_db_str().to_owned(),
                    stock: i32::try_from(stock).unwrap_or(i32::MAX),
                });
            }
        }

        let max_age = self.config.civic.petition_max_age_hours * 3600.0;
        let closed = self.state.petitions.close_aged(world_time, max_age);
        for id in closed {
            let row = self
                .state
                .petitions
                .petitions
                .get(&id)
                .map(petition_row);
            if let Some(row) = row {
                self.enqueue_persist(PersistRequest::Petition(row));
            }
        }

        for node in self.state.forageables.values_mut() {
            let _ = node.regrow(world_time);
        }
    }

    /// Needs decay, accidents, collapses, deaths.
    fn run_needs(&mut self, game_dt: f64, world_time: f64) {
        let social_radius = self.config.perception.social_radius;
        let conversation_window = self.config.perception.conversation_window;
        let ids = self.state.active_ids();

        // Social proximity is computed against pre-tick positions.
        let positions: Vec<(ResidentId, f64, f64)> = ids
            .iter()
            .filter_map(|&id| self.state.resident(id).map(|r| (id, r.x, r.y)))
            .collect();

        for id in ids {
            let Some(me) = self.state.resident(id) else {
                continue;
            };
            let social_nearby = positions.iter().any(|&(other, x, y)| {
                other != id && (x - me.x).hypot(y - me.y) <= social_radius
            });
            let conversation_live = me.conversation_live(world_time, conversation_window);
            let has_bag = city_residents::inventory::has_usable(
                &me.inventory,
                city_types::ItemKind::SleepingBag,
            );

            let ctx = NeedsTickContext {
                game_dt,
                social_nearby,
                conversation_live,
                has_sleeping_bag: has_bag,
            };
            let config = self.config.needs.clone();
            let Some(me) = self.state.resident_mut(id) else {
                continue;
            };
            let was_sleeping = me.sleeping;
            let result = apply_needs_tick(me, &config, ctx);
            if me.sleeping && has_bag && !was_sleeping {
                // A sleeping bag wears with each sleep entered.
                let _ = city_residents::inventory::spend_use(
                    &mut me.inventory,
                    city_types::ItemKind::SleepingBag,
                );
            }

            if result.bladder_accident {
                let (x, y) = (me.x, me.y);
                me.notify("You could not hold it any longer.");
                self.record_event(
                    WorldEvent::new(EventKind::BladderAccident, world_time)
                        .with_resident(id)
                        .at(x, y),
                );
            }
            if result.collapsed {
                let Some(me) = self.state.resident_mut(id) else {
                    continue;
                };
                me.move_intent = MoveIntent::Idle;
                me.notify("Exhaustion takes you; you collapse where you stand.");
                let (x, y) = (me.x, me.y);
                self.record_event(
                    WorldEvent::new(EventKind::Collapse, world_time)
                        .with_resident(id)
                        .at(x, y),
                );
            }
            if let Some(cause) = result.death {
                self.handle_death(id, cause, world_time);
            }
        }
    }

    /// Shift accrual and wages.
    fn run_employment(&mut self, game_dt: f64, world_time: f64) {
        let ids = self.state.active_ids();
        for id in ids {
            let board = std::mem::take(&mut self.state.jobs);
            let complete = self
                .state
                .resident_mut(id)
                .and_then(|me| accrue_shift(me, &board, game_dt));
            self.state.jobs = board;

            if let Some(complete) = complete {
                if let Some(me) = self.state.resident_mut(id) {
                    me.notify(format!("Shift complete. Wage of {} paid.", complete.wage));
                }
                self.record_event(
                    WorldEvent::new(EventKind::ShiftComplete, world_time)
                        .with_resident(id)
                        .with_data(json!({
                            "job": complete.job_id,
                            "wage": complete.wage,
                        })),
                );
                self.persist_resident(id);
            }
        }
    }

    /// Loiter detection and sentence releases.
    fn run_policing(&mut self, world_time: f64) {
        let config = self.config.policing;
        let ids = self.state.active_ids();
        for id in ids {
            let newly_wanted = self
                .state
                .resident_mut(id)
                .is_some_and(|me| update_loiter(me, &config, world_time));
            if newly_wanted {
                if let Some(me) = self.state.resident_mut(id) {
                    me.notify("You are wanted for loitering.");
                    let (x, y) = (me.x, me.y);
                    self.record_event(
                        WorldEvent::new(EventKind::LawViolation, world_time)
                            .with_resident(id)
                            .at(x, y)
                            .with_data(json!({ "violation": "loitering" })),
                    );
                }
            }

            let released = self.state.resident_mut(id).is_some_and(|me| {
                if me
                    .law
                    .imprisoned_until
                    .is_some_and(|end| world_time >= end)
                {
                    me.law.imprisoned_until = None;
                    me.notify("Your sentence is served. You are free to go.");
                    true
                } else {
                    false
                }
            });
            if released {
                debug!(%id, "sentence served");
            }
        }
    }

    /// Edge-triggered need events and the pain channel.
    fn run_detector(&mut self, world_time: f64) {
        let signals = self
            .detector
            .observe(self.state.residents.values(), world_time);
        for signal in signals {
            match signal {
                DetectedSignal::NeedCritical {
                    resident,
                    need,
                    value,
                } => {
                    self.push_to_player(
                        resident,
                        ServerMessage::Event {
                            kind: String::from("need_critical"),
                            world_time,
                            data: json!({ "need": need.as_str(), "value": value }),
                        },
                    );
                }
                DetectedSignal::NeedRecovered {
                    resident,
                    need,
                    value,
                } => {
                    self.push_to_player(
                        resident,
                        ServerMessage::Event {
                            kind: String::from("need_recovered"),
                            world_time,
                            data: json!({ "need": need.as_str(), "value": value }),
                        },
                    );
                }
                DetectedSignal::Pain {
                    resident,
                    source,
                    intensity,
                    text,
                } => {
                    self.push_to_player(
                        resident,
                        ServerMessage::Pain {
                            source,
                            intensity,
                            text: text.to_owned(),
                        },
                    );
                }
            }
        }
    }

    /// Process a death: body, event, messages, session closure.
    fn handle_death(&mut self, id: ResidentId, cause: city_residents::DeathCause, world_time: f64) {
        let Some(me) = self.state.resident_mut(id) else {
            return;
        };
        let body = process_death(me, world_time);
        let (x, y) = (body.x, body.y);
        self.state.bodies.insert(id, body);
        self.state.jobs.assignments.remove(&id);

        warn!(%id, %cause, "resident died");
        self.record_event(
            WorldEvent::new(EventKind::Death, world_time)
                .with_resident(id)
                .at(x, y)
                .with_data(json!({ "cause": cause.to_string() })),
        );
        self.persist_resident(id);

        self.push_to_player(
            id,
            ServerMessage::Death {
                cause: cause.to_string(),
            },
        );
        if let Some(slot) = self.sessions.players.remove(&id) {
            self.sessions.session_residents.remove(&slot.session);
            slot.outbox.close();
        }
        let spectator_sessions: Vec<SessionId> = self
            .sessions
            .spectators
            .iter()
            .filter(|(_, (followed, _))| *followed == id)
            .map(|(session, _)| *session)
            .collect();
        for session in spectator_sessions {
            if let Some((_, outbox)) = self.sessions.spectators.remove(&session) {
                outbox.close();
            }
            self.sessions.session_residents.remove(&session);
        }
    }

    // -----------------------------------------------------------------
    // Perception phase
    // -----------------------------------------------------------------

    /// Build and deliver one perception update per streamed resident,
    /// then flush the speech window and refresh the public snapshot.
    pub fn run_perception(&mut self) {
        self.perception_tick = self.perception_tick.saturating_add(1);
        let tick = self.perception_tick;
        let world_time = self.clock.world_time();
        let time_of_day = self.clock.time_of_day().to_owned();
        let speech = std::mem::take(&mut self.state.speech_window);

        for id in self.sessions.streamed_residents() {
            let Some(update) = build_perception(
                &mut self.state,
                id,
                tick,
                world_time,
                &time_of_day,
                &self.config.perception,
                &self.config.movement,
                &speech,
            ) else {
                continue;
            };
            let message = ServerMessage::Perception(update);
            if let Some(outbox) = self.sessions.player_outbox(id) {
                let _ = outbox.push(message.clone());
            }
            for outbox in self.sessions.spectator_outboxes(id) {
                let _ = outbox.push(message.clone());
            }
        }

        // Refresh the read-only projection between ticks; skip rather
        // than block when a reader holds the lock.
        if let Ok(mut snapshot) = self.snapshot.try_write() {
            *snapshot = self
                .state
                .public_snapshot(world_time, self.clock.day_number());
        }

        // Expire detached outboxes past the reconnect grace.
        let grace = Duration::from_secs_f64(self.config.session.reconnect_grace_secs);
        self.sessions
            .detached
            .retain(|_, (since, _)| since.elapsed() <= grace);
    }

    // -----------------------------------------------------------------
    // Persistence & routing
    // -----------------------------------------------------------------

    /// Queue a persist request; a full queue halts the engine.
    fn enqueue_persist(&mut self, request: PersistRequest) {
        if !self.persist.enqueue(request) && !self.persist_halted {
            self.persist_halted = true;
            self.announce("persistence backlog; the city is paused");
        }
    }

    /// Record an event everywhere it goes: store, feed, involved sessions.
    fn record_event(&mut self, event: WorldEvent) {
        self.enqueue_persist(PersistRequest::Event(event.clone()));

        for involved in [event.resident, event.target].into_iter().flatten() {
            self.push_to_player(
                involved,
                ServerMessage::Event {
                    kind: event.kind.as_str().to_owned(),
                    world_time: event.world_time,
                    data: event.data.clone(),
                },
            );
        }

        // Follow-on rows derived from the event kind.
        match event.kind {
            EventKind::Buy => {
                for (item, stock) in self.state.shop.stock.clone() {
                    self.enqueue_persist(PersistRequest::ShopStock {
                        item: item.as_db_str().to_owned(),
                        stock: i32::try_from(stock).unwrap_or(i32::MAX),
                    });
                }
            }
            EventKind::WritePetition | EventKind::VotePetition => {
                let rows: Vec<PetitionRow> = self
                    .state
                    .petitions
                    .petitions
                    .values()
                    .map(petition_row)
                    .collect();
                for row in rows {
                    self.enqueue_persist(PersistRequest::Petition(row));
                }
                if event.kind == EventKind::VotePetition
                    && let (Some(resident), Some(petition)) = (
                        event.resident,
                        event.data.get("petition").and_then(|v| {
                            serde_json::from_value::<city_types::PetitionId>(v.clone()).ok()
                        }),
                    )
                {
                    let approve = event
                        .data
                        .get("approve")
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false);
                    self.enqueue_persist(PersistRequest::Vote {
                        petition: petition.into_inner(),
                        resident: resident.into_inner(),
                        approve,
                    });
                }
            }
            EventKind::ApplyJob | EventKind::QuitJob => {
                if let Some(resident) = event.resident {
                    let job = self.state.jobs.assignments.get(&resident).copied();
                    self.enqueue_persist(PersistRequest::JobAssignment {
                        resident: resident.into_inner(),
                        job: job.map(city_types::JobId::into_inner),
                    });
                }
            }
            _ => {}
        }

        if event.resident.is_some()
            && let Some(target) = event.target
            && event.resident != Some(target)
        {
            self.persist_resident(target);
        }

        self.state.record_feed(event);
    }

    /// Queue an upsert of one resident's durable row.
    fn persist_resident(&mut self, id: ResidentId) {
        let Some(resident) = self.state.resident(id) else {
            return;
        };
        let job = self.state.jobs.assignments.get(&id).copied();
        let row = resident_row(resident, job);
        self.enqueue_persist(PersistRequest::Resident(Box::new(row)));
    }

    /// Push a message to a resident's player session, if connected.
    fn push_to_player(&self, resident: ResidentId, message: ServerMessage) {
        if let Some(outbox) = self.sessions.player_outbox(resident) {
            let _ = outbox.push(message);
        }
    }

    /// Push a message to every connected player session.
    fn broadcast_players(&self, message: ServerMessage) {
        for slot in self.sessions.players.values() {
            let _ = slot.outbox.push(message.clone());
        }
    }

    /// Operator announcement to every session, players and spectators.
    fn announce(&self, text: &str) {
        let message = ServerMessage::SystemAnnouncement {
            text: text.to_owned(),
        };
        for slot in self.sessions.players.values() {
            let _ = slot.outbox.push(message.clone());
        }
        for (_, outbox) in self.sessions.spectators.values() {
            let _ = outbox.push(message.clone());
        }
        info!(text, "system announcement");
    }

    /// Periodic checkpoint at an inter-phase boundary.
    fn maybe_checkpoint(&mut self) {
        let interval = Duration::from_secs(self.config.persistence.checkpoint_interval_secs);
        if self.last_checkpoint.elapsed() < interval {
            return;
        }
        self.last_checkpoint = Instant::now();

        let alive = i32::try_from(self.state.alive_count()).unwrap_or(i32::MAX);
        self.enqueue_persist(PersistRequest::Checkpoint(CheckpointRow {
            world_time: self.clock.world_time(),
            alive,
        }));
        let ids: Vec<ResidentId> = self.state.residents.keys().copied().collect();
        for id in ids {
            self.persist_resident(id);
        }
        debug!(world_time = self.clock.world_time(), "checkpoint queued");
    }

    /// Close sessions whose outboxes have overflowed for too long.
    fn close_overflowed_sessions(&mut self) {
        let limit = Duration::from_secs_f64(self.config.session.overflow_close_secs);
        let overflowed: Vec<ResidentId> = self
            .sessions
            .players
            .iter()
            .filter(|(_, slot)| {
                slot.outbox.overflowed_for().is_some_and(|d| d > limit)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in overflowed {
            if let Some(slot) = self.sessions.players.remove(&id) {
                warn!(resident = %id, "closing session after sustained outbox overflow");
                self.sessions.session_residents.remove(&slot.session);
                slot.outbox.close();
            }
        }
    }

    /// Cooperative shutdown: final checkpoint, close every session.
    fn flush_on_shutdown(&mut self) {
        let alive = i32::try_from(self.state.alive_count()).unwrap_or(i32::MAX);
        let _ = self.persist.enqueue(PersistRequest::Checkpoint(CheckpointRow {
            world_time: self.clock.world_time(),
            alive,
        }));
        let ids: Vec<ResidentId> = self.state.residents.keys().copied().collect();
        for id in ids {
            self.persist_resident(id);
        }
        for slot in self.sessions.players.values() {
            slot.outbox.close();
        }
        for (_, outbox) in self.sessions.spectators.values() {
            outbox.close();
        }
    }
}

/// Project a resident onto their durable row.
fn resident_row(resident: &Resident, job: Option<city_types::JobId>) -> ResidentRow {
    ResidentRow {
        id: resident.id.into_inner(),
        passport: resident.passport.clone(),
        full_name: resident.full_name.clone(),
        preferred_name: resident.preferred_name.clone(),
        origin: resident.origin.clone(),
        kind: resident.kind.as_db_str().to_owned(),
        status: match resident.status {
            city_types::ResidentStatus::Alive => String::from("alive"),
            city_types::ResidentStatus::Deceased => String::from("deceased"),
            city_types::ResidentStatus::Departed => String::from("departed"),
        },
        x: resident.x,
        y: resident.y,
        wallet: resident.wallet,
        hunger: resident.needs.hunger,
        thirst: resident.needs.thirst,
        energy: resident.needs.energy,
        bladder: resident.needs.bladder,
        health: resident.needs.health,
        social: resident.needs.social,
        arrived_at: resident.arrived_at,
        registered_at: resident.registered_at,
        inventory: resident
            .inventory
            .iter()
            .map(|entry| city_db::InventoryItemRow {
                item: entry.item.as_db_str().to_owned(),
                quantity: i32::try_from(entry.quantity).unwrap_or(i32::MAX),
                remaining_uses: entry
                    .remaining_uses
                    .map(|uses| i32::try_from(uses).unwrap_or(i32::MAX)),
            })
            .collect(),
        job_id: job.map(city_types::JobId::into_inner),
    }
}

/// Project a petition onto its durable row.
fn petition_row(petition: &city_types::PetitionRecord) -> PetitionRow {
    PetitionRow {
        id: petition.id.into_inner(),
        author_id: petition.author.into_inner(),
        category: petition.category.clone(),
        description: petition.description.clone(),
        status: match petition.status {
            city_types::PetitionStatus::Open => String::from("open"),
            city_types::PetitionStatus::Closed => String::from("closed"),
        },
        votes_for: i32::try_from(petition.votes_for).unwrap_or(i32::MAX),
        votes_against: i32::try_from(petition.votes_against).unwrap_or(i32::MAX),
        opened_at: petition.opened_at,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use city_db::{spawn_writer, MemoryRepository};
    use city_residents::{default_jobs, JobBoard};
    use city_types::{Appearance, ResidentKind};
    use city_world::{create_starting_map, default_forageables};

    use super::*;

    fn test_engine() -> (Engine, EngineHandle) {
        let (map, ids) = create_starting_map().unwrap();
        let jobs = JobBoard::with_jobs(default_jobs(
            ids.shop,
            ids.hall,
            ids.police,
            ids.mortuary,
        ));
        let state = WorldState::new(
            map,
            default_forageables(),
            jobs,
            city_residents::default_laws(),
            900.0,
        );
        let config = CityConfig::default();
        let clock = WorldClock::new(config.world.time_scale).unwrap();
        let (persist, _join) = spawn_writer(MemoryRepository::new(), 1024);
        let (engine, handle, _shutdown, _snapshot) =
            Engine::new(state, clock, config, persist).unwrap();
        (engine, handle)
    }

    fn registered(name: &str) -> Resident {
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

    fn drain_messages(outbox: &SessionOutbox) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Some(message) = outbox.try_pop() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn admitted_resident_spawns_with_the_train() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        assert!(handle.try_send(EngineCommand::Admit {
            resident: Box::new(resident),
        }));
        engine.drain_inbound();
        assert_eq!(engine.state.train_queue.len(), 1);

        // Bring the train forward and run one simulation step.
        engine.state.next_train_at = 0.0;
        engine.step_simulation();
        assert!(engine.state.train_queue.is_empty());
        assert!(engine.state.resident(id).unwrap().is_active());
    }

    #[tokio::test]
    async fn attach_welcomes_and_commands_flow() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let session = SessionId::new();
        let outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session,
            resident: id,
            outbox: Arc::clone(&outbox),
        }));
        engine.drain_inbound();
        let messages = drain_messages(&outbox);
        assert!(matches!(
            messages.first(),
            Some(ServerMessage::Welcome { .. })
        ));

        // A speak command produces exactly one action result.
        assert!(handle.try_send(EngineCommand::Command {
            session,
            resident: id,
            envelope: CommandEnvelope {
                request_id: Some(String::from("r1")),
                command: city_types::ClientCommand::Speak {
                    text: String::from("hello"),
                    volume: city_types::SpeechVolume::Normal,
                    to: None,
                },
            },
        }));
        engine.drain_inbound();
        let messages = drain_messages(&outbox);
        let results: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::ActionResult(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results.first().unwrap().request_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn flood_beyond_tick_bound_is_refused() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let session = SessionId::new();
        let outbox = Arc::new(SessionOutbox::new(256));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session,
            resident: id,
            outbox: Arc::clone(&outbox),
        }));
        engine.drain_inbound();
        let _ = drain_messages(&outbox);

        let bound = engine.config.session.inbound_per_tick;
        let total = bound + 3;
        for _ in 0..total {
            assert!(handle.try_send(EngineCommand::Command {
                session,
                resident: id,
                envelope: CommandEnvelope {
                    request_id: None,
                    command: city_types::ClientCommand::Stop,
                },
            }));
        }
        engine.drain_inbound();
        let messages = drain_messages(&outbox);
        let errors = messages
            .iter()
            .filter(|m| {
                matches!(
                    m,
                    ServerMessage::ActionResult(r)
                        if r.status == city_types::ActionStatus::Error
                )
            })
            .count();
        assert_eq!(errors, 3);
    }

    #[tokio::test]
    async fn spectator_matches_player_perception() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let player_outbox = Arc::new(SessionOutbox::new(64));
        let spectator_outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session: SessionId::new(),
            resident: id,
            outbox: Arc::clone(&player_outbox),
        }));
        assert!(handle.try_send(EngineCommand::AttachSpectator {
            session: SessionId::new(),
            resident: id,
            outbox: Arc::clone(&spectator_outbox),
        }));
        engine.drain_inbound();
        let _ = drain_messages(&player_outbox);

        engine.run_perception();

        let player_perception = drain_messages(&player_outbox)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::Perception(p) => Some(p),
                _ => None,
            })
            .unwrap();
        let spectator_perception = drain_messages(&spectator_outbox)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::Perception(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(player_perception, spectator_perception);
    }

    #[tokio::test]
    async fn spectator_commands_are_rejected_not_applied() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let spectator_session = SessionId::new();
        let spectator_outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachSpectator {
            session: spectator_session,
            resident: id,
            outbox: Arc::clone(&spectator_outbox),
        }));
        engine.drain_inbound();

        let before = engine.state.resident(id).unwrap().clone();
        assert!(handle.try_send(EngineCommand::Command {
            session: spectator_session,
            resident: id,
            envelope: CommandEnvelope {
                request_id: None,
                command: city_types::ClientCommand::Move {
                    dx: 1.0,
                    dy: 0.0,
                    speed: MoveSpeed::Run,
                },
            },
        }));
        engine.drain_inbound();

        let messages = drain_messages(&spectator_outbox);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::Error { reason } if reason == "validation_failed")));
        // The resident's intent is untouched.
        assert_eq!(
            engine.state.resident(id).unwrap().move_intent,
            before.move_intent
        );
    }

    #[tokio::test]
    async fn death_notifies_and_closes_the_session() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session: SessionId::new(),
            resident: id,
            outbox: Arc::clone(&outbox),
        }));
        engine.drain_inbound();
        let _ = drain_messages(&outbox);

        {
            let me = engine.state.resident_mut(id).unwrap();
            me.needs.health = 0.0001;
            me.needs.hunger = 0.0;
        }
        engine.step_simulation();

        assert!(engine.state.resident(id).unwrap().is_dead());
        assert!(engine.state.bodies.contains_key(&id));
        let messages = drain_messages(&outbox);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::Death { cause } if cause == "starvation")));
        assert!(outbox.is_closed());
    }

    #[tokio::test]
    async fn reconnect_within_grace_hands_over_undelivered_messages() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let first_session = SessionId::new();
        let first_outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session: first_session,
            resident: id,
            outbox: Arc::clone(&first_outbox),
        }));
        engine.drain_inbound();
        let _ = drain_messages(&first_outbox);

        // Queue something undelivered, then drop the socket.
        engine.push_to_player(
            id,
            ServerMessage::SystemAnnouncement {
                text: String::from("hold this thought"),
            },
        );
        assert!(handle.try_send(EngineCommand::Detach {
            session: first_session,
        }));
        engine.drain_inbound();
        assert!(engine.sessions.detached.contains_key(&id));

        // Reconnect with a fresh session: the queued message survives
        // ahead of the new welcome, and the world is live, not a replay.
        let second_outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session: SessionId::new(),
            resident: id,
            outbox: Arc::clone(&second_outbox),
        }));
        engine.drain_inbound();
        let messages = drain_messages(&second_outbox);
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::SystemAnnouncement { text } if text == "hold this thought"
        )));
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::Welcome { .. })));
        assert!(!engine.sessions.detached.contains_key(&id));

        engine.run_perception();
        let perception = drain_messages(&second_outbox)
            .into_iter()
            .find(|m| matches!(m, ServerMessage::Perception(_)));
        assert!(perception.is_some());
    }

    #[tokio::test]
    async fn reconnect_never_replays_stale_perception() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let first_session = SessionId::new();
        let first_outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session: first_session,
            resident: id,
            outbox: Arc::clone(&first_outbox),
        }));
        engine.drain_inbound();
        let _ = drain_messages(&first_outbox);

        // A perception tick lands in the queue and is never drained (the
        // socket dropped before the writer got to it), alongside one
        // critical message.
        engine.run_perception();
        engine.push_to_player(
            id,
            ServerMessage::SystemAnnouncement {
                text: String::from("keep me"),
            },
        );
        assert!(handle.try_send(EngineCommand::Detach {
            session: first_session,
        }));
        engine.drain_inbound();

        let second_outbox = Arc::new(SessionOutbox::new(64));
        assert!(handle.try_send(EngineCommand::AttachPlayer {
            session: SessionId::new(),
            resident: id,
            outbox: Arc::clone(&second_outbox),
        }));
        engine.drain_inbound();

        // The critical message survives; the stale perception does not.
        let handed_over = drain_messages(&second_outbox);
        assert!(handed_over.iter().any(|m| matches!(
            m,
            ServerMessage::SystemAnnouncement { text } if text == "keep me"
        )));
        assert!(!handed_over
            .iter()
            .any(|m| matches!(m, ServerMessage::Perception(_))));

        // The first perception after reconnect is a fresh, later tick.
        engine.run_perception();
        let fresh = drain_messages(&second_outbox)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::Perception(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(fresh.tick, 2);
    }

    #[tokio::test]
    async fn movement_intent_moves_the_resident() {
        let (mut engine, handle) = test_engine();
        let resident = registered("AAA01");
        let id = resident.id;
        handle
            .send(EngineCommand::Admit {
                resident: Box::new(resident),
            })
            .await;
        engine.drain_inbound();
        engine.state.next_train_at = 0.0;
        engine.step_simulation();

        let start_x = engine.state.resident(id).unwrap().x;
        {
            let me = engine.state.resident_mut(id).unwrap();
            me.move_intent = MoveIntent::Direction {
                dx: 1.0,
                dy: 0.0,
                speed: MoveSpeed::Walk,
            };
        }
        for _ in 0..30 {
            engine.step_position();
        }
        let end_x = engine.state.resident(id).unwrap().x;
        // One second of walking at 60 px/s.
        assert!((end_x - start_x - 60.0).abs() < 1.0, "moved {}", end_x - start_x);
        // Walking a couple of tiles cost energy.
        assert!(engine.state.resident(id).unwrap().needs.energy < 100.0);
    }
}
