//! Per-tick physiological mechanics: decay, drains, recovery, sleep.
//!
//! Applied by the simulation phase once per tick with the elapsed game
//! time `game_dt`. All rates are per game-second so the same numbers hold
//! at any `TIME_SCALE`.
//!
//! # Order of operations
//!
//! 1. Hunger and thirst decay (reduced by social proximity/conversation)
//! 2. Bladder fill, with the accident at 100
//! 3. Energy: passive decay awake, recovery asleep, collapse at 0
//! 4. Social decay or proximity recovery
//! 5. Health drains while hunger or thirst sit at 0 (additive)
//! 6. Health recovery when every need is comfortable
//! 7. Clamp, then the death check

use serde::{Deserialize, Serialize};

use crate::death::{check_death, DeathCause};
use crate::resident::Resident;

/// Energy debits charged by the dispatcher per activity.
pub mod activity_costs {
    /// Per tile actually moved.
    pub const WALK_PER_TILE: f64 = 0.5;
    /// Per speech act.
    pub const SPEAK: f64 = 0.2;
    /// Eating or drinking.
    pub const CONSUME: f64 = 0.1;
    /// Using a toilet.
    pub const USE_TOILET: f64 = 0.1;
    /// Casting a petition vote.
    pub const VOTE: f64 = 0.3;
    /// Authoring a petition.
    pub const WRITE_PETITION: f64 = 1.0;
    /// Harvesting a forageable node.
    pub const FORAGE: f64 = 0.5;
}

/// Tunable rates for the needs engine. Every rate is per game-second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedsConfig {
    /// Hunger decay: empty after 16 game-hours.
    pub hunger_decay: f64,
    /// Thirst decay: empty after 8 game-hours.
    pub thirst_decay: f64,
    /// Bladder fill: desperate after 8 game-hours.
    pub bladder_fill: f64,
    /// Passive energy decay while awake.
    pub energy_decay: f64,
    /// Social decay while isolated.
    pub social_decay: f64,
    /// Health drain while hunger is empty.
    pub health_drain_hunger: f64,
    /// Health drain while thirst is empty.
    pub health_drain_thirst: f64,
    /// Health recovery when all needs are comfortable.
    pub health_recovery: f64,
    /// Energy recovery while sleeping rough.
    pub sleep_recovery: f64,
    /// Energy recovery while sleeping with a usable sleeping bag.
    pub sleep_recovery_bag: f64,
    /// Hunger/thirst decay multiplier near another living resident.
    pub proximity_decay_factor: f64,
    /// Additional multiplier while a conversation is live.
    pub conversation_decay_factor: f64,
    /// Energy recovery while a conversation is live.
    pub conversation_energy_recovery: f64,
    /// Social recovery while near another living resident.
    pub social_proximity_recovery: f64,
    /// Needs must exceed this for health to recover.
    pub recovery_threshold: f64,
    /// Bladder must sit below this for health to recover.
    pub recovery_bladder_limit: f64,
    /// Cannot fall asleep voluntarily above this energy.
    pub sleep_energy_limit: f64,
    /// Cannot wake from a collapse below this energy.
    pub collapse_wake_energy: f64,
    /// Health debited by a bladder accident.
    pub bladder_accident_damage: f64,
}

impl Default for NeedsConfig {
    fn default() -> Self {
        Self {
            hunger_decay: 100.0 / (16.0 * 3600.0),
            thirst_decay: 100.0 / (8.0 * 3600.0),
            bladder_fill: 100.0 / (8.0 * 3600.0),
            energy_decay: 2.0 / 3600.0,
            social_decay: 100.0 / (24.0 * 3600.0),
            health_drain_hunger: 5.0 / 3600.0,
            health_drain_thirst: 8.0 / 3600.0,
            health_recovery: 2.0 / 3600.0,
            sleep_recovery: 40.0 / 3600.0,
            sleep_recovery_bag: 60.0 / 3600.0,
            proximity_decay_factor: 0.85,
            conversation_decay_factor: 0.70,
            conversation_energy_recovery: 1.0 / 3600.0,
            social_proximity_recovery: 2.0 / 3600.0,
            recovery_threshold: 30.0,
            recovery_bladder_limit: 70.0,
            sleep_energy_limit: 90.0,
            collapse_wake_energy: 10.0,
            bladder_accident_damage: 2.0,
        }
    }
}

/// Social context computed by the simulation phase before the needs tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeedsTickContext {
    /// Elapsed game-seconds this tick.
    pub game_dt: f64,
    /// Another living resident is within the social radius.
    pub social_nearby: bool,
    /// A directed-speech conversation is live.
    pub conversation_live: bool,
    /// A sleeping bag with remaining uses is in inventory.
    pub has_sleeping_bag: bool,
}

/// What the needs tick did beyond plain decay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeedsTickResult {
    /// The resident died this tick.
    pub death: Option<DeathCause>,
    /// The resident collapsed into involuntary sleep this tick.
    pub collapsed: bool,
    /// The bladder overflowed this tick.
    pub bladder_accident: bool,
}

/// Apply one simulation tick of needs mechanics.
///
/// Does nothing for dead residents. The caller supplies the social
/// context; this function never inspects other residents.
pub fn apply_needs_tick(
    resident: &mut Resident,
    config: &NeedsConfig,
    ctx: NeedsTickContext,
) -> NeedsTickResult {
    if resident.is_dead() {
        return NeedsTickResult::default();
    }

    let dt = ctx.game_dt;
    let mut result = NeedsTickResult::default();

    // 1. Hunger and thirst, with social modifiers.
    let mut factor = 1.0;
    if ctx.social_nearby {
        factor *= config.proximity_decay_factor;
    }
    if ctx.conversation_live {
        factor *= config.conversation_decay_factor;
        resident.needs.energy += config.conversation_energy_recovery * dt;
    }
    resident.needs.hunger -= config.hunger_decay * factor * dt;
    resident.needs.thirst -= config.thirst_decay * factor * dt;

    // 2. Bladder.
    resident.needs.bladder += config.bladder_fill * dt;
    if resident.needs.bladder >= 100.0 {
        resident.needs.bladder = 0.0;
        resident.needs.health -= config.bladder_accident_damage;
        result.bladder_accident = true;
    }

    // 3. Energy.
    if resident.sleeping {
        let rate = if ctx.has_sleeping_bag {
            config.sleep_recovery_bag
        } else {
            config.sleep_recovery
        };
        resident.needs.energy += rate * dt;
    } else {
        resident.needs.energy -= config.energy_decay * dt;
        if resident.needs.energy <= 0.0 {
            resident.sleeping = true;
            resident.collapsed = true;
            result.collapsed = true;
        }
    }

    // 4. Social.
    if ctx.social_nearby || ctx.conversation_live {
        resident.needs.social += config.social_proximity_recovery * dt;
    } else {
        resident.needs.social -= config.social_decay * dt;
    }

    // 5. Health drains, additive.
    if resident.needs.hunger <= 0.0 {
        resident.needs.health -= config.health_drain_hunger * dt;
    }
    if resident.needs.thirst <= 0.0 {
        resident.needs.health -= config.health_drain_thirst * dt;
    }

    // 6. Health recovery.
    let comfortable = resident.needs.hunger > config.recovery_threshold
        && resident.needs.thirst > config.recovery_threshold
        && resident.needs.energy > config.recovery_threshold
        && resident.needs.social > config.recovery_threshold
        && resident.needs.bladder < config.recovery_bladder_limit;
    if comfortable {
        resident.needs.health += config.health_recovery * dt;
    }

    // 7. Clamp, then the death check.
    resident.needs.clamp_all();
    result.death = check_death(&resident.needs);

    result
}

/// Debit an activity energy cost, flooring at zero. The collapse check
/// runs on the next needs tick rather than here.
pub const fn apply_energy_cost(resident: &mut Resident, cost: f64) {
    resident.needs.energy = (resident.needs.energy - cost).clamp(0.0, 100.0);
}

/// Consume one unit of an item's nutrition into the needs.
pub const fn apply_nutrition(resident: &mut Resident, item: city_types::ItemKind) {
    resident.needs.hunger =
        (resident.needs.hunger + item.hunger_restore()).clamp(0.0, 100.0);
    resident.needs.thirst =
        (resident.needs.thirst + item.thirst_restore()).clamp(0.0, 100.0);
    resident.needs.energy =
        (resident.needs.energy + item.energy_restore()).clamp(0.0, 100.0);
}
