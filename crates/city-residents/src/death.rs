//! Death conditions and consequences for residents.
//!
//! A resident dies when health reaches 0. The proximate cause is read off
//! the needs: an empty hunger bar means starvation, an empty thirst bar
//! dehydration, anything else is recorded as injury. When both bars are
//! empty the death is recorded as starvation.
//!
//! On death the resident's status flips to `Deceased` and a body object
//! takes their place in the world, eligible for the mortuary bounty.

use city_types::{BodyRecord, ResidentStatus};

use crate::resident::{Needs, Resident};

/// The cause of a resident's death.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeathCause {
    /// Health drained to 0 while hunger sat empty.
    Starvation,
    /// Health drained to 0 while thirst sat empty.
    Dehydration,
    /// Health reached 0 from accumulated damage (accidents, policing).
    Injury,
}

impl core::fmt::Display for DeathCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Starvation => write!(f, "starvation"),
            Self::Dehydration => write!(f, "dehydration"),
            Self::Injury => write!(f, "injury"),
        }
    }
}

/// Check whether the needs meet the death condition.
///
/// Returns `Some(cause)` at zero health, `None` otherwise. Inspects only
/// the current values -- it never mutates.
pub fn check_death(needs: &Needs) -> Option<DeathCause> {
    if needs.health > 0.0 {
        return None;
    }
    if needs.hunger <= 0.0 {
        return Some(DeathCause::Starvation);
    }
    if needs.thirst <= 0.0 {
        return Some(DeathCause::Dehydration);
    }
    Some(DeathCause::Injury)
}

/// Flip a resident to `Deceased` and produce their body object.
///
/// The caller inserts the body into world state and emits the death
/// event; this function only performs the entity transition.
pub fn process_death(resident: &mut Resident, world_time: f64) -> BodyRecord {
    resident.status = ResidentStatus::Deceased;
    resident.sleeping = false;
    resident.move_intent = crate::resident::MoveIntent::Idle;
    resident.employment = None;

    BodyRecord {
        resident: resident.id,
        name: resident.preferred_name.clone(),
        x: resident.x,
        y: resident.y,
        died_at: world_time,
        carried_by: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use city_types::{Appearance, ResidentId, ResidentKind};

    use super::*;

    fn test_resident() -> Resident {
        Resident::register(
            ResidentId::new(),
            String::from("CITY-TEST1"),
            String::from("Test Resident"),
            String::from("Test"),
            String::from("Nowhere"),
            ResidentKind::Agent,
            Appearance::default(),
        )
    }

    #[test]
    fn alive_above_zero_health() {
        let mut needs = Needs::fresh();
        needs.health = 0.5;
        assert!(check_death(&needs).is_none());
    }

    #[test]
    fn cause_prefers_starvation() {
        let mut needs = Needs::fresh();
        needs.health = 0.0;
        needs.hunger = 0.0;
        needs.thirst = 0.0;
        assert_eq!(check_death(&needs), Some(DeathCause::Starvation));
    }

    #[test]
    fn dehydration_when_only_thirst_empty() {
        let mut needs = Needs::fresh();
        needs.health = 0.0;
        needs.thirst = 0.0;
        assert_eq!(check_death(&needs), Some(DeathCause::Dehydration));
    }

    #[test]
    fn injury_when_needs_are_fed() {
        let mut needs = Needs::fresh();
        needs.health = 0.0;
        assert_eq!(check_death(&needs), Some(DeathCause::Injury));
    }

    #[test]
    fn death_leaves_a_body_in_place() {
        let mut r = test_resident();
        r.spawn_at(320.0, 400.0, 100.0);
        r.needs.health = 0.0;
        let body = process_death(&mut r, 250.0);
        assert!(r.is_dead());
        assert_eq!(body.resident, r.id);
        assert!((body.x - 320.0).abs() < f64::EPSILON);
        assert!((body.died_at - 250.0).abs() < f64::EPSILON);
        assert!(body.carried_by.is_none());
    }
}
