//! The event detector and pain channel.
//!
//! Observes per-tick before/after need values and derives narrative
//! signals without mutating world state: `need_critical` on the downward
//! crossing of 10, `need_recovered` on the return above 30, and pain
//! messages from a fixed narrative library with per-source pacing.
//! Death is detected by the simulation phase itself (it owns the state
//! transition); this module only watches the scalars.

use std::collections::BTreeMap;

use city_residents::{Needs, Resident};
use city_types::{NeedKind, PainIntensity, PainSource, ResidentId};

/// Downward crossing that makes a need critical.
pub const CRITICAL_THRESHOLD: f64 = 10.0;

/// Upward crossing that recovers a critical need.
pub const RECOVERED_THRESHOLD: f64 = 30.0;

/// Minimum game-seconds between pain messages per source.
pub const PAIN_GAP: f64 = 30.0;

/// A derived signal for one resident.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectedSignal {
    /// A need crossed below the critical threshold.
    NeedCritical {
        /// The resident.
        resident: ResidentId,
        /// Which need.
        need: NeedKind,
        /// The value after the crossing.
        value: f64,
    },
    /// A previously critical need returned above the recovery threshold.
    NeedRecovered {
        /// The resident.
        resident: ResidentId,
        /// Which need.
        need: NeedKind,
        /// The value after the crossing.
        value: f64,
    },
    /// A pain message.
    Pain {
        /// The resident.
        resident: ResidentId,
        /// The failing source.
        source: PainSource,
        /// Message intensity.
        intensity: PainIntensity,
        /// Narrative text from the library.
        text: &'static str,
    },
}

/// Watches needs across ticks and emits edge-triggered signals.
#[derive(Debug, Default)]
pub struct EventDetector {
    /// Needs at the end of the previous observation per resident.
    previous: BTreeMap<ResidentId, Needs>,
    /// Needs currently flagged critical, per (resident, need).
    critical: BTreeMap<(ResidentId, NeedKind), bool>,
    /// Game-time of the last pain message per (resident, source).
    last_pain: BTreeMap<(ResidentId, PainSource), f64>,
}

impl EventDetector {
    /// Create an empty detector.
    pub const fn new() -> Self {
        Self {
            previous: BTreeMap::new(),
            critical: BTreeMap::new(),
            last_pain: BTreeMap::new(),
        }
    }

    /// Observe all living residents after a simulation tick.
    pub fn observe<'a>(
        &mut self,
        residents: impl Iterator<Item = &'a Resident>,
        world_time: f64,
    ) -> Vec<DetectedSignal> {
        let mut signals = Vec::new();

        for resident in residents {
            if resident.is_dead() {
                self.previous.remove(&resident.id);
                continue;
            }

            let current = resident.needs;
            if let Some(previous) = self.previous.get(&resident.id).copied() {
                for (need, before, after) in need_pairs(&previous, &current) {
                    // Edge into critical.
                    if before >= CRITICAL_THRESHOLD
                        && after < CRITICAL_THRESHOLD
                        && !self.is_critical(resident.id, need)
                    {
                        self.critical.insert((resident.id, need), true);
                        signals.push(DetectedSignal::NeedCritical {
                            resident: resident.id,
                            need,
                            value: after,
                        });
                    }
                    // Edge out of critical.
                    if after > RECOVERED_THRESHOLD && self.is_critical(resident.id, need) {
                        self.critical.insert((resident.id, need), false);
                        signals.push(DetectedSignal::NeedRecovered {
                            resident: resident.id,
                            need,
                            value: after,
                        });
                    }
                }
            }

            // Pain messages are level-triggered with per-source pacing.
            for (source, value) in pain_values(&current) {
                let Some(intensity) = pain_intensity(value) else {
                    continue;
                };
                let key = (resident.id, source);
                let due = self
                    .last_pain
                    .get(&key)
                    .is_none_or(|&last| world_time - last >= PAIN_GAP);
                if due {
                    self.last_pain.insert(key, world_time);
                    signals.push(DetectedSignal::Pain {
                        resident: resident.id,
                        source,
                        intensity,
                        text: pain_text(source, intensity),
                    });
                }
            }

            self.previous.insert(resident.id, current);
        }

        signals
    }

    fn is_critical(&self, resident: ResidentId, need: NeedKind) -> bool {
        self.critical.get(&(resident, need)).copied().unwrap_or(false)
    }
}

/// The needs watched for critical/recovered edges (bladder is inverted
/// and handled by its own accident path, so it is not here).
fn need_pairs(previous: &Needs, current: &Needs) -> [(NeedKind, f64, f64); 5] {
    [
        (NeedKind::Hunger, previous.hunger, current.hunger),
        (NeedKind::Thirst, previous.thirst, current.thirst),
        (NeedKind::Energy, previous.energy, current.energy),
        (NeedKind::Health, previous.health, current.health),
        (NeedKind::Social, previous.social, current.social),
    ]
}

/// The four pain sources and their current values.
fn pain_values(needs: &Needs) -> [(PainSource, f64); 4] {
    [
        (PainSource::Hunger, needs.hunger),
        (PainSource::Thirst, needs.thirst),
        (PainSource::Social, needs.social),
        (PainSource::Health, needs.health),
    ]
}

/// Map a need value to a pain intensity, if it hurts at all.
fn pain_intensity(value: f64) -> Option<PainIntensity> {
    if value < 5.0 {
        Some(PainIntensity::Agony)
    } else if value < 20.0 {
        Some(PainIntensity::Severe)
    } else if value < 40.0 {
        Some(PainIntensity::Mild)
    } else {
        None
    }
}

/// The fixed narrative library, keyed by (source, intensity).
const fn pain_text(source: PainSource, intensity: PainIntensity) -> &'static str {
    match (source, intensity) {
        (PainSource::Hunger, PainIntensity::Mild) => {
            "Your stomach growls. It has been a while since you ate."
        }
        (PainSource::Hunger, PainIntensity::Severe) => {
            "Hunger gnaws at you; it is hard to think of anything but food."
        }
        (PainSource::Hunger, PainIntensity::Agony) => {
            "You are starving. Your body is consuming itself."
        }
        (PainSource::Thirst, PainIntensity::Mild) => {
            "Your mouth is dry. A drink would help."
        }
        (PainSource::Thirst, PainIntensity::Severe) => {
            "Your throat burns with thirst and your head aches."
        }
        (PainSource::Thirst, PainIntensity::Agony) => {
            "You are severely dehydrated. Your vision swims."
        }
        (PainSource::Social, PainIntensity::Mild) => {
            "The streets feel empty. You miss talking to someone."
        }
        (PainSource::Social, PainIntensity::Severe) => {
            "Loneliness sits on your chest like a weight."
        }
        (PainSource::Social, PainIntensity::Agony) => {
            "The isolation is unbearable; you crave any voice at all."
        }
        (PainSource::Health, PainIntensity::Mild) => {
            "You feel run down and sore."
        }
        (PainSource::Health, PainIntensity::Severe) => {
            "Every movement hurts. Your body is failing."
        }
        (PainSource::Health, PainIntensity::Agony) => {
            "You can barely stand. Without help you will not last long."
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use city_types::{Appearance, ResidentKind};

    use super::*;

    fn spawned(name: &str) -> Resident {
        let mut r = Resident::register(
            ResidentId::new(),
            format!("CITY-{name}"),
            name.to_owned(),
            name.to_owned(),
            String::from("Elsewhere"),
            ResidentKind::Agent,
            Appearance::default(),
        );
        r.spawn_at(100.0, 100.0, 0.0);
        r
    }

    #[test]
    fn critical_fires_exactly_once_per_crossing() {
        let mut detector = EventDetector::new();
        let mut r = spawned("AAA01");

        r.needs.hunger = 10.001;
        let _ = detector.observe(std::iter::once(&r), 0.0);

        r.needs.hunger = 9.999;
        let signals = detector.observe(std::iter::once(&r), 1.0);
        let criticals = signals
            .iter()
            .filter(|s| matches!(s, DetectedSignal::NeedCritical { need: NeedKind::Hunger, .. }))
            .count();
        assert_eq!(criticals, 1);

        // Staying below: no repeat.
        r.needs.hunger = 8.0;
        let signals = detector.observe(std::iter::once(&r), 2.0);
        assert!(!signals
            .iter()
            .any(|s| matches!(s, DetectedSignal::NeedCritical { .. })));
    }

    #[test]
    fn recovery_fires_once_above_thirty() {
        let mut detector = EventDetector::new();
        let mut r = spawned("AAA01");

        r.needs.hunger = 15.0;
        let _ = detector.observe(std::iter::once(&r), 0.0);
        r.needs.hunger = 9.0;
        let _ = detector.observe(std::iter::once(&r), 40.0);

        // Back above 30: exactly one recovery.
        r.needs.hunger = 31.0;
        let signals = detector.observe(std::iter::once(&r), 80.0);
        let recoveries = signals
            .iter()
            .filter(|s| matches!(s, DetectedSignal::NeedRecovered { need: NeedKind::Hunger, .. }))
            .count();
        assert_eq!(recoveries, 1);

        r.needs.hunger = 50.0;
        let signals = detector.observe(std::iter::once(&r), 120.0);
        assert!(!signals
            .iter()
            .any(|s| matches!(s, DetectedSignal::NeedRecovered { .. })));
    }

    #[test]
    fn no_recovery_without_prior_critical() {
        let mut detector = EventDetector::new();
        let mut r = spawned("AAA01");
        r.needs.hunger = 25.0;
        let _ = detector.observe(std::iter::once(&r), 0.0);
        r.needs.hunger = 35.0;
        let signals = detector.observe(std::iter::once(&r), 1.0);
        assert!(signals.is_empty());
    }

    #[test]
    fn pain_respects_the_gap() {
        let mut detector = EventDetector::new();
        let mut r = spawned("AAA01");
        r.needs.hunger = 35.0;

        let signals = detector.observe(std::iter::once(&r), 0.0);
        assert!(signals
            .iter()
            .any(|s| matches!(s, DetectedSignal::Pain { source: PainSource::Hunger, .. })));

        // Within the gap: silent.
        let signals = detector.observe(std::iter::once(&r), 15.0);
        assert!(!signals
            .iter()
            .any(|s| matches!(s, DetectedSignal::Pain { .. })));

        // Past the gap: speaks again.
        let signals = detector.observe(std::iter::once(&r), 31.0);
        assert!(signals
            .iter()
            .any(|s| matches!(s, DetectedSignal::Pain { source: PainSource::Hunger, .. })));
    }

    #[test]
    fn pain_intensity_bands() {
        assert_eq!(pain_intensity(50.0), None);
        assert_eq!(pain_intensity(39.0), Some(PainIntensity::Mild));
        assert_eq!(pain_intensity(19.0), Some(PainIntensity::Severe));
        assert_eq!(pain_intensity(4.0), Some(PainIntensity::Agony));
    }

    #[test]
    fn sources_pace_independently() {
        let mut detector = EventDetector::new();
        let mut r = spawned("AAA01");
        r.needs.hunger = 35.0;
        let _ = detector.observe(std::iter::once(&r), 0.0);

        // Thirst drops later; its first pain is not gated by hunger's.
        r.needs.thirst = 30.0;
        let signals = detector.observe(std::iter::once(&r), 10.0);
        assert!(signals
            .iter()
            .any(|s| matches!(s, DetectedSignal::Pain { source: PainSource::Thirst, .. })));
    }

    #[test]
    fn dead_residents_are_forgotten() {
        let mut detector = EventDetector::new();
        let mut r = spawned("AAA01");
        r.needs.hunger = 35.0;
        let _ = detector.observe(std::iter::once(&r), 0.0);
        r.status = city_types::ResidentStatus::Deceased;
        let signals = detector.observe(std::iter::once(&r), 100.0);
        assert!(signals.is_empty());
    }
}
