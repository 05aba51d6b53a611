//! World clock: game-time tracking for the City.
//!
//! The clock is the single source of truth for all temporal state.
//! `world_time` advances monotonically in game-seconds at `time_scale`
//! times real time; one game-day is 86 400 game-seconds. Day number and
//! time-of-day labels are derived from `world_time`, never stored.

/// Game-seconds in one game-day.
pub const GAME_DAY_SECONDS: f64 = 86_400.0;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Invalid time configuration.
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// World clock tracking the simulation's temporal state.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldClock {
    /// Monotonic game-time in game-seconds.
    world_time: f64,
    /// Game-seconds per real second.
    time_scale: f64,
}

impl WorldClock {
    /// Create a clock at game-time zero.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] unless `time_scale` is a
    /// finite positive number.
    pub fn new(time_scale: f64) -> Result<Self, ClockError> {
        if !time_scale.is_finite() || time_scale <= 0.0 {
            return Err(ClockError::InvalidConfig {
                reason: format!("time_scale must be finite and positive, got {time_scale}"),
            });
        }
        Ok(Self {
            world_time: 0.0,
            time_scale,
        })
    }

    /// Restore a clock from persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] for a non-finite or negative
    /// `world_time`, or an invalid `time_scale`.
    pub fn from_parts(world_time: f64, time_scale: f64) -> Result<Self, ClockError> {
        if !world_time.is_finite() || world_time < 0.0 {
            return Err(ClockError::InvalidConfig {
                reason: format!("world_time must be finite and non-negative, got {world_time}"),
            });
        }
        let mut clock = Self::new(time_scale)?;
        clock.world_time = world_time;
        Ok(clock)
    }

    /// Advance by `real_dt` real seconds. Returns the elapsed game-seconds.
    pub const fn advance(&mut self, real_dt: f64) -> f64 {
        let game_dt = real_dt * self.time_scale;
        self.world_time += game_dt;
        game_dt
    }

    /// Current game-time in game-seconds.
    pub const fn world_time(&self) -> f64 {
        self.world_time
    }

    /// Game-seconds per real second.
    pub const fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Completed game-days since the world began (day 0 is the first).
    pub fn day_number(&self) -> u64 {
        let day = (self.world_time / GAME_DAY_SECONDS).floor();
        if day < 0.0 { 0 } else { day as u64 }
    }

    /// Hour of the current game-day in `[0, 24)`.
    pub fn hour_of_day(&self) -> f64 {
        (self.world_time % GAME_DAY_SECONDS) / 3600.0
    }

    /// Coarse time-of-day label used in perception.
    pub fn time_of_day(&self) -> &'static str {
        let hour = self.hour_of_day();
        if hour < 6.0 {
            "night"
        } else if hour < 12.0 {
            "morning"
        } else if hour < 18.0 {
            "afternoon"
        } else {
            "evening"
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_zero() {
        let clock = WorldClock::new(3.0).unwrap();
        assert!(clock.world_time().abs() < f64::EPSILON);
    }

    #[test]
    fn advance_scales_real_time() {
        let mut clock = WorldClock::new(3.0).unwrap();
        let game_dt = clock.advance(0.1);
        assert!((game_dt - 0.3).abs() < 1e-12);
        assert!((clock.world_time() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn day_and_hour_derive_from_world_time() {
        let clock = WorldClock::from_parts(GAME_DAY_SECONDS * 2.0 + 3600.0 * 7.0, 3.0).unwrap();
        assert_eq!(clock.day_number(), 2);
        assert!((clock.hour_of_day() - 7.0).abs() < 1e-9);
        assert_eq!(clock.time_of_day(), "morning");
    }

    #[test]
    fn time_of_day_bands() {
        let cases = [
            (3.0, "night"),
            (8.0, "morning"),
            (13.0, "afternoon"),
            (20.0, "evening"),
        ];
        for (hour, expected) in cases {
            let clock = WorldClock::from_parts(hour * 3600.0, 3.0).unwrap();
            assert_eq!(clock.time_of_day(), expected, "hour {hour}");
        }
    }

    #[test]
    fn invalid_time_scale_rejected() {
        assert!(WorldClock::new(0.0).is_err());
        assert!(WorldClock::new(-1.0).is_err());
        assert!(WorldClock::new(f64::NAN).is_err());
    }

    #[test]
    fn restore_rejects_negative_time() {
        assert!(WorldClock::from_parts(-5.0, 3.0).is_err());
    }
}
