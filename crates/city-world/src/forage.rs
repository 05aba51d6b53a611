//! Forageable nodes: berry bushes and fresh springs scattered outdoors.
//!
//! A node carries a small number of uses. Harvesting consumes one use and
//! yields the node's item; a depleted node stays visible as scenery but is
//! no longer offered as a forage target. Uses grow back one at a time,
//! every `regrow_seconds` of game time after the last harvest.

use city_types::{ForageKind, ForageableId, ItemKind};

use crate::error::WorldError;

/// One forageable node in the world.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForageableNode {
    /// Node id.
    pub id: ForageableId,
    /// What kind of node this is.
    pub kind: ForageKind,
    /// World x in pixels.
    pub x: f64,
    /// World y in pixels.
    pub y: f64,
    /// Uses currently available.
    pub uses_remaining: u32,
    /// Ceiling for regrowth.
    pub max_uses: u32,
    /// Game-seconds per regrown use.
    pub regrow_seconds: f64,
    /// Game-time of the most recent harvest or regrowth step.
    pub last_use_world_time: f64,
}

impl ForageableNode {
    /// Create a node at full capacity.
    pub fn new(kind: ForageKind, x: f64, y: f64, max_uses: u32, regrow_seconds: f64) -> Self {
        Self {
            id: ForageableId::new(),
            kind,
            x,
            y,
            uses_remaining: max_uses,
            max_uses,
            regrow_seconds,
            last_use_world_time: 0.0,
        }
    }

    /// Whether the node currently offers at least one use.
    pub const fn is_available(&self) -> bool {
        self.uses_remaining > 0
    }

    /// Consume one use and return the yielded item.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NodeDepleted`] when no uses remain.
    pub fn harvest(&mut self, world_time: f64) -> Result<ItemKind, WorldError> {
        if self.uses_remaining == 0 {
            return Err(WorldError::NodeDepleted(self.id));
        }
        self.uses_remaining = self.uses_remaining.saturating_sub(1);
        self.last_use_world_time = world_time;
        Ok(self.kind.yield_item())
    }

    /// Regrow uses for the game time elapsed since the last harvest.
    ///
    /// Returns the number of uses restored. Each regrown use advances the
    /// regrowth anchor by one interval so partial intervals carry over.
    pub fn regrow(&mut self, world_time: f64) -> u32 {
        if self.uses_remaining >= self.max_uses || self.regrow_seconds <= 0.0 {
            return 0;
        }
        let mut restored = 0_u32;
        while self.uses_remaining < self.max_uses
            && world_time - self.last_use_world_time >= self.regrow_seconds
        {
            self.uses_remaining = self.uses_remaining.saturating_add(1);
            self.last_use_world_time += self.regrow_seconds;
            restored = restored.saturating_add(1);
        }
        restored
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bush() -> ForageableNode {
        ForageableNode::new(ForageKind::BerryBush, 100.0, 100.0, 3, 600.0)
    }

    #[test]
    fn harvest_consumes_and_yields() {
        let mut node = bush();
        let item = node.harvest(50.0).unwrap();
        assert_eq!(item, ItemKind::Berries);
        assert_eq!(node.uses_remaining, 2);
        assert!((node.last_use_world_time - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn depleted_node_refuses_harvest() {
        let mut node = bush();
        for _ in 0..3 {
            let _ = node.harvest(10.0);
        }
        assert!(!node.is_available());
        let result = node.harvest(20.0);
        assert!(matches!(result, Err(WorldError::NodeDepleted(_))));
    }

    #[test]
    fn regrow_restores_one_use_per_interval() {
        let mut node = bush();
        let _ = node.harvest(0.0);
        let _ = node.harvest(0.0);
        assert_eq!(node.uses_remaining, 1);

        // Less than one interval: nothing.
        assert_eq!(node.regrow(599.0), 0);
        // Two intervals elapsed: both uses return.
        assert_eq!(node.regrow(1200.0), 2);
        assert_eq!(node.uses_remaining, 3);
    }

    #[test]
    fn regrow_caps_at_max() {
        let mut node = bush();
        assert_eq!(node.regrow(10_000.0), 0);
        assert_eq!(node.uses_remaining, 3);
    }

    #[test]
    fn spring_yields_spring_water() {
        let mut node = ForageableNode::new(ForageKind::FreshSpring, 0.0, 0.0, 5, 300.0);
        assert_eq!(node.harvest(1.0).unwrap(), ItemKind::SpringWater);
    }
}
