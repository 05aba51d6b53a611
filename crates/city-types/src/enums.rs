//! Closed enumerations shared across the City server.
//!
//! Wire representations use `snake_case` except where the public protocol
//! fixes another casing (resident kinds are `AGENT` / `HUMAN`). Domain
//! constants that belong to a variant (item nutrition, speech ranges,
//! forage yields) live here as `const fn` accessors so every subsystem
//! reads the same numbers.

use serde::{Deserialize, Serialize};

/// What kind of client controls a resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResidentKind {
    /// An autonomous (typically LLM-driven) client.
    Agent,
    /// A human at a keyboard.
    Human,
}

impl ResidentKind {
    /// Stable lowercase string used in database rows.
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Human => "human",
        }
    }
}

/// Lifecycle state of a resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidentStatus {
    /// Living and simulated.
    Alive,
    /// Health reached zero; the body remains until processed.
    Deceased,
    /// Left the city via the depart action; identity row persists.
    Departed,
}

/// The civic role a building plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingRole {
    /// Train station; spawn platform for arrivals.
    Station,
    /// General store selling consumables.
    Shop,
    /// Bank; the only place UBI can be collected.
    Bank,
    /// City hall; petitions are written and voted here.
    Hall,
    /// Public toilet.
    Toilet,
    /// Mortuary; pays the body bounty.
    Mortuary,
    /// Police station; suspects are booked here.
    Police,
    /// Information kiosk.
    Info,
}

/// Item types that can appear in inventories and on shop shelves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Shop staple; restores a large amount of hunger.
    Bread,
    /// Bottled water; restores thirst.
    Water,
    /// Foraged berries; light food.
    Berries,
    /// Fresh spring water collected from a source.
    SpringWater,
    /// Shop coffee; small energy boost.
    Coffee,
    /// Multi-use sleeping bag; improves sleep recovery.
    SleepingBag,
}

impl ItemKind {
    /// Hunger restored when one unit is consumed.
    pub const fn hunger_restore(self) -> f64 {
        match self {
            Self::Bread => 40.0,
            Self::Berries => 15.0,
            Self::Coffee => 2.0,
            Self::Water | Self::SpringWater | Self::SleepingBag => 0.0,
        }
    }

    /// Thirst restored when one unit is consumed.
    pub const fn thirst_restore(self) -> f64 {
        match self {
            Self::Water => 40.0,
            Self::SpringWater => 30.0,
            Self::Berries => 5.0,
            Self::Coffee => 5.0,
            Self::Bread | Self::SleepingBag => 0.0,
        }
    }

    /// Energy restored when one unit is consumed.
    pub const fn energy_restore(self) -> f64 {
        match self {
            Self::Coffee => 15.0,
            Self::Berries => 2.0,
            _ => 0.0,
        }
    }

    /// Whether consuming the item reduces hunger or thirst at all.
    pub const fn is_consumable(self) -> bool {
        !matches!(self, Self::SleepingBag)
    }

    /// Number of uses a freshly acquired unit carries, for items that
    /// wear out instead of being consumed whole.
    pub const fn initial_uses(self) -> Option<u32> {
        match self {
            Self::SleepingBag => Some(20),
            _ => None,
        }
    }

    /// Shop price in whole currency units. Items the shop never stocks
    /// price at zero and are rejected at the till.
    pub const fn shop_price(self) -> i64 {
        match self {
            Self::Bread => 5,
            Self::Water => 2,
            Self::Coffee => 4,
            Self::SleepingBag => 25,
            Self::Berries | Self::SpringWater => 0,
        }
    }

    /// Default shelf quantity after a restock.
    pub const fn restock_quantity(self) -> u32 {
        match self {
            Self::Bread => 30,
            Self::Water => 40,
            Self::Coffee => 20,
            Self::SleepingBag => 5,
            Self::Berries | Self::SpringWater => 0,
        }
    }

    /// Stable lowercase string used in database rows.
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Bread => "bread",
            Self::Water => "water",
            Self::Berries => "berries",
            Self::SpringWater => "spring_water",
            Self::Coffee => "coffee",
            Self::SleepingBag => "sleeping_bag",
        }
    }

    /// Parse the database string form back into an item kind.
    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "bread" => Some(Self::Bread),
            "water" => Some(Self::Water),
            "berries" => Some(Self::Berries),
            "spring_water" => Some(Self::SpringWater),
            "coffee" => Some(Self::Coffee),
            "sleeping_bag" => Some(Self::SleepingBag),
            _ => None,
        }
    }
}

/// Kinds of forageable nodes scattered through the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForageKind {
    /// Yields [`ItemKind::Berries`].
    BerryBush,
    /// Yields [`ItemKind::SpringWater`].
    FreshSpring,
}

impl ForageKind {
    /// The item one successful forage yields.
    pub const fn yield_item(self) -> ItemKind {
        match self {
            Self::BerryBush => ItemKind::Berries,
            Self::FreshSpring => ItemKind::SpringWater,
        }
    }
}

/// How loudly a speech act is delivered; determines its audible range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechVolume {
    /// Audible only at conversational arm's length.
    Whisper,
    /// Ordinary speaking voice.
    #[default]
    Normal,
    /// Carries across a city block.
    Shout,
}

impl SpeechVolume {
    /// Audible range in pixels before wall attenuation.
    pub const fn range(self) -> f64 {
        match self {
            Self::Whisper => 30.0,
            Self::Normal => 300.0,
            Self::Shout => 900.0,
        }
    }
}

/// Desired locomotion speed set by movement commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveSpeed {
    /// Standing still.
    #[default]
    Stop,
    /// Walking pace.
    Walk,
    /// Running pace.
    Run,
}

/// The six physiological scalars every resident carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedKind {
    /// Fullness; 0 is starving.
    Hunger,
    /// Hydration; 0 is parched.
    Thirst,
    /// Wakefulness; 0 forces collapse.
    Energy,
    /// Bladder pressure; 100 is desperate.
    Bladder,
    /// Vitality; 0 is death.
    Health,
    /// Companionship; decays in isolation.
    Social,
}

impl NeedKind {
    /// Stable lowercase string used on the wire and in event payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hunger => "hunger",
            Self::Thirst => "thirst",
            Self::Energy => "energy",
            Self::Bladder => "bladder",
            Self::Health => "health",
            Self::Social => "social",
        }
    }
}

/// Which failing need a pain message narrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PainSource {
    /// Starvation cramps.
    Hunger,
    /// Dehydration.
    Thirst,
    /// Loneliness.
    Social,
    /// Physical damage.
    Health,
}

/// How intense a pain message reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PainIntensity {
    /// Need below 40.
    Mild,
    /// Need below 20.
    Severe,
    /// Need below 5.
    Agony,
}

/// Law violations that can mark a resident as wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Stayed within a small radius for longer than the loiter threshold.
    Loitering,
}

/// Compass facing used by building doors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards negative y.
    North,
    /// Towards positive y.
    South,
    /// Towards positive x.
    East,
    /// Towards negative x.
    West,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_kind_uses_uppercase_wire_form() {
        let json = serde_json::to_string(&ResidentKind::Agent).ok();
        assert_eq!(json.as_deref(), Some("\"AGENT\""));
    }

    #[test]
    fn item_kinds_roundtrip_snake_case() {
        let json = serde_json::to_string(&ItemKind::SleepingBag).ok();
        assert_eq!(json.as_deref(), Some("\"sleeping_bag\""));
        let back: Result<ItemKind, _> = serde_json::from_str("\"spring_water\"");
        assert_eq!(back.ok(), Some(ItemKind::SpringWater));
    }

    #[test]
    fn speech_ranges_are_ordered() {
        assert!(SpeechVolume::Whisper.range() < SpeechVolume::Normal.range());
        assert!(SpeechVolume::Normal.range() < SpeechVolume::Shout.range());
    }

    #[test]
    fn forage_yields_match_kind() {
        assert_eq!(ForageKind::BerryBush.yield_item(), ItemKind::Berries);
        assert_eq!(ForageKind::FreshSpring.yield_item(), ItemKind::SpringWater);
    }

    #[test]
    fn shop_never_sells_foraged_goods() {
        assert_eq!(ItemKind::Berries.shop_price(), 0);
        assert_eq!(ItemKind::SpringWater.shop_price(), 0);
        assert!(ItemKind::Bread.shop_price() > 0);
    }
}
