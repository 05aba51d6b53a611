//! Error types for the `city-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`] through the
//! standard [`Result`] type alias.

use city_types::{BuildingId, ForageableId};

/// Errors that can occur during map, collision, and forage operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A tile coordinate fell outside the map.
    #[error("tile ({tx}, {ty}) is outside the map")]
    OutOfBounds {
        /// Tile x.
        tx: i64,
        /// Tile y.
        ty: i64,
    },

    /// No path exists to the requested target (including search-budget
    /// exhaustion on very long or fully enclosed routes).
    #[error("no path from ({from_x:.0}, {from_y:.0}) to ({to_x:.0}, {to_y:.0})")]
    NoPath {
        /// Origin x in pixels.
        from_x: f64,
        /// Origin y in pixels.
        from_y: f64,
        /// Target x in pixels.
        to_x: f64,
        /// Target y in pixels.
        to_y: f64,
    },

    /// A building id was not present on this map.
    #[error("building not found: {0}")]
    BuildingNotFound(BuildingId),

    /// A forageable node had no uses left.
    #[error("forageable node depleted: {0}")]
    NodeDepleted(ForageableId),

    /// Map data failed structural validation.
    #[error("invalid map data: {reason}")]
    InvalidMapData {
        /// What was wrong with the data.
        reason: String,
    },

    /// Arithmetic overflow during a checked grid computation.
    #[error("arithmetic overflow in map calculation")]
    ArithmeticOverflow,
}
