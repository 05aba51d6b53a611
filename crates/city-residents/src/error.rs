//! Error types for the `city-residents` crate.
//!
//! Game-rule refusals are *not* errors here -- those are
//! [`city_types::ActionFailure`] values returned to the client. This enum
//! covers internal invariant breaches: inventory bookkeeping going wrong,
//! wallet arithmetic overflowing, and similar conditions that indicate a
//! bug rather than a rule violation.

use city_types::ItemKind;

/// Errors that can occur during resident state operations.
#[derive(Debug, thiserror::Error)]
pub enum ResidentError {
    /// Attempted to remove more of an item than the resident holds.
    #[error("insufficient items: wanted {requested} of {item:?} but only have {available}")]
    InsufficientItems {
        /// The item being removed.
        item: ItemKind,
        /// The quantity the caller attempted to remove.
        requested: u32,
        /// The quantity actually held.
        available: u32,
    },

    /// The item kind was not present in the inventory at all.
    #[error("item not in inventory: {0:?}")]
    ItemNotFound(ItemKind),

    /// Wallet arithmetic would overflow or go negative.
    #[error("wallet arithmetic failed: {context}")]
    WalletArithmetic {
        /// Description of the computation.
        context: String,
    },

    /// An arithmetic overflow occurred during a state computation.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Description of what was being computed.
        context: String,
    },
}
