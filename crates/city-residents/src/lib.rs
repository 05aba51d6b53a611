//! Resident state and the needs/economy subsystems of the City.
//!
//! This crate owns everything that happens *to* a resident: physiological
//! decay, inventory bookkeeping, death, employment, the shop and UBI,
//! petitions, and policing. It is synchronous and world-agnostic -- the
//! tick worker in `city-core` decides when and with what context each
//! function runs.
//!
//! # Modules
//!
//! - [`resident`] -- the entity itself and its transient buffers
//! - [`needs`] -- per-tick decay, drains, recovery, sleep
//! - [`inventory`] -- ordered stacks with merge-on-add
//! - [`death`] -- death conditions and body creation
//! - [`employment`] -- the job board, shift accrual, wages
//! - [`shop`] -- atomic purchases, restocking, UBI
//! - [`civic`] -- petitions and votes
//! - [`policing`] -- loitering, arrests, booking

pub mod civic;
pub mod death;
pub mod employment;
pub mod error;
pub mod inventory;
pub mod needs;
pub mod policing;
pub mod resident;
pub mod shop;

pub use civic::{PetitionBoard, PETITION_ENERGY_COST, PETITION_WALLET_COST};
pub use death::{check_death, process_death, DeathCause};
pub use employment::{accrue_shift, at_workplace, default_jobs, JobBoard, ShiftComplete};
pub use error::ResidentError;
pub use needs::{
    apply_energy_cost, apply_needs_tick, apply_nutrition, NeedsConfig, NeedsTickContext,
    NeedsTickResult,
};
pub use policing::{
    arrest, book_suspect, default_laws, update_loiter, PolicingConfig, ARREST_BOUNTY,
    LOITER_RADIUS,
};
pub use resident::{MoveIntent, Needs, Resident};
pub use shop::{
    buy, collect_ubi, PurchaseReceipt, ShopState, UbiConfig, MAX_BUY_QUANTITY,
    MIN_BUY_QUANTITY,
};
