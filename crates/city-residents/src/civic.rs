//! Petitions: authored at city hall, voted on by residents, auto-closed
//! by age.
//!
//! The board keeps the petition rows and the vote table together so that
//! tallies and vote rows can never diverge: a vote inserts the row and
//! bumps the counter in one call, and refuses before touching either.

use std::collections::BTreeMap;

use city_types::{ActionFailure, PetitionId, PetitionRecord, PetitionStatus, ResidentId};
use serde::{Deserialize, Serialize};

/// Energy required to author a petition.
pub const PETITION_ENERGY_COST: f64 = 1.0;

/// Wallet cost to author a petition.
pub const PETITION_WALLET_COST: i64 = 5;

/// The petition rows and the vote table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetitionBoard {
    /// Petitions by id.
    pub petitions: BTreeMap<PetitionId, PetitionRecord>,
    /// One entry per (petition, voter); `true` is a vote in favour.
    pub votes: BTreeMap<(PetitionId, ResidentId), bool>,
}

impl PetitionBoard {
    /// Open a new petition and return its id.
    pub fn open(
        &mut self,
        author: ResidentId,
        category: String,
        description: String,
        world_time: f64,
    ) -> PetitionId {
        let id = PetitionId::new();
        self.petitions.insert(
            id,
            PetitionRecord {
                id,
                author,
                category,
                description,
                status: PetitionStatus::Open,
                votes_for: 0,
                votes_against: 0,
                opened_at: world_time,
            },
        );
        id
    }

    /// Record a vote on an open petition.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown petition, `ValidationFailed` for a closed
    /// one, `AlreadyVoted` when a vote row already exists. The tally and
    /// the vote row change together or not at all.
    pub fn vote(
        &mut self,
        petition: PetitionId,
        voter: ResidentId,
        approve: bool,
    ) -> Result<(), ActionFailure> {
        let record = self
            .petitions
            .get(&petition)
            .ok_or(ActionFailure::NotFound)?;
        if record.status != PetitionStatus::Open {
            return Err(ActionFailure::ValidationFailed {
                detail: String::from("petition is closed"),
            });
        }
        if self.votes.contains_key(&(petition, voter)) {
            return Err(ActionFailure::AlreadyVoted);
        }

        self.votes.insert((petition, voter), approve);
        if let Some(record) = self.petitions.get_mut(&petition) {
            if approve {
                record.votes_for = record.votes_for.saturating_add(1);
            } else {
                record.votes_against = record.votes_against.saturating_add(1);
            }
        }
        Ok(())
    }

    /// Close every open petition older than `max_age` game-seconds.
    /// Returns the ids closed this call.
    pub fn close_aged(&mut self, world_time: f64, max_age: f64) -> Vec<PetitionId> {
        let mut closed = Vec::new();
        for record in self.petitions.values_mut() {
            if record.status == PetitionStatus::Open
                && world_time - record.opened_at >= max_age
            {
                record.status = PetitionStatus::Closed;
                closed.push(record.id);
            }
        }
        closed
    }

    /// Petitions in id order, for listings.
    pub fn list(&self) -> Vec<&PetitionRecord> {
        self.petitions.values().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn open_then_list_includes_petition() {
        let mut board = PetitionBoard::default();
        let author = ResidentId::new();
        let id = board.open(
            author,
            String::from("infrastructure"),
            String::from("More benches on the main street"),
            100.0,
        );
        let listed = board.list();
        assert!(listed.iter().any(|p| p.id == id));
    }

    #[test]
    fn vote_uniqueness_holds() {
        let mut board = PetitionBoard::default();
        let id = board.open(
            ResidentId::new(),
            String::from("noise"),
            String::from("Quiet hours after dusk"),
            0.0,
        );
        let voter = ResidentId::new();

        assert!(board.vote(id, voter, true).is_ok());
        let second = board.vote(id, voter, false);
        assert!(matches!(second, Err(ActionFailure::AlreadyVoted)));

        let record = board.petitions.get(&id).unwrap();
        assert_eq!(record.votes_for, 1);
        assert_eq!(record.votes_against, 0);
    }

    #[test]
    fn tallies_match_vote_rows() {
        let mut board = PetitionBoard::default();
        let id = board.open(
            ResidentId::new(),
            String::from("parks"),
            String::from("Plant more berry bushes"),
            0.0,
        );
        for _ in 0..3 {
            assert!(board.vote(id, ResidentId::new(), true).is_ok());
        }
        for _ in 0..2 {
            assert!(board.vote(id, ResidentId::new(), false).is_ok());
        }
        let record = board.petitions.get(&id).unwrap();
        assert_eq!(record.votes_for, 3);
        assert_eq!(record.votes_against, 2);
        let rows = board.votes.keys().filter(|(p, _)| *p == id).count();
        assert_eq!(rows, 5);
    }

    #[test]
    fn closed_petitions_refuse_votes() {
        let mut board = PetitionBoard::default();
        let id = board.open(
            ResidentId::new(),
            String::from("transit"),
            String::from("More frequent trains"),
            0.0,
        );
        let closed = board.close_aged(90_000.0, 86_400.0);
        assert_eq!(closed, vec![id]);
        let result = board.vote(id, ResidentId::new(), true);
        assert!(matches!(result, Err(ActionFailure::ValidationFailed { .. })));
    }

    #[test]
    fn young_petitions_stay_open() {
        let mut board = PetitionBoard::default();
        let _ = board.open(
            ResidentId::new(),
            String::from("transit"),
            String::from("More frequent trains"),
            10_000.0,
        );
        let closed = board.close_aged(20_000.0, 86_400.0);
        assert!(closed.is_empty());
    }

    #[test]
    fn unknown_petition_not_found() {
        let mut board = PetitionBoard::default();
        let result = board.vote(PetitionId::new(), ResidentId::new(), true);
        assert!(matches!(result, Err(ActionFailure::NotFound)));
    }
}
