//! Jobs, shift accrual, and wages.
//!
//! The job board holds the postings and the assignment table. Shift time
//! accrues in game-seconds while the holder is at the workplace (or
//! anywhere outdoors for outdoor jobs) and awake; leaving pauses the
//! accrual but never resets it. Completing `shift_hours` of accrued time
//! pays the wage, resets the counter, and reports a completed shift.

use std::collections::BTreeMap;

use city_types::{ActionFailure, BuildingId, Employment, JobId, JobRecord, ResidentId};
use serde::{Deserialize, Serialize};

use crate::resident::Resident;

/// The postings and who holds them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobBoard {
    /// Postings by id.
    pub jobs: BTreeMap<JobId, JobRecord>,
    /// Which resident holds which job.
    pub assignments: BTreeMap<ResidentId, JobId>,
}

impl JobBoard {
    /// Board with the given postings and no assignments.
    pub fn with_jobs(jobs: Vec<JobRecord>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|j| (j.id, j)).collect(),
            assignments: BTreeMap::new(),
        }
    }

    /// Look up a posting.
    pub fn job(&self, id: JobId) -> Option<&JobRecord> {
        self.jobs.get(&id)
    }

    /// How many residents currently hold a job.
    pub fn holders(&self, id: JobId) -> u32 {
        let count = self.assignments.values().filter(|&&j| j == id).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Open positions left on a posting.
    pub fn openings(&self, id: JobId) -> u32 {
        self.jobs
            .get(&id)
            .map(|job| job.max_positions.saturating_sub(self.holders(id)))
            .unwrap_or(0)
    }

    /// Whether the given resident's job grants police powers.
    pub fn is_police(&self, resident: ResidentId) -> bool {
        self.assignments
            .get(&resident)
            .and_then(|id| self.jobs.get(id))
            .is_some_and(|job| job.police)
    }

    /// Accept a resident onto a posting.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown posting, `NoOpenings` when full, and
    /// `ValidationFailed` when the resident already holds a job.
    pub fn apply(
        &mut self,
        resident: &mut Resident,
        job_id: JobId,
    ) -> Result<&JobRecord, ActionFailure> {
        if resident.employment.is_some() {
            return Err(ActionFailure::ValidationFailed {
                detail: String::from("already employed; quit first"),
            });
        }
        if !self.jobs.contains_key(&job_id) {
            return Err(ActionFailure::NotFound);
        }
        if self.openings(job_id) == 0 {
            return Err(ActionFailure::NoOpenings);
        }

        self.assignments.insert(resident.id, job_id);
        resident.employment = Some(Employment::new(job_id));
        self.jobs.get(&job_id).ok_or(ActionFailure::NotFound)
    }

    /// Remove a resident from their job.
    ///
    /// # Errors
    ///
    /// `NotEmployed` when the resident holds no job.
    pub fn quit(&mut self, resident: &mut Resident) -> Result<JobId, ActionFailure> {
        let Some(employment) = resident.employment.take() else {
            return Err(ActionFailure::NotEmployed);
        };
        self.assignments.remove(&resident.id);
        Ok(employment.job_id)
    }
}

/// A shift that finished this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftComplete {
    /// The job worked.
    pub job_id: JobId,
    /// The wage credited.
    pub wage: i64,
}

/// Whether the resident currently counts as at their workplace.
///
/// Indoor jobs require being inside the job's building; outdoor jobs
/// (no building) require being outside any building.
pub fn at_workplace(job: &JobRecord, current_building: Option<BuildingId>) -> bool {
    match job.building {
        Some(site) => current_building == Some(site),
        None => current_building.is_none(),
    }
}

/// Accrue shift time for one simulation tick and pay out on completion.
///
/// Sleeping never accrues, for any job. Returns `Some` when a shift
/// completed this tick.
pub fn accrue_shift(
    resident: &mut Resident,
    board: &JobBoard,
    game_dt: f64,
) -> Option<ShiftComplete> {
    let job_id = resident.employment.as_ref().map(|e| e.job_id)?;
    let job = board.jobs.get(&job_id)?;
    let present = at_workplace(job, resident.building);
    let working = present && !resident.sleeping;

    let employment = resident.employment.as_mut()?;
    employment.on_shift = working;
    if !working {
        return None;
    }

    employment.shift_elapsed += game_dt;
    let shift_seconds = job.shift_hours * 3600.0;
    if employment.shift_elapsed >= shift_seconds {
        employment.shift_elapsed = 0.0;
        resident.wallet = resident.wallet.saturating_add(job.wage);
        return Some(ShiftComplete {
            job_id,
            wage: job.wage,
        });
    }
    None
}

/// The standard postings for a fresh city.
pub fn default_jobs(
    shop: BuildingId,
    hall: BuildingId,
    police: BuildingId,
    mortuary: BuildingId,
) -> Vec<JobRecord> {
    vec![
        JobRecord {
            id: JobId::new(),
            title: String::from("Shopkeeper"),
            building: Some(shop),
            wage: 30,
            shift_hours: 4.0,
            max_positions: 2,
            police: false,
            description: String::from("Mind the till and keep the shelves in order."),
        },
        JobRecord {
            id: JobId::new(),
            title: String::from("Clerk"),
            building: Some(hall),
            wage: 25,
            shift_hours: 4.0,
            max_positions: 2,
            police: false,
            description: String::from("File petitions and keep the hall running."),
        },
        JobRecord {
            id: JobId::new(),
            title: String::from("Police officer"),
            building: Some(police),
            wage: 40,
            shift_hours: 6.0,
            max_positions: 2,
            police: true,
            description: String::from("Patrol the city and book suspects."),
        },
        JobRecord {
            id: JobId::new(),
            title: String::from("Mortician"),
            building: Some(mortuary),
            wage: 35,
            shift_hours: 4.0,
            max_positions: 1,
            police: false,
            description: String::from("Receive and process the departed."),
        },
        JobRecord {
            id: JobId::new(),
            title: String::from("Groundskeeper"),
            building: None,
            wage: 20,
            shift_hours: 3.0,
            max_positions: 3,
            police: false,
            description: String::from("Tend the greens anywhere outdoors."),
        },
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use city_types::{Appearance, ResidentKind};

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

    fn board() -> (JobBoard, JobId, BuildingId) {
        let shop = BuildingId::new();
        let jobs = default_jobs(shop, BuildingId::new(), BuildingId::new(), BuildingId::new());
        let shopkeeper = jobs
            .iter()
            .find(|j| j.title == "Shopkeeper")
            .map(|j| j.id)
            .unwrap();
        (JobBoard::with_jobs(jobs), shopkeeper, shop)
    }

    #[test]
    fn apply_fills_openings() {
        let (mut board, job, _) = board();
        let mut a = test_resident();
        let mut b = test_resident();
        let mut c = test_resident();
        assert!(board.apply(&mut a, job).is_ok());
        assert!(board.apply(&mut b, job).is_ok());
        let result = board.apply(&mut c, job);
        assert!(matches!(result, Err(ActionFailure::NoOpenings)));
        assert_eq!(board.openings(job), 0);
    }

    #[test]
    fn cannot_hold_two_jobs() {
        let (mut board, job, _) = board();
        let mut r = test_resident();
        assert!(board.apply(&mut r, job).is_ok());
        let result = board.apply(&mut r, job);
        assert!(matches!(result, Err(ActionFailure::ValidationFailed { .. })));
    }

    #[test]
    fn quit_reopens_the_posting() {
        let (mut board, job, _) = board();
        let mut r = test_resident();
        let _ = board.apply(&mut r, job);
        assert_eq!(board.openings(job), 1);
        let quit = board.quit(&mut r).unwrap();
        assert_eq!(quit, job);
        assert_eq!(board.openings(job), 2);
        assert!(r.employment.is_none());
    }

    #[test]
    fn quit_without_job_fails() {
        let (mut board, _, _) = board();
        let mut r = test_resident();
        let result = board.quit(&mut r);
        assert!(matches!(result, Err(ActionFailure::NotEmployed)));
    }

    #[test]
    fn shift_accrues_only_at_workplace() {
        let (mut board, job, site) = board();
        let mut r = test_resident();
        let _ = board.apply(&mut r, job);

        // Outside: paused.
        assert!(accrue_shift(&mut r, &board, 3600.0).is_none());
        assert!(r.employment.as_ref().unwrap().shift_elapsed.abs() < f64::EPSILON);

        // Inside: accrues.
        r.building = Some(site);
        assert!(accrue_shift(&mut r, &board, 3600.0).is_none());
        let elapsed = r.employment.as_ref().unwrap().shift_elapsed;
        assert!((elapsed - 3600.0).abs() < f64::EPSILON);

        // Leaving pauses without resetting.
        r.building = None;
        assert!(accrue_shift(&mut r, &board, 3600.0).is_none());
        let elapsed = r.employment.as_ref().unwrap().shift_elapsed;
        assert!((elapsed - 3600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sleeping_pauses_accrual() {
        let (mut board, job, site) = board();
        let mut r = test_resident();
        let _ = board.apply(&mut r, job);
        r.building = Some(site);
        r.sleeping = true;
        assert!(accrue_shift(&mut r, &board, 3600.0).is_none());
        assert!(r.employment.as_ref().unwrap().shift_elapsed.abs() < f64::EPSILON);
        assert!(!r.employment.as_ref().unwrap().on_shift);
    }

    #[test]
    fn completed_shift_pays_and_resets() {
        let (mut board, job, site) = board();
        let mut r = test_resident();
        let _ = board.apply(&mut r, job);
        r.building = Some(site);

        // Shopkeeper shifts are 4 game-hours.
        for _ in 0..3 {
            assert!(accrue_shift(&mut r, &board, 3600.0).is_none());
        }
        let complete = accrue_shift(&mut r, &board, 3600.0).unwrap();
        assert_eq!(complete.wage, 30);
        assert_eq!(r.wallet, 30);
        assert!(r.employment.as_ref().unwrap().shift_elapsed.abs() < f64::EPSILON);
    }

    #[test]
    fn outdoor_job_accrues_outside_only() {
        let shop = BuildingId::new();
        let jobs = default_jobs(shop, BuildingId::new(), BuildingId::new(), BuildingId::new());
        let grounds = jobs
            .iter()
            .find(|j| j.building.is_none())
            .map(|j| j.id)
            .unwrap();
        let mut board = JobBoard::with_jobs(jobs);
        let mut r = test_resident();
        let _ = board.apply(&mut r, grounds);

        assert!(accrue_shift(&mut r, &board, 1800.0).is_none());
        assert!(r.employment.as_ref().unwrap().shift_elapsed > 0.0);

        r.building = Some(shop);
        let before = r.employment.as_ref().unwrap().shift_elapsed;
        assert!(accrue_shift(&mut r, &board, 1800.0).is_none());
        let after = r.employment.as_ref().unwrap().shift_elapsed;
        assert!((after - before).abs() < f64::EPSILON);
    }

    #[test]
    fn police_flag_follows_the_job() {
        let jobs = default_jobs(
            BuildingId::new(),
            BuildingId::new(),
            BuildingId::new(),
            BuildingId::new(),
        );
        let officer_job = jobs.iter().find(|j| j.police).map(|j| j.id).unwrap();
        let mut board = JobBoard::with_jobs(jobs);
        let mut r = test_resident();
        assert!(!board.is_police(r.id));
        let _ = board.apply(&mut r, officer_job);
        assert!(board.is_police(r.id));
    }
}
