//! Registration: `POST /passport`.
//!
//! Validates the applicant, assigns a passport number, admits the
//! resident to the train queue through the engine channel, and returns
//! the passport together with a signed session credential.

use axum::extract::State;
use axum::Json;
use city_core::EngineCommand;
use city_residents::Resident;
use city_types::{Appearance, ResidentId, ResidentKind};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::error::GatewayError;
use crate::state::AppState;

/// Characters used in passport suffixes (no easily-confused glyphs).
const PASSPORT_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random passport suffix.
const PASSPORT_SUFFIX_LEN: usize = 5;

/// Registration request body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegistrationRequest {
    /// Full legal name.
    #[validate(length(min = 1, max = 64))]
    pub full_name: String,
    /// Preferred name; defaults to the first word of the full name.
    #[validate(length(min = 1, max = 32))]
    pub preferred_name: Option<String>,
    /// Declared origin.
    #[validate(length(min = 1, max = 64))]
    pub origin: String,
    /// Who will control the resident.
    pub kind: ResidentKind,
    /// Appearance indices; defaults to all zero.
    #[serde(default)]
    pub appearance: Appearance,
}

/// Registration response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// The new resident's id.
    pub resident_id: ResidentId,
    /// The passport number.
    pub passport: String,
    /// The signed session credential for `/connect`.
    pub token: String,
}

/// Handle `POST /passport`.
pub async fn register(
    State(state): State<std::sync::Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<RegistrationResponse>, GatewayError> {
    request
        .validate()
        .map_err(|e| GatewayError::Invalid(e.to_string()))?;

    if request.kind == ResidentKind::Human && !state.gateway_config.human_registration {
        return Err(GatewayError::RegistrationRefused(String::from(
            "human registration is disabled",
        )));
    }

    let passport = new_passport(&state.gateway_config.passport_prefix);
    let preferred = request.preferred_name.clone().unwrap_or_else(|| {
        request
            .full_name
            .split_whitespace()
            .next()
            .unwrap_or(request.full_name.as_str())
            .to_owned()
    });

    let resident = Resident::register(
        ResidentId::new(),
        passport.clone(),
        request.full_name,
        preferred,
        request.origin,
        request.kind,
        request.appearance,
    );
    let resident_id = resident.id;
    let token = state
        .tokens
        .issue(resident_id, &passport, request.kind);

    let admitted = state
        .engine
        .send(EngineCommand::Admit {
            resident: Box::new(resident),
        })
        .await;
    if !admitted {
        return Err(GatewayError::EngineUnavailable);
    }

    info!(%resident_id, passport, kind = ?request.kind, "resident registered");
    Ok(Json(RegistrationResponse {
        resident_id,
        passport,
        token,
    }))
}

/// Generate a passport number `<PREFIX>-<SUFFIX>`.
fn new_passport(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..PASSPORT_SUFFIX_LEN)
        .map(|_| {
            let index = rng.random_range(0..PASSPORT_ALPHABET.len());
            char::from(PASSPORT_ALPHABET.get(index).copied().unwrap_or(b'X'))
        })
        .collect();
    format!("{prefix}-{suffix}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn passports_carry_the_prefix() {
        let passport = new_passport("CITY");
        assert!(passport.starts_with("CITY-"));
        assert_eq!(passport.len(), 4 + 1 + PASSPORT_SUFFIX_LEN);
    }

    #[test]
    fn passports_are_random() {
        let a = new_passport("CITY");
        let b = new_passport("CITY");
        // Not a proof, but 32^5 combinations make collisions negligible.
        assert_ne!(a, b);
    }

    #[test]
    fn validation_rejects_empty_names() {
        let request = RegistrationRequest {
            full_name: String::new(),
            preferred_name: None,
            origin: String::from("Elsewhere"),
            kind: ResidentKind::Agent,
            appearance: Appearance::default(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn validation_accepts_a_normal_request() {
        let request = RegistrationRequest {
            full_name: String::from("Ada Lovelace"),
            preferred_name: Some(String::from("Ada")),
            origin: String::from("London"),
            kind: ResidentKind::Agent,
            appearance: Appearance::default(),
        };
        assert!(request.validate().is_ok());
    }
}
