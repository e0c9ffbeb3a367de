use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{json, Value};
use std::env;
use std::fmt::Debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Conflict,
    ExternalDependency,
    InvariantViolation,
    Internal,
}

#[derive(Debug, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct Error {
    pub code: i32,
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        Error::env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::reqwest_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        Error::authorizor_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ExternalDependency => StatusCode::BAD_GATEWAY,
            ErrorKind::InvariantViolation | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match self.kind {
            ErrorKind::InvariantViolation | ErrorKind::Internal => Json(json!({
                "code": self.code,
                "kind": self.kind,
                "error": "Internal Server Error",
            })),
            _ => Json(json!({
                "code": self.code,
                "kind": self.kind,
                "error": self.message,
                "details": self.details,
            })),
        };

        (status, body).into_response()
    }
}

impl Error {
    fn new(code: i32, kind: ErrorKind, message: &str) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is(&self, other: &Error) -> bool {
        self.code == other.code
    }

    /// Expected business outcomes a caller may report to the user rather than retry.
    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    // infrastructure (1..=99)

    pub fn env_var_error(_: env::VarError) -> Self {
        Self::new(1, ErrorKind::Internal, "environment variable error")
    }

    pub fn database_error<T: Debug>(err: T) -> Self {
        tracing::error!(error = ?err, "database error");
        Self::new(2, ErrorKind::Internal, "database error")
    }

    pub fn reqwest_error(err: reqwest::Error) -> Self {
        tracing::warn!(error = %err, "reqwest error");
        Self::new(3, ErrorKind::ExternalDependency, "reqwest error")
    }

    pub fn upstream_error() -> Self {
        Self::new(4, ErrorKind::ExternalDependency, "upstream error")
    }

    pub fn unexpected_error() -> Self {
        Self::new(5, ErrorKind::Internal, "unexpected error")
    }

    pub fn authorizor_error(err: oso::OsoError) -> Self {
        tracing::error!(error = %err, "authorizor error");
        Self::new(6, ErrorKind::Internal, "authorizor error")
    }

    pub fn invariant_violation(what: &str) -> Self {
        tracing::error!(invariant = what, "invariant violation");
        Self::new(7, ErrorKind::InvariantViolation, "invariant violation")
            .with_details(json!({ "invariant": what }))
    }

    pub fn config_error(key: &str) -> Self {
        Self::new(8, ErrorKind::Internal, "configuration error").with_details(json!({ "key": key }))
    }

    // validation

    pub fn invalid_input_error() -> Self {
        Self::new(100, ErrorKind::Validation, "invalid input")
    }

    pub fn validation_error(field: &str, reason: &str) -> Self {
        Self::new(101, ErrorKind::Validation, "validation failed")
            .with_details(json!({ "field": field, "reason": reason }))
    }

    // authorization

    pub fn unauthorized_error() -> Self {
        Self::new(110, ErrorKind::Authorization, "unauthorized")
    }

    pub fn not_owner() -> Self {
        Self::new(111, ErrorKind::Authorization, "caller does not own this resource")
    }

    // lookups

    pub fn not_found(resource: &str) -> Self {
        Self::new(120, ErrorKind::NotFound, "not found").with_details(json!({ "resource": resource }))
    }

    pub fn bid_not_found() -> Self {
        Self::new(121, ErrorKind::NotFound, "bid not found")
    }

    pub fn invite_not_found() -> Self {
        Self::new(122, ErrorKind::NotFound, "invite not found")
    }

    pub fn member_not_found() -> Self {
        Self::new(123, ErrorKind::NotFound, "team member not found")
    }

    // load lifecycle

    pub fn invalid_transition(current: &str, requested: &str, role: &str) -> Self {
        Self::new(130, ErrorKind::Conflict, "invalid transition").with_details(json!({
            "current": current,
            "requested": requested,
            "role": role,
        }))
    }

    pub fn forbidden_transition(current: &str, requested: &str, role: &str) -> Self {
        Self::new(131, ErrorKind::Authorization, "invalid transition").with_details(json!({
            "current": current,
            "requested": requested,
            "role": role,
        }))
    }

    pub fn load_not_deletable() -> Self {
        Self::new(132, ErrorKind::Conflict, "load has an accepted bid or a payment")
    }

    pub fn load_not_editable(current: &str) -> Self {
        Self::new(133, ErrorKind::Conflict, "load can no longer be edited")
            .with_details(json!({ "current": current }))
    }

    // bids

    pub fn load_not_biddable(current: &str) -> Self {
        Self::new(140, ErrorKind::Conflict, "load is not accepting bids")
            .with_details(json!({ "current": current }))
    }

    pub fn duplicate_bid() -> Self {
        Self::new(141, ErrorKind::Conflict, "carrier already has an open bid on this load")
    }

    pub fn bid_not_pending(current: &str) -> Self {
        Self::new(142, ErrorKind::Conflict, "bid is not pending")
            .with_details(json!({ "current": current }))
    }

    pub fn load_already_booked() -> Self {
        Self::new(143, ErrorKind::Conflict, "load already booked")
    }

    pub fn bid_not_countered(current: &str) -> Self {
        Self::new(144, ErrorKind::Conflict, "bid has no open counter offer")
            .with_details(json!({ "current": current }))
    }

    // payments

    pub fn already_escrowed() -> Self {
        Self::new(150, ErrorKind::Conflict, "payment already escrowed")
    }

    pub fn not_escrowed(current: &str) -> Self {
        Self::new(151, ErrorKind::Conflict, "payment is not held in escrow")
            .with_details(json!({ "current": current }))
    }

    pub fn already_settled(current: &str) -> Self {
        Self::new(152, ErrorKind::Conflict, "payment already settled")
            .with_details(json!({ "current": current }))
    }

    pub fn not_disputed(current: &str) -> Self {
        Self::new(153, ErrorKind::Conflict, "payment is not disputed")
            .with_details(json!({ "current": current }))
    }

    pub fn not_released(current: &str) -> Self {
        Self::new(154, ErrorKind::Conflict, "payment is not awaiting settlement")
            .with_details(json!({ "current": current }))
    }

    pub fn load_not_delivered(current: &str) -> Self {
        Self::new(155, ErrorKind::Conflict, "load has not been delivered")
            .with_details(json!({ "current": current }))
    }

    // seats

    pub fn insufficient_seats(available: i32, requested: i32) -> Self {
        Self::new(160, ErrorKind::Conflict, "insufficient seats").with_details(json!({
            "available": available,
            "requested": requested,
        }))
    }

    pub fn invite_expired() -> Self {
        Self::new(161, ErrorKind::Conflict, "invite expired")
    }

    pub fn invite_revoked() -> Self {
        Self::new(162, ErrorKind::Conflict, "invite revoked")
    }

    pub fn invite_exhausted() -> Self {
        Self::new(163, ErrorKind::Conflict, "invite exhausted")
    }

    pub fn already_member() -> Self {
        Self::new(164, ErrorKind::Conflict, "user already belongs to a team")
    }

    pub fn invite_not_pending(current: &str) -> Self {
        Self::new(165, ErrorKind::Conflict, "invite is not pending")
            .with_details(json!({ "current": current }))
    }

    pub fn subscription_inactive(current: &str) -> Self {
        Self::new(166, ErrorKind::Conflict, "subscription is not active")
            .with_details(json!({ "current": current }))
    }
}

#[test]
fn conflict_errors_are_distinguishable_from_failures() {
    assert!(Error::load_already_booked().is_conflict());
    assert!(Error::invite_exhausted().is_conflict());
    assert!(!Error::upstream_error().is_conflict());
    assert!(!Error::unexpected_error().is_conflict());
    assert!(Error::load_already_booked().is(&Error::load_already_booked()));
    assert!(!Error::load_already_booked().is(&Error::load_not_biddable("draft")));
}

#[test]
fn invalid_transition_carries_states_and_role() {
    let err = Error::invalid_transition("booked", "cancelled", "shipper");

    let details = err.details.unwrap();
    assert_eq!(details["current"], "booked");
    assert_eq!(details["requested"], "cancelled");
    assert_eq!(details["role"], "shipper");
}
