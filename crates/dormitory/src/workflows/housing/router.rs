use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::workflows::billing::{BillingPeriod, MeterReading, ScheduleError};

use super::domain::{
    Actor, BedId, RegistrationId, RegistrationRequest, Role, RoomId, RoomSpec, RoomType,
    StudentId, TransferId, TransferSubmission,
};
use super::error::HousingError;
use super::ledger::HousingLedger;
use super::metering::PriceScheduleChange;
use super::payments::PaymentPublisher;
use super::storage::SnapshotStore;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type Ledger<S, P> = Arc<HousingLedger<S, P>>;

/// Router exposing the registration, transfer, and billing workflows over HTTP.
pub fn housing_router<S, P>(ledger: Ledger<S, P>) -> Router
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    Router::new()
        .route("/api/v1/registrations", post(submit_registration_handler::<S, P>))
        .route(
            "/api/v1/registrations/:registration_id",
            get(registration_handler::<S, P>),
        )
        .route(
            "/api/v1/registrations/:registration_id/approve",
            post(approve_registration_handler::<S, P>),
        )
        .route(
            "/api/v1/registrations/:registration_id/reject",
            post(reject_registration_handler::<S, P>),
        )
        .route("/api/v1/rooms", post(add_room_handler::<S, P>))
        .route("/api/v1/rooms/available", get(available_rooms_handler::<S, P>))
        .route("/api/v1/rooms/:room_id", get(room_handler::<S, P>))
        .route("/api/v1/transfers", post(submit_transfer_handler::<S, P>))
        .route("/api/v1/transfers/:transfer_id", get(transfer_handler::<S, P>))
        .route(
            "/api/v1/transfers/:transfer_id/approve",
            post(approve_transfer_handler::<S, P>),
        )
        .route(
            "/api/v1/transfers/:transfer_id/reject",
            post(reject_transfer_handler::<S, P>),
        )
        .route(
            "/api/v1/price-schedule",
            get(price_schedule_handler::<S, P>).post(upsert_price_handler::<S, P>),
        )
        .route(
            "/api/v1/price-schedule/resolve",
            get(resolve_price_handler::<S, P>),
        )
        .route("/api/v1/meter-readings", post(meter_reading_handler::<S, P>))
        .route("/api/v1/rent/quote", post(rent_quote_handler::<S, P>))
        .route(
            "/api/v1/students/:student_id/payments",
            get(payments_handler::<S, P>),
        )
        .with_state(ledger)
}

impl IntoResponse for HousingError {
    fn into_response(self) -> Response {
        let status = match &self {
            HousingError::NotFound { .. } => StatusCode::NOT_FOUND,
            HousingError::Forbidden { .. } => StatusCode::FORBIDDEN,
            HousingError::InvalidState { .. }
            | HousingError::AllocationConflict(_)
            | HousingError::Duplicate { .. }
            | HousingError::AlreadyHoused(_)
            | HousingError::DuplicateReading { .. }
            | HousingError::RoomExists(_) => StatusCode::CONFLICT,
            HousingError::Schedule(ScheduleError::NotFound(_)) => StatusCode::NOT_FOUND,
            HousingError::Schedule(ScheduleError::InvalidRange { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            HousingError::Schedule(_) => StatusCode::CONFLICT,
            HousingError::InvalidRange(_)
            | HousingError::InvalidReading(_)
            | HousingError::NoPriceDefined(_)
            | HousingError::NotHoused(_)
            | HousingError::NoOccupants { .. }
            | HousingError::ContractOutOfRange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HousingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = json!({
            "error": self.to_string(),
        });
        (status, Json(payload)).into_response()
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Read the acting user from the request headers set by the authenticating gateway.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let unauthorized = |message: String| {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    };

    let id = header(headers, ACTOR_ID_HEADER)
        .ok_or_else(|| unauthorized(format!("missing {ACTOR_ID_HEADER} header")))?;
    let role = header(headers, ACTOR_ROLE_HEADER)
        .ok_or_else(|| unauthorized(format!("missing {ACTOR_ROLE_HEADER} header")))?
        .parse::<Role>()
        .map_err(|err| unauthorized(err.to_string()))?;
    Ok(Actor::new(id, role))
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, HousingError>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Records tied to a student are visible to that student and to staff.
fn ensure_visible(
    actor: &Actor,
    student: &StudentId,
    action: &'static str,
) -> Result<(), HousingError> {
    if actor.may_act_for(student) {
        Ok(())
    } else {
        Err(HousingError::Forbidden {
            actor: actor.id.clone(),
            action,
        })
    }
}

macro_rules! actor_or_reject {
    ($headers:expr) => {
        match actor_from_headers(&$headers) {
            Ok(actor) => actor,
            Err(response) => return response,
        }
    };
}

pub(crate) async fn submit_registration_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Json(request): Json<RegistrationRequest>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        ledger.submit_registration(&actor, request),
    )
}

pub(crate) async fn registration_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(registration_id): Path<String>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    let result = ledger
        .registration(&RegistrationId(registration_id))
        .and_then(|registration| {
            ensure_visible(
                &actor,
                &registration.student_id,
                "view another student's registration",
            )
            .map(|()| registration)
        });
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct BedAssignment {
    pub room_id: RoomId,
    pub bed_id: BedId,
}

pub(crate) async fn approve_registration_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(registration_id): Path<String>,
    Json(assignment): Json<BedAssignment>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        ledger.approve_registration(
            &actor,
            &RegistrationId(registration_id),
            &assignment.room_id,
            &assignment.bed_id,
        ),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct Rejection {
    #[serde(alias = "note")]
    pub reason: String,
}

pub(crate) async fn reject_registration_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(registration_id): Path<String>,
    Json(rejection): Json<Rejection>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        ledger.reject_registration(&actor, &RegistrationId(registration_id), &rejection.reason),
    )
}

pub(crate) async fn add_room_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Json(spec): Json<RoomSpec>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(StatusCode::CREATED, ledger.add_room(&actor, spec))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityQuery {
    pub room_type: RoomType,
    pub as_of: Option<NaiveDate>,
}

pub(crate) async fn available_rooms_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Query(query): Query<AvailabilityQuery>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let _actor = actor_or_reject!(headers);
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    respond(
        StatusCode::OK,
        ledger.find_available(query.room_type, as_of),
    )
}

pub(crate) async fn room_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let _actor = actor_or_reject!(headers);
    respond(StatusCode::OK, ledger.room(&RoomId(room_id)))
}

pub(crate) async fn submit_transfer_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Json(submission): Json<TransferSubmission>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(StatusCode::CREATED, ledger.submit_transfer(&actor, submission))
}

pub(crate) async fn transfer_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(transfer_id): Path<String>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    let result = ledger
        .transfer(&TransferId(transfer_id))
        .and_then(|transfer| {
            ensure_visible(&actor, &transfer.student_id, "view another student's transfer")
                .map(|()| transfer)
        });
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransferBed {
    pub bed_id: BedId,
}

pub(crate) async fn approve_transfer_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(transfer_id): Path<String>,
    Json(target): Json<TransferBed>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        ledger.approve_transfer(&actor, &TransferId(transfer_id), &target.bed_id),
    )
}

pub(crate) async fn reject_transfer_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(transfer_id): Path<String>,
    Json(rejection): Json<Rejection>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        ledger.reject_transfer(&actor, &TransferId(transfer_id), &rejection.reason),
    )
}

pub(crate) async fn price_schedule_handler<S, P>(State(ledger): State<Ledger<S, P>>) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    respond(StatusCode::OK, ledger.price_schedule())
}

pub(crate) async fn upsert_price_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Json(change): Json<PriceScheduleChange>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    let today = Utc::now().date_naive();
    respond(
        StatusCode::OK,
        ledger.upsert_price_schedule(&actor, today, change),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct PeriodQuery {
    pub period: BillingPeriod,
}

pub(crate) async fn resolve_price_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    Query(query): Query<PeriodQuery>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    respond(StatusCode::OK, ledger.resolve_price(query.period))
}

pub(crate) async fn meter_reading_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Json(reading): Json<MeterReading>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        ledger.record_meter_reading(&actor, reading),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct RentQuoteRequest {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub monthly_rate: u64,
}

pub(crate) async fn rent_quote_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    Json(request): Json<RentQuoteRequest>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    respond(
        StatusCode::OK,
        ledger.quote_rent(request.start, request.end, request.monthly_rate),
    )
}

pub(crate) async fn payments_handler<S, P>(
    State(ledger): State<Ledger<S, P>>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
) -> Response
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let actor = actor_or_reject!(headers);
    let student = StudentId(student_id);
    let result = ensure_visible(&actor, &student, "view another student's payments")
        .and_then(|()| ledger.payments_for(&student));
    respond(StatusCode::OK, result)
}
