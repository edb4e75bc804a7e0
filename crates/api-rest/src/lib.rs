//! # API REST
//!
//! REST API for the clinic.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation served as JSON
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Every handler checks the caller's API key and role before touching the core. Core calls block
//! on SQLite locks, so they run on the blocking thread pool.

#![warn(rust_2018_idioms)]

use api_shared::dto::{
    AuditEntryRes, BillRes, CancelRes, ConsultationReq, ConsultationRes, CreateRegistrationReq,
    DateQuery, DaySheetQuery, DaySheetRes, DaySheetRowRes, DispenseReq, DispenseRes, ErrorRes, HealthRes, MedicineReq, MedicineRes,
    MedicineUpdateReq, OperatorReq, PaymentRes, PendingDispenseRes, PrescriptionLineReq,
    PrescriptionRes, RegistrationRes, RestoreRes, ScheduleReq, ScheduleRes, ScheduleStatusReq,
    StockAdjustReq, StockRes, VisitStatusRes,
};
use api_shared::{authorise, Action, AuthError, HealthService, Role};
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use clinic_core::models::Registration;
use clinic_core::types::{DoctorId, MedId, RegId, ScheduleId, VisitStatus};
use clinic_core::{ClinicError, ClinicResult, ClinicService, ErrorKind};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ROLE_HEADER: &str = "x-clinic-role";

/// Application state for the REST API server
///
/// Shared by every request handler. The service is cheap to clone; each call opens its own
/// connection.
#[derive(Clone)]
pub struct AppState {
    pub service: ClinicService,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(service: ClinicService, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }

    fn gate(&self, headers: &HeaderMap, action: Action) -> Result<Role, ApiError> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        authorise(
            header(API_KEY_HEADER),
            &self.api_key,
            header(ROLE_HEADER),
            action,
        )
        .map_err(ApiError::Auth)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_registration,
        get_registration,
        cancel_registration,
        restore_registration,
        start_consultation,
        submit_consultation,
        pay_registration,
        get_bill,
        cashier_day_sheet,
        upsert_schedule,
        set_schedule_status,
        list_schedules,
        doctor_queue,
        list_medicines,
        add_medicine,
        update_medicine,
        adjust_stock,
        remove_medicine,
        pending_dispense,
        dispense,
        audit_log,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        CreateRegistrationReq,
        RegistrationRes,
        OperatorReq,
        CancelRes,
        RestoreRes,
        ConsultationReq,
        PrescriptionLineReq,
        PrescriptionRes,
        ConsultationRes,
        VisitStatusRes,
        PaymentRes,
        BillRes,
        DaySheetRowRes,
        DaySheetRes,
        ScheduleReq,
        ScheduleStatusReq,
        ScheduleRes,
        MedicineReq,
        MedicineUpdateReq,
        MedicineRes,
        StockAdjustReq,
        StockRes,
        DispenseReq,
        DispenseRes,
        PendingDispenseRes,
        AuditEntryRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/registrations", post(create_registration))
        .route("/registrations/:id", get(get_registration))
        .route("/registrations/:id/cancel", post(cancel_registration))
        .route("/registrations/:id/restore", post(restore_registration))
        .route(
            "/registrations/:id/consultation/start",
            post(start_consultation),
        )
        .route("/registrations/:id/consultation", post(submit_consultation))
        .route("/registrations/:id/pay", post(pay_registration))
        .route("/registrations/:id/bill", get(get_bill))
        .route("/cashier", get(cashier_day_sheet))
        .route("/schedules", put(upsert_schedule).get(list_schedules))
        .route("/schedules/:id/status", post(set_schedule_status))
        .route("/doctors/:id/queue", get(doctor_queue))
        .route("/medicines", get(list_medicines).post(add_medicine))
        .route(
            "/medicines/:id",
            put(update_medicine).delete(remove_medicine),
        )
        .route("/medicines/:id/stock", post(adjust_stock))
        .route("/pharmacy/pending", get(pending_dispense))
        .route("/pharmacy/dispense", post(dispense))
        .route("/audit", get(audit_log))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// ERRORS
// ============================================================================

/// Everything a handler can fail with, rendered as `ErrorRes`.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Clinic(ClinicError),
    /// The blocking task panicked or was cancelled.
    Worker(String),
}

impl From<ClinicError> for ApiError {
    fn from(e: ClinicError) -> Self {
        ApiError::Clinic(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition | ErrorKind::CapacityExceeded | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::InvalidTransition => "invalid_transition",
        ErrorKind::CapacityExceeded => "capacity_exceeded",
        ErrorKind::Conflict => "conflict",
        ErrorKind::InvalidInput => "invalid_input",
        ErrorKind::Internal => "internal",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Auth(e) => {
                let status = match e {
                    AuthError::MissingApiKey | AuthError::InvalidApiKey => StatusCode::UNAUTHORIZED,
                    AuthError::UnknownRole | AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
                };
                tracing::warn!("Rejected request: {}", e);
                (
                    status,
                    ErrorRes {
                        error: e.to_string(),
                        kind: "unauthorised".into(),
                    },
                )
            }
            ApiError::Clinic(e) => {
                let kind = e.kind();
                let error = if kind == ErrorKind::Internal {
                    tracing::error!("Clinic error: {:?}", e);
                    "Internal error".to_string()
                } else {
                    tracing::info!("Request refused: {}", e);
                    e.to_string()
                };
                (
                    status_for(kind),
                    ErrorRes {
                        error,
                        kind: kind_label(kind).into(),
                    },
                )
            }
            ApiError::Worker(e) => {
                tracing::error!("Worker error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorRes {
                        error: "Internal error".into(),
                        kind: kind_label(ErrorKind::Internal).into(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Runs `f` against the service on the blocking pool.
async fn run<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&ClinicService) -> ClinicResult<T> + Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?
        .map_err(ApiError::Clinic)
}

fn registration_or_404(reg_id: RegId, found: Option<Registration>) -> ClinicResult<Registration> {
    found.ok_or(ClinicError::RegistrationNotFound(reg_id))
}

// ============================================================================
// HEALTH
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthRes)
    )
)]
/// Health check endpoint
///
/// Returns the service status. `ok` is false when the store cannot be opened or is not at the
/// expected schema version.
#[axum::debug_handler]
async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    let schema_ok = run(&state, |service| service.database().verify_schema())
        .await
        .is_ok();
    Json(HealthService::check_health(schema_ok))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[utoipa::path(
    post,
    path = "/registrations",
    request_body = CreateRegistrationReq,
    responses(
        (status = 201, description = "Registration booked", body = RegistrationRes),
        (status = 404, description = "Patient, doctor or department not found", body = ErrorRes),
        (status = 409, description = "Slot suspended or full, or doctor inactive", body = ErrorRes),
        (status = 422, description = "Invalid request", body = ErrorRes)
    )
)]
/// Book a registration
///
/// Reserves one unit of the doctor's slot capacity (when a schedule row exists) and assigns the
/// next queue number for the slot.
#[axum::debug_handler]
async fn create_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRegistrationReq>,
) -> ApiResult<(StatusCode, Json<RegistrationRes>)> {
    state.gate(&headers, Action::BookRegistration)?;
    let request = req.to_core()?;
    let reg = run(&state, move |service| service.create_registration(&request)).await?;
    Ok((StatusCode::CREATED, Json(reg.into())))
}

#[utoipa::path(
    get,
    path = "/registrations/{id}",
    params(("id" = i64, Path, description = "Registration id")),
    responses(
        (status = 200, description = "Registration", body = RegistrationRes),
        (status = 404, description = "Registration not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<RegistrationRes>> {
    state.gate(&headers, Action::ViewRegistration)?;
    let reg_id = RegId(id);
    let reg = run(&state, move |service| {
        registration_or_404(reg_id, service.registration(reg_id)?)
    })
    .await?;
    Ok(Json(reg.into()))
}

#[utoipa::path(
    post,
    path = "/registrations/{id}/cancel",
    params(("id" = i64, Path, description = "Registration id")),
    request_body = OperatorReq,
    responses(
        (status = 200, description = "Registration cancelled or already cancelled", body = CancelRes),
        (status = 404, description = "Registration not found", body = ErrorRes),
        (status = 409, description = "Visit has started or has prescriptions", body = ErrorRes)
    )
)]
/// Cancel a registration
///
/// Releases the reserved slot and refunds a paid registration. Repeating the call is harmless.
#[axum::debug_handler]
async fn cancel_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    body: Option<Json<OperatorReq>>,
) -> ApiResult<Json<CancelRes>> {
    let role = state.gate(&headers, Action::CancelRegistration)?;
    let operator = body.map(|Json(b)| b).unwrap_or_default().to_operator(role.as_str());
    let outcome = run(&state, move |service| {
        service.cancel_registration(RegId(id), &operator)
    })
    .await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    post,
    path = "/registrations/{id}/restore",
    params(("id" = i64, Path, description = "Registration id")),
    request_body = OperatorReq,
    responses(
        (status = 200, description = "Registration restored", body = RestoreRes),
        (status = 404, description = "Registration not found", body = ErrorRes),
        (status = 409, description = "Registration is not cancelled or the slot is full", body = ErrorRes)
    )
)]
/// Restore a cancelled registration
#[axum::debug_handler]
async fn restore_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    body: Option<Json<OperatorReq>>,
) -> ApiResult<Json<RestoreRes>> {
    let role = state.gate(&headers, Action::RestoreRegistration)?;
    let operator = body.map(|Json(b)| b).unwrap_or_default().to_operator(role.as_str());
    let booked_slots = run(&state, move |service| {
        service.restore_registration(RegId(id), &operator)
    })
    .await?;
    Ok(Json(RestoreRes {
        reg_id: id,
        booked_slots,
    }))
}

#[utoipa::path(
    post,
    path = "/registrations/{id}/consultation/start",
    params(("id" = i64, Path, description = "Registration id")),
    responses(
        (status = 200, description = "Consultation in progress", body = VisitStatusRes),
        (status = 404, description = "Registration not found", body = ErrorRes),
        (status = 409, description = "Visit cannot be started", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn start_consultation(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<VisitStatusRes>> {
    state.gate(&headers, Action::Consult)?;
    let status = run(&state, move |service| service.start_consultation(RegId(id))).await?;
    Ok(Json(VisitStatusRes {
        reg_id: id,
        visit_status: status.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/registrations/{id}/consultation",
    params(("id" = i64, Path, description = "Registration id")),
    request_body = ConsultationReq,
    responses(
        (status = 200, description = "Consultation recorded", body = ConsultationRes),
        (status = 404, description = "Registration or medicine not found", body = ErrorRes),
        (status = 409, description = "Visit not in progress or stock too low", body = ErrorRes),
        (status = 422, description = "Invalid request", body = ErrorRes)
    )
)]
/// Submit a consultation
///
/// Records the diagnosis and creates every prescription line, or nothing at all when any line
/// fails its stock check.
#[axum::debug_handler]
async fn submit_consultation(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<ConsultationReq>,
) -> ApiResult<Json<ConsultationRes>> {
    state.gate(&headers, Action::Consult)?;
    let submission = req.to_core()?;
    let prescriptions = run(&state, move |service| {
        service.submit_consultation(RegId(id), &submission)
    })
    .await?;
    Ok(Json(ConsultationRes {
        reg_id: id,
        visit_status: VisitStatus::Seen.to_string(),
        prescriptions: prescriptions.into_iter().map(Into::into).collect(),
    }))
}

// ============================================================================
// CASHIER
// ============================================================================

#[utoipa::path(
    post,
    path = "/registrations/{id}/pay",
    params(("id" = i64, Path, description = "Registration id")),
    responses(
        (status = 200, description = "Paid, or already paid", body = PaymentRes),
        (status = 404, description = "Registration not found", body = ErrorRes),
        (status = 409, description = "Registration is cancelled", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn pay_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<PaymentRes>> {
    state.gate(&headers, Action::Pay)?;
    let outcome = run(&state, move |service| service.pay_registration(RegId(id))).await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    get,
    path = "/registrations/{id}/bill",
    params(("id" = i64, Path, description = "Registration id")),
    responses(
        (status = 200, description = "Amount owed", body = BillRes),
        (status = 404, description = "Registration not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_bill(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<BillRes>> {
    state.gate(&headers, Action::ViewBill)?;
    let bill = run(&state, move |service| service.bill(RegId(id))).await?;
    Ok(Json(bill.into()))
}

#[utoipa::path(
    get,
    path = "/cashier",
    params(
        ("date" = String, Query, description = "Day to list, YYYY-MM-DD"),
        ("status" = Option<String>, Query, description = "all (default), paid or unpaid")
    ),
    responses(
        (status = 200, description = "The day's registrations with fees and totals", body = DaySheetRes),
        (status = 422, description = "Invalid date or status", body = ErrorRes)
    )
)]
/// Cashier day sheet
///
/// Lists every registration for the date, cancelled ones included, so the desk can collect
/// payments and find bookings to restore.
#[axum::debug_handler]
async fn cashier_day_sheet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DaySheetQuery>,
) -> ApiResult<Json<DaySheetRes>> {
    state.gate(&headers, Action::ViewDaySheet)?;
    let (date, filter) = query.to_core()?;
    let sheet = run(&state, move |service| service.day_sheet(date, filter)).await?;
    Ok(Json(sheet.into()))
}

// ============================================================================
// SCHEDULES
// ============================================================================

#[utoipa::path(
    put,
    path = "/schedules",
    request_body = ScheduleReq,
    responses(
        (status = 200, description = "Schedule slot defined", body = ScheduleRes),
        (status = 404, description = "Doctor not found", body = ErrorRes),
        (status = 422, description = "Invalid capacity", body = ErrorRes)
    )
)]
/// Define or redefine a doctor's slot
///
/// Existing bookings are kept; capacity cannot drop below them.
#[axum::debug_handler]
async fn upsert_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScheduleReq>,
) -> ApiResult<Json<ScheduleRes>> {
    state.gate(&headers, Action::ManageSchedule)?;
    let request = req.to_core()?;
    let slot = run(&state, move |service| service.upsert_schedule(&request)).await?;
    Ok(Json(slot.into()))
}

#[utoipa::path(
    post,
    path = "/schedules/{id}/status",
    params(("id" = i64, Path, description = "Schedule id")),
    request_body = ScheduleStatusReq,
    responses(
        (status = 200, description = "Status changed", body = ScheduleRes),
        (status = 404, description = "Schedule not found", body = ErrorRes),
        (status = 422, description = "Unknown status", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn set_schedule_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<ScheduleStatusReq>,
) -> ApiResult<Json<ScheduleRes>> {
    state.gate(&headers, Action::ManageSchedule)?;
    let status = req.to_core()?;
    let slot = run(&state, move |service| {
        service.set_schedule_status(ScheduleId(id), status)
    })
    .await?;
    Ok(Json(slot.into()))
}

#[utoipa::path(
    get,
    path = "/schedules",
    params(("date" = String, Query, description = "Day to list, YYYY-MM-DD")),
    responses(
        (status = 200, description = "Slots for the day", body = [ScheduleRes]),
        (status = 422, description = "Invalid date", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_schedules(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Vec<ScheduleRes>>> {
    state.gate(&headers, Action::ViewSchedule)?;
    let date = query.to_core()?;
    let slots = run(&state, move |service| service.schedules_for_date(date)).await?;
    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/doctors/{id}/queue",
    params(
        ("id" = i64, Path, description = "Doctor id"),
        ("date" = String, Query, description = "Day to list, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Waiting and in-progress visits, in call order", body = [RegistrationRes]),
        (status = 422, description = "Invalid date", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn doctor_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Vec<RegistrationRes>>> {
    state.gate(&headers, Action::ViewQueue)?;
    let date = query.to_core()?;
    let queue = run(&state, move |service| {
        service.doctor_queue(DoctorId(id), date)
    })
    .await?;
    Ok(Json(queue.into_iter().map(Into::into).collect()))
}

// ============================================================================
// MEDICINES
// ============================================================================

#[utoipa::path(
    get,
    path = "/medicines",
    responses(
        (status = 200, description = "Medicine catalogue", body = [MedicineRes])
    )
)]
#[axum::debug_handler]
async fn list_medicines(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<MedicineRes>>> {
    state.gate(&headers, Action::ViewMedicines)?;
    let medicines = run(&state, |service| service.medicines()).await?;
    Ok(Json(medicines.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/medicines",
    request_body = MedicineReq,
    responses(
        (status = 201, description = "Medicine added", body = MedicineRes),
        (status = 422, description = "Invalid request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn add_medicine(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MedicineReq>,
) -> ApiResult<(StatusCode, Json<MedicineRes>)> {
    state.gate(&headers, Action::ManageMedicine)?;
    let (name, price, stock) = req.to_core()?;
    let medicine = run(&state, move |service| {
        service.add_medicine(&name, price, stock)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(medicine.into())))
}

#[utoipa::path(
    put,
    path = "/medicines/{id}",
    params(("id" = i64, Path, description = "Medicine id")),
    request_body = MedicineUpdateReq,
    responses(
        (status = 200, description = "Medicine updated", body = MedicineRes),
        (status = 404, description = "Medicine not found", body = ErrorRes),
        (status = 422, description = "Invalid request", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn update_medicine(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<MedicineUpdateReq>,
) -> ApiResult<Json<MedicineRes>> {
    state.gate(&headers, Action::ManageMedicine)?;
    let update = req.to_core()?;
    let medicine = run(&state, move |service| {
        service.update_medicine(MedId(id), &update)
    })
    .await?;
    Ok(Json(medicine.into()))
}

#[utoipa::path(
    post,
    path = "/medicines/{id}/stock",
    params(("id" = i64, Path, description = "Medicine id")),
    request_body = StockAdjustReq,
    responses(
        (status = 200, description = "Stock adjusted", body = StockRes),
        (status = 404, description = "Medicine not found", body = ErrorRes),
        (status = 409, description = "Adjustment would make stock negative", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn adjust_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<StockAdjustReq>,
) -> ApiResult<Json<StockRes>> {
    state.gate(&headers, Action::ManageMedicine)?;
    let stock = run(&state, move |service| service.adjust_stock(MedId(id), req.delta)).await?;
    Ok(Json(StockRes { med_id: id, stock }))
}

#[utoipa::path(
    delete,
    path = "/medicines/{id}",
    params(("id" = i64, Path, description = "Medicine id")),
    responses(
        (status = 204, description = "Medicine removed"),
        (status = 404, description = "Medicine not found", body = ErrorRes),
        (status = 409, description = "Medicine is prescribed", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn remove_medicine(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<StatusCode> {
    state.gate(&headers, Action::ManageMedicine)?;
    run(&state, move |service| service.remove_medicine(MedId(id))).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// PHARMACY
// ============================================================================

#[utoipa::path(
    get,
    path = "/pharmacy/pending",
    responses(
        (status = 200, description = "Paid prescription lines awaiting dispense", body = [PendingDispenseRes])
    )
)]
#[axum::debug_handler]
async fn pending_dispense(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PendingDispenseRes>>> {
    state.gate(&headers, Action::Dispense)?;
    let pending = run(&state, |service| service.pending_dispense()).await?;
    Ok(Json(pending.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/pharmacy/dispense",
    request_body = DispenseReq,
    responses(
        (status = 200, description = "Dispensed, or already dispensed", body = DispenseRes),
        (status = 404, description = "Registration or prescription not found", body = ErrorRes),
        (status = 409, description = "Not paid, stock too low, or a concurrent dispense won", body = ErrorRes)
    )
)]
/// Dispense one prescription line
///
/// Stock decrement and the prescription status change commit together.
#[axum::debug_handler]
async fn dispense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DispenseReq>,
) -> ApiResult<Json<DispenseRes>> {
    state.gate(&headers, Action::Dispense)?;
    let (reg_id, med_id) = req.ids();
    let outcome = run(&state, move |service| service.dispense(reg_id, med_id)).await?;
    Ok(Json(outcome.into()))
}

// ============================================================================
// AUDIT
// ============================================================================

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<u32>,
}

const DEFAULT_AUDIT_LIMIT: u32 = 100;

#[utoipa::path(
    get,
    path = "/audit",
    params(("limit" = Option<u32>, Query, description = "Maximum entries, newest first (default 100)")),
    responses(
        (status = 200, description = "Audit entries", body = [AuditEntryRes])
    )
)]
#[axum::debug_handler]
async fn audit_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntryRes>>> {
    state.gate(&headers, Action::ViewAudit)?;
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let entries = run(&state, move |service| service.audit_log(limit)).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::{TimeZone, Utc};
    use clinic_core::models::{NewDoctor, NewPatient};
    use clinic_core::{CoreConfig, FixedClock, Money, NonEmptyText};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    struct Harness {
        _dir: TempDir,
        app: Router,
        patient_id: i64,
        doctor_id: i64,
        med_id: i64,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(
            CoreConfig::new(dir.path().join("clinic.db"), Duration::from_secs(5))
                .expect("CoreConfig::new should succeed"),
        );
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 3, 3, 8, 30, 0).unwrap());
        let service = ClinicService::with_clock(cfg, Arc::new(clock));
        service.database().migrate().expect("migrate should succeed");

        let dept = service
            .add_department(&NonEmptyText::new("General Medicine").unwrap())
            .expect("add_department should succeed");
        let doctor = service
            .add_doctor(&NewDoctor {
                name: NonEmptyText::new("Dr Lin").unwrap(),
                title: None,
                dept_id: dept.dept_id,
                reg_fee: Money::from_cents(1_500),
            })
            .expect("add_doctor should succeed");
        let patient = service
            .add_patient(&NewPatient {
                name: "Zhang San".into(),
                ..NewPatient::default()
            })
            .expect("add_patient should succeed");
        let medicine = service
            .add_medicine(
                &NonEmptyText::new("Amoxicillin").unwrap(),
                Money::from_cents(1_250),
                10,
            )
            .expect("add_medicine should succeed");

        Harness {
            _dir: dir,
            app: router(AppState::new(service, KEY)),
            patient_id: patient.patient_id.0,
            doctor_id: doctor.doctor_id.0,
            med_id: medicine.med_id.0,
        }
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        role: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(API_KEY_HEADER, KEY);
        if let Some(role) = role {
            builder = builder.header(ROLE_HEADER, role);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be JSON")
        };
        (status, value)
    }

    fn booking(h: &Harness) -> Value {
        json!({
            "patient_id": h.patient_id,
            "doctor_id": h.doctor_id,
            "visit_date": "2025-03-04",
            "time_slot": "09:00-10:00"
        })
    }

    #[tokio::test]
    async fn test_health_reports_migrated_store() {
        let h = harness();
        let (status, body) = call(&h.app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_requests_without_a_valid_key_are_rejected() {
        let h = harness();
        let request = Request::builder()
            .method(Method::GET)
            .uri("/medicines")
            .header(ROLE_HEADER, "admin")
            .body(Body::empty())
            .expect("request should build");
        let response = h
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_role_gate_blocks_patient_dispense() {
        let h = harness();
        let (status, body) = call(
            &h.app,
            Method::POST,
            "/pharmacy/dispense",
            Some("patient"),
            Some(json!({"reg_id": 1, "med_id": h.med_id})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], json!("unauthorised"));
    }

    #[tokio::test]
    async fn test_full_slot_is_a_conflict() {
        let h = harness();
        let (status, _) = call(
            &h.app,
            Method::PUT,
            "/schedules",
            Some("admin"),
            Some(json!({
                "doctor_id": h.doctor_id,
                "date": "2025-03-04",
                "time_slot": "09:00-10:00",
                "max_slots": 1
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/registrations",
            Some("patient"),
            Some(booking(&h)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["queue_num"], json!(1));
        assert_eq!(body["shift"], json!("MORNING"));

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/registrations",
            Some("patient"),
            Some(booking(&h)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], json!("capacity_exceeded"));
    }

    #[tokio::test]
    async fn test_visit_flow_over_http() {
        let h = harness();
        let (_, reg) = call(
            &h.app,
            Method::POST,
            "/registrations",
            Some("admin"),
            Some(booking(&h)),
        )
        .await;
        let reg_id = reg["reg_id"].as_i64().expect("reg_id should be a number");

        let (status, body) = call(
            &h.app,
            Method::POST,
            &format!("/registrations/{reg_id}/consultation/start"),
            Some("doctor"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["visit_status"], json!("IN_PROGRESS"));

        let (status, body) = call(
            &h.app,
            Method::POST,
            &format!("/registrations/{reg_id}/consultation"),
            Some("doctor"),
            Some(json!({
                "diagnosis": "tonsillitis",
                "prescriptions": [{"med_id": h.med_id, "quantity": 2}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prescriptions"][0]["total_amount"], json!("25.00"));

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/pharmacy/dispense",
            Some("admin"),
            Some(json!({"reg_id": reg_id, "med_id": h.med_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], json!("invalid_transition"));

        let (_, bill) = call(
            &h.app,
            Method::GET,
            &format!("/registrations/{reg_id}/bill"),
            Some("patient"),
            None,
        )
        .await;
        assert_eq!(bill["total"], json!("40.00"));

        let (status, body) = call(
            &h.app,
            Method::POST,
            &format!("/registrations/{reg_id}/pay"),
            Some("patient"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], json!("paid"));

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/pharmacy/dispense",
            Some("admin"),
            Some(json!({"reg_id": reg_id, "med_id": h.med_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], json!("dispensed"));
        assert_eq!(body["remaining_stock"], json!(8));

        let (_, body) = call(
            &h.app,
            Method::POST,
            "/pharmacy/dispense",
            Some("admin"),
            Some(json!({"reg_id": reg_id, "med_id": h.med_id})),
        )
        .await;
        assert_eq!(body["outcome"], json!("already_dispensed"));
    }

    #[tokio::test]
    async fn test_cancel_records_the_operator() {
        let h = harness();
        let (_, reg) = call(
            &h.app,
            Method::POST,
            "/registrations",
            Some("admin"),
            Some(booking(&h)),
        )
        .await;
        let reg_id = reg["reg_id"].as_i64().expect("reg_id should be a number");

        let (status, body) = call(
            &h.app,
            Method::POST,
            &format!("/registrations/{reg_id}/cancel"),
            Some("admin"),
            Some(json!({"operator_id": 7, "operator_name": "Front Desk"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], json!("cancelled"));

        let (_, entries) = call(&h.app, Method::GET, "/audit", Some("admin"), None).await;
        assert_eq!(entries[0]["op_type"], json!("CANCEL_REGISTRATION"));
        assert_eq!(entries[0]["operator_name"], json!("Front Desk"));
        assert_eq!(entries[0]["operator_role"], json!("ADMIN"));
    }

    #[tokio::test]
    async fn test_cashier_lists_the_day_by_fee_status() {
        let h = harness();
        let (_, reg) = call(
            &h.app,
            Method::POST,
            "/registrations",
            Some("admin"),
            Some(booking(&h)),
        )
        .await;
        let reg_id = reg["reg_id"].as_i64().expect("reg_id should be a number");
        call(
            &h.app,
            Method::POST,
            &format!("/registrations/{reg_id}/pay"),
            Some("admin"),
            None,
        )
        .await;

        let (status, body) = call(
            &h.app,
            Method::GET,
            "/cashier?date=2025-03-04&status=paid",
            Some("admin"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("PAID"));
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["amount"], json!("15.00"));
        assert_eq!(body["rows"][0]["reg_id"], json!(reg_id));
        assert_eq!(body["rows"][0]["patient_name"], json!("Zhang San"));
        assert_eq!(body["rows"][0]["doctor_name"], json!("Dr Lin"));

        let (_, body) = call(
            &h.app,
            Method::GET,
            "/cashier?date=2025-03-04&status=unpaid",
            Some("admin"),
            None,
        )
        .await;
        assert_eq!(body["count"], json!(0));

        let (status, _) = call(
            &h.app,
            Method::GET,
            "/cashier?date=2025-03-04",
            Some("patient"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &h.app,
            Method::GET,
            "/cashier?date=2025-03-04&status=refunded",
            Some("admin"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], json!("invalid_input"));
    }

    #[tokio::test]
    async fn test_unknown_registration_is_not_found() {
        let h = harness();
        let (status, body) = call(
            &h.app,
            Method::GET,
            "/registrations/999",
            Some("admin"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], json!("not_found"));
    }

    #[test]
    fn test_openapi_lists_dispense_path() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/pharmacy/dispense"));
        assert!(doc.paths.paths.contains_key("/cashier"));
    }
}
