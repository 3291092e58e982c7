// Dojo Dues - Web Server
// REST API with Axum over the same store the CLI uses

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use chrono::{NaiveDate, Utc};
use dojo_dues::attendance::local_today;
use dojo_dues::{
    load_dashboard, reminders_for, setup_database, Config, DashboardView, DuesError, DuesStore,
    Member, MemberId, NewMember, PaymentEvent, PaymentId, Reminder, ReportPeriod,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

impl AppState {
    fn db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

enum ApiError {
    Dues(DuesError),
    Internal(String),
}

impl From<DuesError> for ApiError {
    fn from(err: DuesError) -> Self {
        ApiError::Dues(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Dues(err) => {
                let status = match &err {
                    DuesError::Validation(_) => StatusCode::BAD_REQUEST,
                    DuesError::Conflict(_) => StatusCode::CONFLICT,
                    DuesError::NotFound { .. } => StatusCode::NOT_FOUND,
                    e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "Request failed");
        }

        (status, Json(ApiResponse::<()>::err(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Operator name from the `x-actor` header, for the audit trail
fn actor(headers: &HeaderMap) -> String {
    headers
        .get("x-actor")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("api")
        .to_string()
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct DashboardQuery {
    /// `YYYY-MM`; absent or empty means the rolling six months
    month: Option<String>,
}

#[derive(Deserialize)]
struct MembersQuery {
    #[serde(default)]
    all: bool,
    search: Option<String>,
}

/// Enrollment body; `monthly_due` falls back to the configured default
#[derive(Deserialize)]
struct EnrollRequest {
    name: String,
    monthly_due: Option<Decimal>,
    belt: Option<String>,
    phone: Option<String>,
    age: Option<u8>,
    guardian: Option<String>,
    emergency_contact: Option<String>,
    photo_url: Option<String>,
}

impl EnrollRequest {
    fn into_form(self, default_due: Decimal) -> NewMember {
        let mut form = NewMember::new(self.name, self.monthly_due.unwrap_or(default_due));
        if let Some(belt) = self.belt {
            form.belt = belt;
        }
        form.phone = self.phone;
        form.age = self.age;
        form.guardian = self.guardian;
        form.emergency_contact = self.emergency_contact;
        form.photo_url = self.photo_url;
        form
    }
}

#[derive(Deserialize)]
struct PaymentRequest {
    member_id: MemberId,
    /// Defaults to the member's monthly due
    amount: Option<Decimal>,
    /// Collector; defaults to the `x-actor` operator
    recorded_by: Option<String>,
}

#[derive(Deserialize)]
struct AttendanceRequest {
    member_ids: Vec<MemberId>,
    /// Defaults to the local "today"
    date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct AttendanceResponse {
    date: NaiveDate,
    saved: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/dashboard?month=YYYY-MM - Full dashboard view state
async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardView> {
    let period = ReportPeriod::from_selection(query.month.as_deref())?;
    let conn = state.db()?;
    let view = load_dashboard(&*conn, period, Utc::now(), &state.config)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// GET /api/members - Roster, optionally with inactive members
async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<MembersQuery>,
) -> ApiResult<Vec<Member>> {
    let conn = state.db()?;
    let members = if query.all {
        conn.list_members()?
    } else {
        conn.list_active_members()?
    };

    let needle = query.search.unwrap_or_default().trim().to_lowercase();
    let members = members
        .into_iter()
        .filter(|member| member.name.to_lowercase().contains(&needle))
        .collect();

    Ok(Json(ApiResponse::ok(members)))
}

/// POST /api/members - Enroll a member
async fn enroll_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Member>>), ApiError> {
    let form = body.into_form(state.config.default_due);
    let conn = state.db()?;
    let member = conn.enroll_member(form, &actor(&headers))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(member))))
}

/// PUT /api/members/:id - Edit a member's details
async fn update_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<NewMember>,
) -> ApiResult<Member> {
    let conn = state.db()?;
    let member = conn.update_member(MemberId(id), body, &actor(&headers))?;
    Ok(Json(ApiResponse::ok(member)))
}

/// POST /api/members/:id/deactivate - Soft delete
async fn deactivate_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<MemberId> {
    let conn = state.db()?;
    conn.deactivate_member(MemberId(id), &actor(&headers))?;
    Ok(Json(ApiResponse::ok(MemberId(id))))
}

/// POST /api/payments - Record a payment now
async fn record_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentEvent>>), ApiError> {
    let recorded_by = body.recorded_by.unwrap_or_else(|| actor(&headers));
    let conn = state.db()?;
    let amount = match body.amount {
        Some(amount) => amount,
        None => conn.get_member(body.member_id)?.monthly_due,
    };
    let payment = conn.insert_payment(body.member_id, amount, &recorded_by, Utc::now())?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(payment))))
}

/// DELETE /api/payments/:id - Reverse a payment
async fn reverse_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<PaymentId> {
    let conn = state.db()?;
    conn.delete_payment(PaymentId(id), &actor(&headers))?;
    Ok(Json(ApiResponse::ok(PaymentId(id))))
}

/// POST /api/attendance - Batch check-in
async fn check_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AttendanceRequest>,
) -> ApiResult<AttendanceResponse> {
    let date = body
        .date
        .unwrap_or_else(|| local_today(Utc::now(), state.config.utc_offset));
    let conn = state.db()?;
    let saved = conn.insert_attendance_batch(&body.member_ids, date, &actor(&headers))?;
    Ok(Json(ApiResponse::ok(AttendanceResponse { date, saved })))
}

/// GET /api/reminders - WhatsApp links for unpaid members
async fn get_reminders(State(state): State<AppState>) -> ApiResult<Vec<Reminder>> {
    let conn = state.db()?;
    let view = load_dashboard(&*conn, ReportPeriod::Rolling, Utc::now(), &state.config)?;
    Ok(Json(ApiResponse::ok(reminders_for(view.unpaid()))))
}

// ============================================================================
// Main Server
// ============================================================================

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/members", get(list_members).post(enroll_member))
        .route("/members/:id", put(update_member))
        .route("/members/:id/deactivate", post(deactivate_member))
        .route("/payments", post(record_payment))
        .route("/payments/:id", delete(reverse_payment))
        .route("/attendance", post(check_in))
        .route("/reminders", get(get_reminders))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = Config::from_env().context("Failed to read configuration")?;

    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open database at {:?}", config.database_path))?;
    setup_database(&conn).context("Failed to set up database schema")?;
    tracing::info!(path = ?config.database_path, "Database opened");

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!(addr = %bind_addr, "🚀 Server running");

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Offset;
    use dojo_dues::RetryPolicy;
    use serde_json::json;
    use tower::ServiceExt;

    struct Fixture {
        state: AppState,
        active: MemberId,
        inactive: MemberId,
    }

    fn fixture() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let active = conn
            .enroll_member(NewMember::new("Ana", Decimal::from(600)), "admin")
            .unwrap()
            .id;
        let inactive = conn
            .enroll_member(NewMember::new("Beto", Decimal::from(500)), "admin")
            .unwrap()
            .id;
        conn.deactivate_member(inactive, "admin").unwrap();

        let mut config = Config::default();
        config.utc_offset = Utc.fix();
        config.retry = RetryPolicy::immediate(1);

        Fixture {
            state: AppState {
                db: Arc::new(Mutex::new(conn)),
                config: Arc::new(config),
            },
            active,
            inactive,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value, actor: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(actor) = actor {
            builder = builder.header("x-actor", actor);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn status_of(state: &AppState, request: Request<Body>) -> StatusCode {
        app(state.clone()).oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_dashboard_month_parameter() {
        let fx = fixture();

        assert_eq!(status_of(&fx.state, get("/api/dashboard")).await, StatusCode::OK);
        assert_eq!(status_of(&fx.state, get("/api/dashboard?month=")).await, StatusCode::OK);
        assert_eq!(
            status_of(&fx.state, get("/api/dashboard?month=2024-02")).await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(&fx.state, get("/api/dashboard?month=2024-13")).await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&fx.state, get("/api/dashboard?month=marzo")).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_payment_errors_map_to_status() {
        let fx = fixture();

        let inactive = post_json(
            "/api/payments",
            json!({ "member_id": fx.inactive, "amount": 500 }),
            None,
        );
        assert_eq!(status_of(&fx.state, inactive).await, StatusCode::CONFLICT);

        let negative = post_json(
            "/api/payments",
            json!({ "member_id": fx.active, "amount": -5 }),
            None,
        );
        assert_eq!(status_of(&fx.state, negative).await, StatusCode::BAD_REQUEST);

        let unknown = Request::builder()
            .method("DELETE")
            .uri("/api/payments/999")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(&fx.state, unknown).await, StatusCode::NOT_FOUND);

        assert!(fx.state.db.lock().unwrap().list_payments(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payment_collector_comes_from_actor_header() {
        let fx = fixture();

        let with_header = post_json(
            "/api/payments",
            json!({ "member_id": fx.active }),
            Some("sensei@dojo.com"),
        );
        assert_eq!(status_of(&fx.state, with_header).await, StatusCode::CREATED);

        let without_header = post_json("/api/payments", json!({ "member_id": fx.active }), None);
        assert_eq!(status_of(&fx.state, without_header).await, StatusCode::CREATED);

        let explicit = post_json(
            "/api/payments",
            json!({ "member_id": fx.active, "amount": 100, "recorded_by": "caja" }),
            Some("sensei@dojo.com"),
        );
        assert_eq!(status_of(&fx.state, explicit).await, StatusCode::CREATED);

        let payments = fx.state.db.lock().unwrap().list_payments(None).unwrap();
        let collectors: Vec<&str> = payments.iter().map(|p| p.recorded_by.as_str()).collect();
        assert_eq!(collectors, vec!["sensei@dojo.com", "api", "caja"]);
        assert_eq!(payments[0].amount, Decimal::from(600));
    }

    #[test]
    fn test_busy_storage_maps_to_service_unavailable() {
        let busy = DuesError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert_eq!(
            ApiError::from(busy).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let other = DuesError::Conflict("member 3 is inactive".to_string());
        assert_eq!(ApiError::from(other).into_response().status(), StatusCode::CONFLICT);
    }
}
