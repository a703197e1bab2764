// Loan Servicing - Web Server
// REST API with Axum over the shared SQLite database

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use loan_servicing::db::{self, is_constraint_violation};
use loan_servicing::logging::init_logging;
use loan_servicing::schema::{describe, SchemaValidator, ValidationError};
use loan_servicing::{
    calculator, Borrower, BorrowerType, Config, Draw, DrawStatus, Lender, LenderType, Loan,
    LoanStatus, Payment, PaymentMethod, Property, PropertyType,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    actor: String,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "database lock poisoned"))
    }
}

// ============================================================================
// Response envelope & errors
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            fields: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct FieldError {
    field: String,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    fields: Vec<ValidationError>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    fn not_found(what: &str, id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found: {}", what, id))
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    fn invalid(errors: Vec<ValidationError>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: describe(&errors),
            fields: errors,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if is_constraint_violation(&err) {
            warn!("constraint violation: {:#}", err);
            return ApiError::conflict("Conflicts with existing records");
        }
        error!("database error: {:#}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
            fields: self
                .fields
                .into_iter()
                .map(|e| FieldError {
                    field: e.field,
                    message: e.message,
                })
                .collect(),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::ok(data))))
}

fn created<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct BorrowerInput {
    full_name: String,
    email: String,
    phone: Option<String>,
    borrower_type: BorrowerType,
    credit_score: Option<i32>,
}

impl BorrowerInput {
    fn apply(self, borrower: &mut Borrower) {
        borrower.full_name = self.full_name;
        borrower.email = self.email;
        borrower.phone = self.phone;
        borrower.borrower_type = self.borrower_type;
        borrower.credit_score = self.credit_score;
    }
}

#[derive(Deserialize)]
struct LenderInput {
    name: String,
    email: String,
    lender_type: LenderType,
    #[serde(default)]
    capital_committed: f64,
}

impl LenderInput {
    fn apply(self, lender: &mut Lender) {
        lender.name = self.name;
        lender.email = self.email;
        lender.lender_type = self.lender_type;
        lender.capital_committed = self.capital_committed;
    }
}

#[derive(Deserialize)]
struct PropertyInput {
    address: String,
    city: String,
    state: String,
    zip: String,
    property_type: PropertyType,
    #[serde(default)]
    property_value: f64,
    #[serde(default)]
    purchase_price: f64,
    #[serde(default)]
    rehab_budget: f64,
}

impl PropertyInput {
    fn apply(self, property: &mut Property) {
        property.address = self.address;
        property.city = self.city;
        property.state = self.state;
        property.zip = self.zip;
        property.property_type = self.property_type;
        property.property_value = self.property_value;
        property.purchase_price = self.purchase_price;
        property.rehab_budget = self.rehab_budget;
    }
}

#[derive(Deserialize)]
struct LoanInput {
    loan_number: String,
    borrower_id: String,
    lender_id: String,
    property_id: String,
    principal: f64,
    interest_rate: f64,
    term_months: i32,
    origination_date: NaiveDate,
    status: Option<LoanStatus>,
}

impl LoanInput {
    fn apply(self, loan: &mut Loan) {
        loan.loan_number = self.loan_number;
        loan.borrower_id = self.borrower_id;
        loan.lender_id = self.lender_id;
        loan.property_id = self.property_id;
        loan.principal = self.principal;
        loan.interest_rate = self.interest_rate;
        loan.term_months = self.term_months;
        loan.origination_date = self.origination_date;
        if let Some(status) = self.status {
            loan.status = status;
        }
    }
}

#[derive(Deserialize)]
struct DrawInput {
    amount: f64,
    description: String,
    requested_date: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
struct FundInput {
    funded_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct PaymentInput {
    amount: f64,
    payment_date: Option<NaiveDate>,
    method: PaymentMethod,
    reference: Option<String>,
}

#[derive(Deserialize)]
struct CalculatorInput {
    principal: f64,
    interest_rate: f64,
    term_months: i32,
    origination_date: Option<NaiveDate>,
    property_value: Option<f64>,
    purchase_price: Option<f64>,
    rehab_budget: Option<f64>,
}

#[derive(Serialize)]
struct CalculatorResponse {
    monthly_payment: f64,
    total_interest: f64,
    total_paid: f64,
    maturity_date: NaiveDate,
    ltv: Option<f64>,
    ltc: Option<f64>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

// ---- Borrowers -------------------------------------------------------------

async fn list_borrowers(State(state): State<AppState>) -> ApiResult<Vec<Borrower>> {
    let conn = state.conn()?;
    ok(db::list_borrowers(&conn)?)
}

async fn get_borrower(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Borrower> {
    let conn = state.conn()?;
    let borrower = db::get_borrower(&conn, &id)?.ok_or_else(|| ApiError::not_found("Borrower", &id))?;
    ok(borrower)
}

async fn create_borrower(
    State(state): State<AppState>,
    Json(input): Json<BorrowerInput>,
) -> ApiResult<Borrower> {
    let mut borrower = Borrower::new(String::new(), String::new(), input.borrower_type);
    input.apply(&mut borrower);
    SchemaValidator::new().validate_borrower(&borrower).map_err(ApiError::invalid)?;

    let conn = state.conn()?;
    db::insert_borrower(&conn, &borrower, &state.actor)?;
    created(borrower)
}

async fn update_borrower(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<BorrowerInput>,
) -> ApiResult<Borrower> {
    let conn = state.conn()?;
    let mut borrower = db::get_borrower(&conn, &id)?.ok_or_else(|| ApiError::not_found("Borrower", &id))?;
    input.apply(&mut borrower);
    SchemaValidator::new().validate_borrower(&borrower).map_err(ApiError::invalid)?;

    db::update_borrower(&conn, &mut borrower, &state.actor)?;
    ok(borrower)
}

async fn delete_borrower(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    let conn = state.conn()?;
    if !db::delete_borrower(&conn, &id, &state.actor)? {
        return Err(ApiError::not_found("Borrower", &id));
    }
    ok(id)
}

// ---- Lenders ---------------------------------------------------------------

async fn list_lenders(State(state): State<AppState>) -> ApiResult<Vec<Lender>> {
    let conn = state.conn()?;
    ok(db::list_lenders(&conn)?)
}

async fn get_lender(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Lender> {
    let conn = state.conn()?;
    let lender = db::get_lender(&conn, &id)?.ok_or_else(|| ApiError::not_found("Lender", &id))?;
    ok(lender)
}

async fn create_lender(State(state): State<AppState>, Json(input): Json<LenderInput>) -> ApiResult<Lender> {
    let mut lender = Lender::new(String::new(), String::new(), input.lender_type, 0.0);
    input.apply(&mut lender);
    SchemaValidator::new().validate_lender(&lender).map_err(ApiError::invalid)?;

    let conn = state.conn()?;
    db::insert_lender(&conn, &lender, &state.actor)?;
    created(lender)
}

async fn update_lender(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<LenderInput>,
) -> ApiResult<Lender> {
    let conn = state.conn()?;
    let mut lender = db::get_lender(&conn, &id)?.ok_or_else(|| ApiError::not_found("Lender", &id))?;
    input.apply(&mut lender);
    SchemaValidator::new().validate_lender(&lender).map_err(ApiError::invalid)?;

    db::update_lender(&conn, &mut lender, &state.actor)?;
    ok(lender)
}

async fn delete_lender(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    let conn = state.conn()?;
    if !db::delete_lender(&conn, &id, &state.actor)? {
        return Err(ApiError::not_found("Lender", &id));
    }
    ok(id)
}

// ---- Properties ------------------------------------------------------------

async fn list_properties(State(state): State<AppState>) -> ApiResult<Vec<Property>> {
    let conn = state.conn()?;
    ok(db::list_properties(&conn)?)
}

async fn get_property(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Property> {
    let conn = state.conn()?;
    let property = db::get_property(&conn, &id)?.ok_or_else(|| ApiError::not_found("Property", &id))?;
    ok(property)
}

async fn create_property(
    State(state): State<AppState>,
    Json(input): Json<PropertyInput>,
) -> ApiResult<Property> {
    let mut property = Property::new(
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        input.property_type,
    );
    input.apply(&mut property);
    SchemaValidator::new().validate_property(&property).map_err(ApiError::invalid)?;

    let conn = state.conn()?;
    db::insert_property(&conn, &property, &state.actor)?;
    created(property)
}

async fn update_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<PropertyInput>,
) -> ApiResult<Property> {
    let conn = state.conn()?;
    let mut property = db::get_property(&conn, &id)?.ok_or_else(|| ApiError::not_found("Property", &id))?;
    input.apply(&mut property);
    SchemaValidator::new().validate_property(&property).map_err(ApiError::invalid)?;

    db::update_property(&conn, &mut property, &state.actor)?;
    ok(property)
}

async fn delete_property(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    let conn = state.conn()?;
    if !db::delete_property(&conn, &id, &state.actor)? {
        return Err(ApiError::not_found("Property", &id));
    }
    ok(id)
}

// ---- Loans -----------------------------------------------------------------

fn load_loan(conn: &Connection, id: &str) -> Result<Loan, ApiError> {
    db::get_loan(conn, id)?.ok_or_else(|| ApiError::not_found("Loan", id))
}

/// Paid Off and Defaulted loans take no new draws or payments
fn ensure_open(loan: &Loan, what: &str) -> Result<(), ApiError> {
    if loan.status.is_open() {
        return Ok(());
    }
    Err(ApiError::conflict(format!(
        "Loan {} is {}; {} are closed",
        loan.loan_number,
        loan.status.as_str(),
        what
    )))
}

async fn list_loans(State(state): State<AppState>) -> ApiResult<Vec<Loan>> {
    let conn = state.conn()?;
    ok(db::list_loans(&conn)?)
}

async fn get_loan(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Loan> {
    let conn = state.conn()?;
    ok(load_loan(&conn, &id)?)
}

async fn create_loan(State(state): State<AppState>, Json(input): Json<LoanInput>) -> ApiResult<Loan> {
    let mut loan = Loan::new(
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        0.0,
        0.0,
        0,
        input.origination_date,
    );
    input.apply(&mut loan);
    SchemaValidator::new().validate_loan(&loan).map_err(ApiError::invalid)?;

    let conn = state.conn()?;
    db::insert_loan(&conn, &loan, &state.actor)?;
    created(loan)
}

async fn update_loan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<LoanInput>,
) -> ApiResult<Loan> {
    let conn = state.conn()?;
    let mut loan = load_loan(&conn, &id)?;
    input.apply(&mut loan);
    SchemaValidator::new().validate_loan(&loan).map_err(ApiError::invalid)?;

    db::update_loan(&conn, &mut loan, &state.actor)?;
    ok(loan)
}

async fn delete_loan(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    let conn = state.conn()?;
    if !db::delete_loan(&conn, &id, &state.actor)? {
        return Err(ApiError::not_found("Loan", &id));
    }
    ok(id)
}

/// GET /api/loans/:id/summary - Derived figures (payment, maturity, LTV...)
async fn loan_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<loan_servicing::LoanSummary> {
    let conn = state.conn()?;
    let loan = load_loan(&conn, &id)?;
    let property = db::get_property(&conn, &loan.property_id)?;
    ok(loan.summary(property.as_ref(), today()))
}

async fn loan_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<calculator::ScheduleRow>> {
    let conn = state.conn()?;
    ok(load_loan(&conn, &id)?.schedule())
}

async fn loan_events(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<db::Event>> {
    let conn = state.conn()?;
    ok(db::get_events_for_entity(&conn, "loan", &id)?)
}

// ---- Draws -----------------------------------------------------------------

async fn list_draws(State(state): State<AppState>, Path(loan_id): Path<String>) -> ApiResult<Vec<Draw>> {
    let conn = state.conn()?;
    load_loan(&conn, &loan_id)?;
    ok(db::list_draws_for_loan(&conn, &loan_id)?)
}

/// POST /api/loans/:id/draws - Request a draw; pending + funded draws may not exceed principal
async fn create_draw(
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
    Json(input): Json<DrawInput>,
) -> ApiResult<Draw> {
    let conn = state.conn()?;
    let loan = load_loan(&conn, &loan_id)?;
    ensure_open(&loan, "draws")?;

    let committed: f64 = db::list_draws_for_loan(&conn, &loan_id)?
        .iter()
        .filter(|d| d.status != DrawStatus::Rejected)
        .map(|d| d.amount)
        .sum();

    let draw = Draw::new(
        loan_id,
        input.amount,
        input.description,
        input.requested_date.unwrap_or_else(today),
    );
    SchemaValidator::new()
        .validate_draw_against_loan(&draw, &loan, committed)
        .map_err(ApiError::invalid)?;

    db::insert_draw(&conn, &draw, &state.actor)?;
    created(draw)
}

#[derive(Clone, Copy)]
enum DrawAction {
    Approve,
    Reject,
    Fund,
}

fn change_draw(state: &AppState, id: &str, action: DrawAction, funded_date: Option<NaiveDate>) -> ApiResult<Draw> {
    let conn = state.conn()?;
    let mut draw = db::get_draw(&conn, id)?.ok_or_else(|| ApiError::not_found("Draw", id))?;

    let result = match action {
        DrawAction::Approve => draw.approve(),
        DrawAction::Reject => draw.reject(),
        DrawAction::Fund => {
            let loan = load_loan(&conn, &draw.loan_id)?;
            let funded = db::funded_draw_total(&conn, &loan.id)?;
            SchemaValidator::new()
                .validate_draw_against_loan(&draw, &loan, funded)
                .map_err(ApiError::invalid)?;
            draw.fund(funded_date.unwrap_or_else(today))
        }
    };
    result.map_err(|e| ApiError::conflict(e.to_string()))?;

    db::update_draw(&conn, &draw, &state.actor)?;
    ok(draw)
}

async fn approve_draw(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Draw> {
    change_draw(&state, &id, DrawAction::Approve, None)
}

async fn reject_draw(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Draw> {
    change_draw(&state, &id, DrawAction::Reject, None)
}

async fn fund_draw(
    State(state): State<AppState>,
    Path(id): Path<String>,
    input: Option<Json<FundInput>>,
) -> ApiResult<Draw> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    change_draw(&state, &id, DrawAction::Fund, input.funded_date)
}

// ---- Payments --------------------------------------------------------------

async fn list_payments(State(state): State<AppState>, Path(loan_id): Path<String>) -> ApiResult<Vec<Payment>> {
    let conn = state.conn()?;
    load_loan(&conn, &loan_id)?;
    ok(db::list_payments_for_loan(&conn, &loan_id)?)
}

/// POST /api/loans/:id/payments - Record a payment and roll it into the loan
async fn create_payment(
    State(state): State<AppState>,
    Path(loan_id): Path<String>,
    Json(input): Json<PaymentInput>,
) -> ApiResult<Payment> {
    let conn = state.conn()?;
    let mut loan = load_loan(&conn, &loan_id)?;

    ensure_open(&loan, "payments")?;

    let mut payment = Payment::for_loan(
        &loan,
        input.amount,
        input.payment_date.unwrap_or_else(today),
        input.method,
    );
    payment.reference = input.reference;
    SchemaValidator::new().validate_payment(&payment).map_err(ApiError::invalid)?;

    if !db::record_payment(&conn, &mut loan, &payment, &state.actor)? {
        return Err(ApiError::conflict("Duplicate payment"));
    }
    created(payment)
}

// ---- Calculator ------------------------------------------------------------

/// POST /api/calculator - Stateless loan math, nothing is stored
async fn calculate(Json(input): Json<CalculatorInput>) -> ApiResult<CalculatorResponse> {
    if !(1..=calculator::MAX_TERM_MONTHS).contains(&input.term_months) {
        return Err(ApiError::invalid(vec![ValidationError {
            field: "term_months".to_string(),
            message: format!(
                "Must be between 1 and {} months, got {}",
                calculator::MAX_TERM_MONTHS,
                input.term_months
            ),
            context: "Calculator".to_string(),
        }]));
    }

    let payment = calculator::monthly_payment(input.principal, input.interest_rate, input.term_months);
    let origination = input.origination_date.unwrap_or_else(today);

    ok(CalculatorResponse {
        monthly_payment: payment,
        total_interest: calculator::total_interest(input.principal, payment, input.term_months),
        total_paid: calculator::round_cents(payment * input.term_months.max(0) as f64),
        maturity_date: calculator::maturity_date(origination, input.term_months),
        ltv: input
            .property_value
            .map(|value| calculator::loan_to_value(input.principal, value)),
        ltc: input
            .purchase_price
            .map(|price| calculator::loan_to_cost(input.principal, price, input.rehab_budget)),
    })
}

/// GET / - Serve dashboard
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/borrowers", get(list_borrowers).post(create_borrower))
        .route(
            "/borrowers/:id",
            get(get_borrower).put(update_borrower).delete(delete_borrower),
        )
        .route("/lenders", get(list_lenders).post(create_lender))
        .route("/lenders/:id", get(get_lender).put(update_lender).delete(delete_lender))
        .route("/properties", get(list_properties).post(create_property))
        .route(
            "/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route("/loans", get(list_loans).post(create_loan))
        .route("/loans/:id", get(get_loan).put(update_loan).delete(delete_loan))
        .route("/loans/:id/summary", get(loan_summary))
        .route("/loans/:id/schedule", get(loan_schedule))
        .route("/loans/:id/events", get(loan_events))
        .route("/loans/:id/draws", get(list_draws).post(create_draw))
        .route("/loans/:id/payments", get(list_payments).post(create_payment))
        .route("/draws/:id/approve", post(approve_draw))
        .route("/draws/:id/reject", post(reject_draw))
        .route("/draws/:id/fund", post(fund_draw))
        .route("/calculator", post(calculate))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");
    let config = Config::from_env();

    info!("🌐 Loan Servicing - Web Server");

    let conn = db::open_database(&config.database_path)?;
    info!(path = %config.database_path.display(), "database opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        actor: config.actor.clone(),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;

    info!("🚀 Server running on http://{}", config.server_addr);
    info!("   API: http://{}/api/loans", config.server_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        AppState {
            db: Arc::new(Mutex::new(conn)),
            actor: "test".to_string(),
        }
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Creates borrower, lender, property, loan; returns the loan id
    async fn seed_loan(state: &AppState) -> String {
        let (_, borrower) = call(
            state,
            "POST",
            "/api/borrowers",
            Some(json!({"full_name": "Sam Ortiz", "email": "sam@example.com", "borrower_type": "Llc"})),
        )
        .await;
        let (_, lender) = call(
            state,
            "POST",
            "/api/lenders",
            Some(json!({"name": "Fund II", "email": "f2@example.com", "lender_type": "Fund", "capital_committed": 2000000.0})),
        )
        .await;
        let (_, property) = call(
            state,
            "POST",
            "/api/properties",
            Some(json!({
                "address": "44 Pine", "city": "Tampa", "state": "FL", "zip": "33602",
                "property_type": "SingleFamily",
                "property_value": 400000.0, "purchase_price": 250000.0, "rehab_budget": 70000.0
            })),
        )
        .await;

        let (status, loan) = call(
            state,
            "POST",
            "/api/loans",
            Some(json!({
                "loan_number": "LN-100",
                "borrower_id": borrower["data"]["id"],
                "lender_id": lender["data"]["id"],
                "property_id": property["data"]["id"],
                "principal": 240000.0,
                "interest_rate": 12.0,
                "term_months": 12,
                "origination_date": "2024-01-15"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        loan["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&test_state(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_calculator_endpoint() {
        let (status, body) = call(
            &test_state(),
            "POST",
            "/api/calculator",
            Some(json!({
                "principal": 100000.0, "interest_rate": 6.0, "term_months": 360,
                "origination_date": "2024-01-15", "property_value": 125000.0
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["monthly_payment"], 599.55);
        assert_eq!(body["data"]["maturity_date"], "2054-01-15");
        assert_eq!(body["data"]["ltv"], 80.0);
        assert!(body["data"]["ltc"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_borrower_is_422() {
        let (status, body) = call(
            &test_state(),
            "POST",
            "/api/borrowers",
            Some(json!({"full_name": "", "email": "nope", "borrower_type": "Individual"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["fields"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_loan_is_404() {
        let (status, _) = call(&test_state(), "GET", "/api/loans/does-not-exist/summary", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_loan_summary_and_payment_flow() {
        let state = test_state();
        let loan_id = seed_loan(&state).await;

        let (status, summary) = call(&state, "GET", &format!("/api/loans/{}/summary", loan_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["data"]["ltv"], 60.0);
        assert_eq!(summary["data"]["ltc"], 75.0);
        assert_eq!(summary["data"]["maturity_date"], "2025-01-15");

        let payment = json!({"amount": 5000.0, "payment_date": "2024-02-15", "method": "Ach", "reference": "A-1"});
        let (status, body) = call(&state, "POST", &format!("/api/loans/{}/payments", loan_id), Some(payment.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["interest_portion"], 2400.0);
        assert_eq!(body["data"]["principal_portion"], 2600.0);

        let (status, _) = call(&state, "POST", &format!("/api/loans/{}/payments", loan_id), Some(payment)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, loan) = call(&state, "GET", &format!("/api/loans/{}", loan_id), None).await;
        assert_eq!(loan["data"]["status"], "Active");
        assert_eq!(loan["data"]["principal_paid"], 2600.0);
        assert_eq!(loan["data"]["last_payment_date"], "2024-02-15");
    }

    #[tokio::test]
    async fn test_draw_flow_respects_principal() {
        let state = test_state();
        let loan_id = seed_loan(&state).await;
        let draws_uri = format!("/api/loans/{}/draws", loan_id);

        let (status, draw) = call(
            &state,
            "POST",
            &draws_uri,
            Some(json!({"amount": 200000.0, "description": "Gut rehab", "requested_date": "2024-02-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let draw_id = draw["data"]["id"].as_str().unwrap().to_string();

        // 200k requested + 50k would exceed the 240k principal
        let (status, _) = call(
            &state,
            "POST",
            &draws_uri,
            Some(json!({"amount": 50000.0, "description": "Landscaping"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        // Funding before approval is refused
        let (status, _) = call(&state, "POST", &format!("/api/draws/{}/fund", draw_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&state, "POST", &format!("/api/draws/{}/approve", draw_id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, funded) = call(
            &state,
            "POST",
            &format!("/api/draws/{}/fund", draw_id),
            Some(json!({"funded_date": "2024-02-10"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(funded["data"]["status"], "Funded");
        assert_eq!(funded["data"]["funded_date"], "2024-02-10");
    }

    #[tokio::test]
    async fn test_calculator_rejects_out_of_range_term() {
        let (status, body) = call(
            &test_state(),
            "POST",
            "/api/calculator",
            Some(json!({"principal": 100000.0, "interest_rate": 6.0, "term_months": 2000000000})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "term_months");
    }

    #[tokio::test]
    async fn test_oversized_term_loan_is_rejected() {
        let state = test_state();
        let loan_id = seed_loan(&state).await;
        let (_, loan) = call(&state, "GET", &format!("/api/loans/{}", loan_id), None).await;

        let mut body = loan["data"].clone();
        body["term_months"] = json!(2_000_000_000);
        let (status, _) = call(&state, "PUT", &format!("/api/loans/{}", loan_id), Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, schedule) = call(&state, "GET", &format!("/api/loans/{}/schedule", loan_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(schedule["data"].as_array().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_closed_loan_refuses_draws() {
        let state = test_state();
        let loan_id = seed_loan(&state).await;

        {
            let conn = state.conn().unwrap();
            let mut loan = db::get_loan(&conn, &loan_id).unwrap().unwrap();
            loan.status = LoanStatus::PaidOff;
            db::update_loan(&conn, &mut loan, "test").unwrap();
        }

        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/loans/{}/draws", loan_id),
            Some(json!({"amount": 1000.0, "description": "Paint"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("draws are closed"));

        let (status, _) = call(
            &state,
            "POST",
            &format!("/api/loans/{}/payments", loan_id),
            Some(json!({"amount": 500.0, "method": "Wire"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delete_borrower_with_loan_is_conflict() {
        let state = test_state();
        let loan_id = seed_loan(&state).await;
        let (_, loan) = call(&state, "GET", &format!("/api/loans/{}", loan_id), None).await;
        let borrower_id = loan["data"]["borrower_id"].as_str().unwrap().to_string();

        let (status, _) = call(&state, "DELETE", &format!("/api/borrowers/{}", borrower_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&state, "DELETE", &format!("/api/loans/{}", loan_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&state, "DELETE", &format!("/api/borrowers/{}", borrower_id), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
