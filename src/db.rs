// 🗄️ Persistence - SQLite (WAL) storage for every entity + audit trail
//
// All functions take a borrowed `Connection`; callers own its lifetime.
// Every write also appends an `Event`, so the events table is a full
// history of who changed what.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::entities::{
    Borrower, BorrowerType, Draw, DrawStatus, Lender, LenderType, Loan, LoanStatus, Payment,
    PaymentMethod, Property, PropertyType,
};

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS borrowers (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            borrower_type TEXT NOT NULL,
            credit_score INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lenders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            lender_type TEXT NOT NULL,
            capital_committed REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS properties (
            id TEXT PRIMARY KEY,
            address TEXT NOT NULL,
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            zip TEXT NOT NULL,
            property_type TEXT NOT NULL,
            property_value REAL NOT NULL DEFAULT 0,
            purchase_price REAL NOT NULL DEFAULT 0,
            rehab_budget REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loans (
            id TEXT PRIMARY KEY,
            loan_number TEXT UNIQUE NOT NULL,
            borrower_id TEXT NOT NULL REFERENCES borrowers(id),
            lender_id TEXT NOT NULL REFERENCES lenders(id),
            property_id TEXT NOT NULL REFERENCES properties(id),
            principal REAL NOT NULL,
            interest_rate REAL NOT NULL,
            term_months INTEGER NOT NULL,
            origination_date TEXT NOT NULL,
            status TEXT NOT NULL,
            principal_paid REAL NOT NULL DEFAULT 0,
            last_payment_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS draws (
            id TEXT PRIMARY KEY,
            loan_id TEXT NOT NULL REFERENCES loans(id) ON DELETE CASCADE,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            requested_date TEXT NOT NULL,
            funded_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            idempotency_hash TEXT UNIQUE NOT NULL,
            loan_id TEXT NOT NULL REFERENCES loans(id) ON DELETE CASCADE,
            amount REAL NOT NULL,
            principal_portion REAL NOT NULL,
            interest_portion REAL NOT NULL,
            payment_date TEXT NOT NULL,
            method TEXT NOT NULL,
            reference TEXT,
            created_at TEXT NOT NULL
        );

        -- Audit trail
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_loans_borrower ON loans(borrower_id);
        CREATE INDEX IF NOT EXISTS idx_loans_lender ON loans(lender_id);
        CREATE INDEX IF NOT EXISTS idx_loans_property ON loans(property_id);
        CREATE INDEX IF NOT EXISTS idx_draws_loan ON draws(loan_id);
        CREATE INDEX IF NOT EXISTS idx_payments_loan ON payments(loan_id);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )?;

    debug!("database schema ready");
    Ok(())
}

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

/// True when the error came from a UNIQUE / FOREIGN KEY / CHECK violation
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    })
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: time_col(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn log_event<T: Serialize>(
    conn: &Connection,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data: &T,
    actor: &str,
) -> Result<()> {
    let event = Event::new(
        event_type,
        entity_type,
        entity_id,
        serde_json::to_value(data)?,
        actor,
    );
    insert_event(conn, &event)
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_date_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn enum_col<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unknown value '{}'", raw)))
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// BORROWERS
// ============================================================================

const BORROWER_COLUMNS: &str =
    "id, full_name, email, phone, borrower_type, credit_score, created_at, updated_at";

fn borrower_from_row(row: &Row) -> rusqlite::Result<Borrower> {
    Ok(Borrower {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        borrower_type: enum_col(row, 4, BorrowerType::parse)?,
        credit_score: row.get(5)?,
        created_at: time_col(row, 6)?,
        updated_at: time_col(row, 7)?,
    })
}

pub fn insert_borrower(conn: &Connection, borrower: &Borrower, actor: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO borrowers (id, full_name, email, phone, borrower_type, credit_score, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            borrower.id,
            borrower.full_name,
            borrower.email,
            borrower.phone,
            borrower.borrower_type.as_str(),
            borrower.credit_score,
            borrower.created_at.to_rfc3339(),
            borrower.updated_at.to_rfc3339(),
        ],
    )?;

    log_event(conn, "borrower_created", "borrower", &borrower.id, borrower, actor)?;
    info!(borrower_id = %borrower.id, "borrower created");
    Ok(())
}

pub fn get_borrower(conn: &Connection, id: &str) -> Result<Option<Borrower>> {
    let sql = format!("SELECT {} FROM borrowers WHERE id = ?1", BORROWER_COLUMNS);
    Ok(conn.query_row(&sql, params![id], borrower_from_row).optional()?)
}

pub fn list_borrowers(conn: &Connection) -> Result<Vec<Borrower>> {
    let sql = format!("SELECT {} FROM borrowers ORDER BY full_name", BORROWER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], borrower_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns false when no borrower has this id
pub fn update_borrower(conn: &Connection, borrower: &mut Borrower, actor: &str) -> Result<bool> {
    borrower.touch();

    let changed = conn.execute(
        "UPDATE borrowers SET full_name = ?2, email = ?3, phone = ?4, borrower_type = ?5,
                credit_score = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            borrower.id,
            borrower.full_name,
            borrower.email,
            borrower.phone,
            borrower.borrower_type.as_str(),
            borrower.credit_score,
            borrower.updated_at.to_rfc3339(),
        ],
    )?;

    if changed > 0 {
        log_event(conn, "borrower_updated", "borrower", &borrower.id, borrower, actor)?;
    }
    Ok(changed > 0)
}

pub fn delete_borrower(conn: &Connection, id: &str, actor: &str) -> Result<bool> {
    delete_row(conn, "borrowers", "borrower", id, actor)
}

// ============================================================================
// LENDERS
// ============================================================================

const LENDER_COLUMNS: &str =
    "id, name, email, lender_type, capital_committed, created_at, updated_at";

fn lender_from_row(row: &Row) -> rusqlite::Result<Lender> {
    Ok(Lender {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        lender_type: enum_col(row, 3, LenderType::parse)?,
        capital_committed: row.get(4)?,
        created_at: time_col(row, 5)?,
        updated_at: time_col(row, 6)?,
    })
}

pub fn insert_lender(conn: &Connection, lender: &Lender, actor: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO lenders (id, name, email, lender_type, capital_committed, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            lender.id,
            lender.name,
            lender.email,
            lender.lender_type.as_str(),
            lender.capital_committed,
            lender.created_at.to_rfc3339(),
            lender.updated_at.to_rfc3339(),
        ],
    )?;

    log_event(conn, "lender_created", "lender", &lender.id, lender, actor)?;
    info!(lender_id = %lender.id, "lender created");
    Ok(())
}

pub fn get_lender(conn: &Connection, id: &str) -> Result<Option<Lender>> {
    let sql = format!("SELECT {} FROM lenders WHERE id = ?1", LENDER_COLUMNS);
    Ok(conn.query_row(&sql, params![id], lender_from_row).optional()?)
}

pub fn list_lenders(conn: &Connection) -> Result<Vec<Lender>> {
    let sql = format!("SELECT {} FROM lenders ORDER BY name", LENDER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], lender_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_lender(conn: &Connection, lender: &mut Lender, actor: &str) -> Result<bool> {
    lender.touch();

    let changed = conn.execute(
        "UPDATE lenders SET name = ?2, email = ?3, lender_type = ?4, capital_committed = ?5,
                updated_at = ?6
         WHERE id = ?1",
        params![
            lender.id,
            lender.name,
            lender.email,
            lender.lender_type.as_str(),
            lender.capital_committed,
            lender.updated_at.to_rfc3339(),
        ],
    )?;

    if changed > 0 {
        log_event(conn, "lender_updated", "lender", &lender.id, lender, actor)?;
    }
    Ok(changed > 0)
}

pub fn delete_lender(conn: &Connection, id: &str, actor: &str) -> Result<bool> {
    delete_row(conn, "lenders", "lender", id, actor)
}

// ============================================================================
// PROPERTIES
// ============================================================================

const PROPERTY_COLUMNS: &str = "id, address, city, state, zip, property_type, property_value, \
     purchase_price, rehab_budget, created_at, updated_at";

fn property_from_row(row: &Row) -> rusqlite::Result<Property> {
    Ok(Property {
        id: row.get(0)?,
        address: row.get(1)?,
        city: row.get(2)?,
        state: row.get(3)?,
        zip: row.get(4)?,
        property_type: enum_col(row, 5, PropertyType::parse)?,
        property_value: row.get(6)?,
        purchase_price: row.get(7)?,
        rehab_budget: row.get(8)?,
        created_at: time_col(row, 9)?,
        updated_at: time_col(row, 10)?,
    })
}

pub fn insert_property(conn: &Connection, property: &Property, actor: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO properties (id, address, city, state, zip, property_type, property_value,
                purchase_price, rehab_budget, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            property.id,
            property.address,
            property.city,
            property.state,
            property.zip,
            property.property_type.as_str(),
            property.property_value,
            property.purchase_price,
            property.rehab_budget,
            property.created_at.to_rfc3339(),
            property.updated_at.to_rfc3339(),
        ],
    )?;

    log_event(conn, "property_created", "property", &property.id, property, actor)?;
    info!(property_id = %property.id, "property created");
    Ok(())
}

pub fn get_property(conn: &Connection, id: &str) -> Result<Option<Property>> {
    let sql = format!("SELECT {} FROM properties WHERE id = ?1", PROPERTY_COLUMNS);
    Ok(conn.query_row(&sql, params![id], property_from_row).optional()?)
}

pub fn list_properties(conn: &Connection) -> Result<Vec<Property>> {
    let sql = format!("SELECT {} FROM properties ORDER BY state, city, address", PROPERTY_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], property_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_property(conn: &Connection, property: &mut Property, actor: &str) -> Result<bool> {
    property.touch();

    let changed = conn.execute(
        "UPDATE properties SET address = ?2, city = ?3, state = ?4, zip = ?5, property_type = ?6,
                property_value = ?7, purchase_price = ?8, rehab_budget = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            property.id,
            property.address,
            property.city,
            property.state,
            property.zip,
            property.property_type.as_str(),
            property.property_value,
            property.purchase_price,
            property.rehab_budget,
            property.updated_at.to_rfc3339(),
        ],
    )?;

    if changed > 0 {
        log_event(conn, "property_updated", "property", &property.id, property, actor)?;
    }
    Ok(changed > 0)
}

pub fn delete_property(conn: &Connection, id: &str, actor: &str) -> Result<bool> {
    delete_row(conn, "properties", "property", id, actor)
}

// ============================================================================
// LOANS
// ============================================================================

const LOAN_COLUMNS: &str = "id, loan_number, borrower_id, lender_id, property_id, principal, \
     interest_rate, term_months, origination_date, status, principal_paid, last_payment_date, \
     created_at, updated_at";

fn loan_from_row(row: &Row) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: row.get(0)?,
        loan_number: row.get(1)?,
        borrower_id: row.get(2)?,
        lender_id: row.get(3)?,
        property_id: row.get(4)?,
        principal: row.get(5)?,
        interest_rate: row.get(6)?,
        term_months: row.get(7)?,
        origination_date: date_col(row, 8)?,
        status: enum_col(row, 9, LoanStatus::parse)?,
        principal_paid: row.get(10)?,
        last_payment_date: opt_date_col(row, 11)?,
        created_at: time_col(row, 12)?,
        updated_at: time_col(row, 13)?,
    })
}

pub fn insert_loan(conn: &Connection, loan: &Loan, actor: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO loans (id, loan_number, borrower_id, lender_id, property_id, principal,
                interest_rate, term_months, origination_date, status, principal_paid,
                last_payment_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            loan.id,
            loan.loan_number,
            loan.borrower_id,
            loan.lender_id,
            loan.property_id,
            loan.principal,
            loan.interest_rate,
            loan.term_months,
            date_str(loan.origination_date),
            loan.status.as_str(),
            loan.principal_paid,
            loan.last_payment_date.map(date_str),
            loan.created_at.to_rfc3339(),
            loan.updated_at.to_rfc3339(),
        ],
    )?;

    log_event(conn, "loan_created", "loan", &loan.id, loan, actor)?;
    info!(loan_id = %loan.id, loan_number = %loan.loan_number, "loan created");
    Ok(())
}

pub fn get_loan(conn: &Connection, id: &str) -> Result<Option<Loan>> {
    let sql = format!("SELECT {} FROM loans WHERE id = ?1", LOAN_COLUMNS);
    Ok(conn.query_row(&sql, params![id], loan_from_row).optional()?)
}

pub fn get_loan_by_number(conn: &Connection, loan_number: &str) -> Result<Option<Loan>> {
    let sql = format!("SELECT {} FROM loans WHERE loan_number = ?1", LOAN_COLUMNS);
    Ok(conn.query_row(&sql, params![loan_number], loan_from_row).optional()?)
}

pub fn list_loans(conn: &Connection) -> Result<Vec<Loan>> {
    let sql = format!("SELECT {} FROM loans ORDER BY origination_date DESC, loan_number", LOAN_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], loan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    debug!(count = rows.len(), "loaded loans");
    Ok(rows)
}

pub fn update_loan(conn: &Connection, loan: &mut Loan, actor: &str) -> Result<bool> {
    loan.touch();

    let changed = conn.execute(
        "UPDATE loans SET loan_number = ?2, borrower_id = ?3, lender_id = ?4, property_id = ?5,
                principal = ?6, interest_rate = ?7, term_months = ?8, origination_date = ?9,
                status = ?10, principal_paid = ?11, last_payment_date = ?12, updated_at = ?13
         WHERE id = ?1",
        params![
            loan.id,
            loan.loan_number,
            loan.borrower_id,
            loan.lender_id,
            loan.property_id,
            loan.principal,
            loan.interest_rate,
            loan.term_months,
            date_str(loan.origination_date),
            loan.status.as_str(),
            loan.principal_paid,
            loan.last_payment_date.map(date_str),
            loan.updated_at.to_rfc3339(),
        ],
    )?;

    if changed > 0 {
        log_event(conn, "loan_updated", "loan", &loan.id, loan, actor)?;
    }
    Ok(changed > 0)
}

/// Deleting a loan cascades to its draws and payments
pub fn delete_loan(conn: &Connection, id: &str, actor: &str) -> Result<bool> {
    delete_row(conn, "loans", "loan", id, actor)
}

// ============================================================================
// DRAWS
// ============================================================================

const DRAW_COLUMNS: &str =
    "id, loan_id, amount, description, status, requested_date, funded_date, created_at, updated_at";

fn draw_from_row(row: &Row) -> rusqlite::Result<Draw> {
    Ok(Draw {
        id: row.get(0)?,
        loan_id: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        status: enum_col(row, 4, DrawStatus::parse)?,
        requested_date: date_col(row, 5)?,
        funded_date: opt_date_col(row, 6)?,
        created_at: time_col(row, 7)?,
        updated_at: time_col(row, 8)?,
    })
}

pub fn insert_draw(conn: &Connection, draw: &Draw, actor: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO draws (id, loan_id, amount, description, status, requested_date, funded_date,
                created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            draw.id,
            draw.loan_id,
            draw.amount,
            draw.description,
            draw.status.as_str(),
            date_str(draw.requested_date),
            draw.funded_date.map(date_str),
            draw.created_at.to_rfc3339(),
            draw.updated_at.to_rfc3339(),
        ],
    )?;

    log_event(conn, "draw_requested", "draw", &draw.id, draw, actor)?;
    info!(draw_id = %draw.id, loan_id = %draw.loan_id, amount = draw.amount, "draw requested");
    Ok(())
}

pub fn get_draw(conn: &Connection, id: &str) -> Result<Option<Draw>> {
    let sql = format!("SELECT {} FROM draws WHERE id = ?1", DRAW_COLUMNS);
    Ok(conn.query_row(&sql, params![id], draw_from_row).optional()?)
}

pub fn list_draws_for_loan(conn: &Connection, loan_id: &str) -> Result<Vec<Draw>> {
    let sql = format!(
        "SELECT {} FROM draws WHERE loan_id = ?1 ORDER BY requested_date, created_at",
        DRAW_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![loan_id], draw_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Persist a status change made through `Draw::approve/reject/fund`
pub fn update_draw(conn: &Connection, draw: &Draw, actor: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE draws SET amount = ?2, description = ?3, status = ?4, funded_date = ?5,
                updated_at = ?6
         WHERE id = ?1",
        params![
            draw.id,
            draw.amount,
            draw.description,
            draw.status.as_str(),
            draw.funded_date.map(date_str),
            draw.updated_at.to_rfc3339(),
        ],
    )?;

    if changed > 0 {
        let event_type = format!("draw_{}", draw.status.as_str().to_lowercase());
        log_event(conn, &event_type, "draw", &draw.id, draw, actor)?;
    }
    Ok(changed > 0)
}

/// Sum of funded draws against a loan
pub fn funded_draw_total(conn: &Connection, loan_id: &str) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM draws WHERE loan_id = ?1 AND status = ?2",
        params![loan_id, DrawStatus::Funded.as_str()],
        |row| row.get(0),
    )?;
    Ok(total)
}

// ============================================================================
// PAYMENTS
// ============================================================================

const PAYMENT_COLUMNS: &str = "id, loan_id, amount, principal_portion, interest_portion, \
     payment_date, method, reference, created_at";

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        loan_id: row.get(1)?,
        amount: row.get(2)?,
        principal_portion: row.get(3)?,
        interest_portion: row.get(4)?,
        payment_date: date_col(row, 5)?,
        method: enum_col(row, 6, PaymentMethod::parse)?,
        reference: row.get(7)?,
        created_at: time_col(row, 8)?,
    })
}

/// Insert a payment row. Returns false if an identical payment already exists.
pub fn insert_payment(conn: &Connection, payment: &Payment, actor: &str) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO payments (id, idempotency_hash, loan_id, amount, principal_portion,
                interest_portion, payment_date, method, reference, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            payment.id,
            payment.idempotency_hash(),
            payment.loan_id,
            payment.amount,
            payment.principal_portion,
            payment.interest_portion,
            date_str(payment.payment_date),
            payment.method.as_str(),
            payment.reference,
            payment.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => {
            log_event(conn, "payment_received", "payment", &payment.id, payment, actor)?;
            Ok(true)
        }
        Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("idempotency_hash") =>
        {
            warn!(loan_id = %payment.loan_id, "duplicate payment skipped");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], payment_from_row).optional()?)
}

pub fn list_payments_for_loan(conn: &Connection, loan_id: &str) -> Result<Vec<Payment>> {
    let sql = format!(
        "SELECT {} FROM payments WHERE loan_id = ?1 ORDER BY payment_date, created_at",
        PAYMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![loan_id], payment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Store a payment and roll it into the loan, atomically.
///
/// Returns false (and leaves the loan untouched) for a duplicate payment.
pub fn record_payment(conn: &Connection, loan: &mut Loan, payment: &Payment, actor: &str) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;

    if !insert_payment(&tx, payment, actor)? {
        return Ok(false);
    }

    let mut updated = loan.clone();
    updated.apply_payment(payment);
    update_loan(&tx, &mut updated, actor)?;

    tx.commit()?;
    *loan = updated;

    info!(
        loan_id = %loan.id,
        amount = payment.amount,
        principal = payment.principal_portion,
        interest = payment.interest_portion,
        "payment recorded"
    );
    Ok(true)
}

// ============================================================================
// SHARED
// ============================================================================

const TABLES: [&str; 7] = [
    "borrowers",
    "lenders",
    "properties",
    "loans",
    "draws",
    "payments",
    "events",
];

fn delete_row(conn: &Connection, table: &str, entity_type: &str, id: &str, actor: &str) -> Result<bool> {
    if !TABLES.contains(&table) {
        anyhow::bail!("Unknown table: {}", table);
    }

    let changed = conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])?;

    if changed > 0 {
        log_event(conn, &format!("{}_deleted", entity_type), entity_type, id, &serde_json::json!({}), actor)?;
        info!(entity_type, id, "deleted");
    }
    Ok(changed > 0)
}

/// Row count for one of the known tables
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    if !TABLES.contains(&table) {
        anyhow::bail!("Unknown table: {}", table);
    }

    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One row of a loan import file
#[derive(Debug, Deserialize)]
struct LoanCsvRow {
    loan_number: String,
    borrower_id: String,
    lender_id: String,
    property_id: String,
    principal: f64,
    interest_rate: f64,
    term_months: i32,
    origination_date: NaiveDate,
}

/// Read loans from CSV. Each row gets a fresh id and starts as Pending.
pub fn load_loans_csv(csv_path: &Path) -> Result<Vec<Loan>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut loans = Vec::new();

    for (line, result) in rdr.deserialize::<LoanCsvRow>().enumerate() {
        let row = result.with_context(|| format!("Failed to deserialize loan on row {}", line + 1))?;

        loans.push(Loan::new(
            row.loan_number.trim().to_string(),
            row.borrower_id.trim().to_string(),
            row.lender_id.trim().to_string(),
            row.property_id.trim().to_string(),
            row.principal,
            row.interest_rate,
            row.term_months,
            row.origination_date,
        ));
    }

    debug!(count = loans.len(), path = %csv_path.display(), "loaded loans from CSV");
    Ok(loans)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ACTOR: &str = "test";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    /// Borrower + lender + property, ready to hang a loan off
    fn seed_parties(conn: &Connection) -> (Borrower, Lender, Property) {
        let borrower = Borrower::new(
            "Jo Rivera".to_string(),
            "jo@example.com".to_string(),
            BorrowerType::Llc,
        );
        let lender = Lender::new(
            "North Fund".to_string(),
            "north@example.com".to_string(),
            LenderType::Fund,
            1_000_000.0,
        );
        let property = Property::new(
            "9 Birch Rd".to_string(),
            "Denver".to_string(),
            "CO".to_string(),
            "80202".to_string(),
            PropertyType::SingleFamily,
        )
        .with_valuation(500_000.0, 350_000.0, 100_000.0);

        insert_borrower(conn, &borrower, ACTOR).unwrap();
        insert_lender(conn, &lender, ACTOR).unwrap();
        insert_property(conn, &property, ACTOR).unwrap();

        (borrower, lender, property)
    }

    fn seed_loan(conn: &Connection) -> Loan {
        let (borrower, lender, property) = seed_parties(conn);
        let loan = Loan::new(
            "LN-2024-0001".to_string(),
            borrower.id,
            lender.id,
            property.id,
            300_000.0,
            12.0,
            12,
            date(2024, 1, 31),
        );
        insert_loan(conn, &loan, ACTOR).unwrap();
        loan
    }

    #[test]
    fn test_borrower_crud() {
        let conn = test_db();
        let (mut borrower, _, _) = seed_parties(&conn);

        let stored = get_borrower(&conn, &borrower.id).unwrap().unwrap();
        assert_eq!(stored.full_name, "Jo Rivera");
        assert_eq!(stored.borrower_type, BorrowerType::Llc);

        borrower.credit_score = Some(720);
        assert!(update_borrower(&conn, &mut borrower, ACTOR).unwrap());
        assert_eq!(get_borrower(&conn, &borrower.id).unwrap().unwrap().credit_score, Some(720));

        assert_eq!(list_borrowers(&conn).unwrap().len(), 1);
        assert!(delete_borrower(&conn, &borrower.id, ACTOR).unwrap());
        assert!(get_borrower(&conn, &borrower.id).unwrap().is_none());
        assert!(!delete_borrower(&conn, &borrower.id, ACTOR).unwrap());
    }

    #[test]
    fn test_update_missing_row_returns_false() {
        let conn = test_db();
        let mut lender = Lender::new(
            "Ghost".to_string(),
            "ghost@example.com".to_string(),
            LenderType::Bank,
            0.0,
        );

        assert!(!update_lender(&conn, &mut lender, ACTOR).unwrap());
    }

    #[test]
    fn test_loan_roundtrip_preserves_terms() {
        let conn = test_db();
        let loan = seed_loan(&conn);

        let stored = get_loan(&conn, &loan.id).unwrap().unwrap();
        assert_eq!(stored.origination_date, date(2024, 1, 31));
        assert_eq!(stored.status, LoanStatus::Pending);
        assert_eq!(stored.term_months, 12);
        assert!(stored.last_payment_date.is_none());
        assert_eq!(stored.monthly_payment(), loan.monthly_payment());

        let by_number = get_loan_by_number(&conn, "LN-2024-0001").unwrap().unwrap();
        assert_eq!(by_number.id, loan.id);
    }

    #[test]
    fn test_loan_requires_existing_parties() {
        let conn = test_db();
        let orphan = Loan::new(
            "LN-X".to_string(),
            "nobody".to_string(),
            "nobody".to_string(),
            "nowhere".to_string(),
            10_000.0,
            10.0,
            6,
            date(2024, 1, 1),
        );

        let err = insert_loan(&conn, &orphan, ACTOR).unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn test_cannot_delete_borrower_with_loans() {
        let conn = test_db();
        let loan = seed_loan(&conn);

        let err = delete_borrower(&conn, &loan.borrower_id, ACTOR).unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn test_record_payment_updates_loan() {
        let conn = test_db();
        let mut loan = seed_loan(&conn);

        let payment = Payment::for_loan(&loan, 26_654.63, date(2024, 2, 29), PaymentMethod::Ach);
        assert!(record_payment(&conn, &mut loan, &payment, ACTOR).unwrap());

        assert_eq!(loan.status, LoanStatus::Active);
        let stored = get_loan(&conn, &loan.id).unwrap().unwrap();
        assert_eq!(stored.last_payment_date, Some(date(2024, 2, 29)));
        assert!((stored.principal_paid - payment.principal_portion).abs() < 1e-9);

        let payments = list_payments_for_loan(&conn, &loan.id).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].method, PaymentMethod::Ach);
    }

    #[test]
    fn test_duplicate_payment_is_ignored() {
        let conn = test_db();
        let mut loan = seed_loan(&conn);

        let payment = Payment::for_loan(&loan, 5_000.0, date(2024, 2, 29), PaymentMethod::Wire)
            .with_reference("FED-123");
        let duplicate = Payment::for_loan(&loan, 5_000.0, date(2024, 2, 29), PaymentMethod::Wire)
            .with_reference("FED-123");

        assert!(record_payment(&conn, &mut loan, &payment, ACTOR).unwrap());
        let paid_after_first = loan.principal_paid;

        assert!(!record_payment(&conn, &mut loan, &duplicate, ACTOR).unwrap());
        assert_eq!(loan.principal_paid, paid_after_first);
        assert_eq!(count_rows(&conn, "payments").unwrap(), 1);
    }

    #[test]
    fn test_draw_lifecycle_and_funded_total() {
        let conn = test_db();
        let loan = seed_loan(&conn);

        let mut first = Draw::new(loan.id.clone(), 40_000.0, "Demo".to_string(), date(2024, 2, 1));
        let second = Draw::new(loan.id.clone(), 60_000.0, "Framing".to_string(), date(2024, 3, 1));
        insert_draw(&conn, &first, ACTOR).unwrap();
        insert_draw(&conn, &second, ACTOR).unwrap();

        assert_eq!(funded_draw_total(&conn, &loan.id).unwrap(), 0.0);

        first.approve().unwrap();
        first.fund(date(2024, 2, 5)).unwrap();
        assert!(update_draw(&conn, &first, ACTOR).unwrap());

        assert_eq!(funded_draw_total(&conn, &loan.id).unwrap(), 40_000.0);

        let draws = list_draws_for_loan(&conn, &loan.id).unwrap();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].status, DrawStatus::Funded);
        assert_eq!(draws[0].funded_date, Some(date(2024, 2, 5)));
        assert_eq!(draws[1].status, DrawStatus::Requested);

        let events = get_events_for_entity(&conn, "draw", &first.id).unwrap();
        assert_eq!(events[0].event_type, "draw_funded");
    }

    #[test]
    fn test_delete_loan_cascades() {
        let conn = test_db();
        let mut loan = seed_loan(&conn);

        let draw = Draw::new(loan.id.clone(), 1_000.0, "Permits".to_string(), date(2024, 2, 1));
        insert_draw(&conn, &draw, ACTOR).unwrap();
        let payment = Payment::for_loan(&loan, 3_000.0, date(2024, 2, 29), PaymentMethod::Check);
        record_payment(&conn, &mut loan, &payment, ACTOR).unwrap();

        assert!(delete_loan(&conn, &loan.id, ACTOR).unwrap());
        assert_eq!(count_rows(&conn, "draws").unwrap(), 0);
        assert_eq!(count_rows(&conn, "payments").unwrap(), 0);
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "test_event",
            "loan",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "loan", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data["test"], "data");
    }

    #[test]
    fn test_writes_are_audited() {
        let conn = test_db();
        let mut loan = seed_loan(&conn);
        loan.status = LoanStatus::Active;
        update_loan(&conn, &mut loan, "alice").unwrap();

        let events = get_events_for_entity(&conn, "loan", &loan.id).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();

        assert_eq!(types, vec!["loan_updated", "loan_created"]);
        assert_eq!(events[0].actor, "alice");
        assert_eq!(events[0].data["status"], "Active");
    }

    #[test]
    fn test_count_rows_rejects_unknown_table() {
        let conn = test_db();
        assert_eq!(count_rows(&conn, "loans").unwrap(), 0);
        assert!(count_rows(&conn, "sqlite_master; DROP TABLE loans").is_err());
    }

    #[test]
    fn test_load_loans_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "loan_number,borrower_id,lender_id,property_id,principal,interest_rate,term_months,origination_date"
        )
        .unwrap();
        writeln!(file, "LN-1,b1,l1,p1,250000,10.5,12,2024-03-01").unwrap();
        writeln!(file, " LN-2 ,b2,l2,p2,90000,0,6,2024-04-15").unwrap();
        file.flush().unwrap();

        let loans = load_loans_csv(file.path()).unwrap();

        assert_eq!(loans.len(), 2);
        assert_eq!(loans[0].loan_number, "LN-1");
        assert_eq!(loans[0].origination_date, date(2024, 3, 1));
        assert_eq!(loans[1].loan_number, "LN-2");
        assert_eq!(loans[1].monthly_payment(), 15_000.0);
        assert_ne!(loans[0].id, loans[1].id);
    }

    #[test]
    fn test_load_loans_csv_bad_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "loan_number,borrower_id,lender_id,property_id,principal,interest_rate,term_months,origination_date"
        )
        .unwrap();
        writeln!(file, "LN-1,b1,l1,p1,lots,10.5,12,2024-03-01").unwrap();
        file.flush().unwrap();

        let err = load_loans_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
