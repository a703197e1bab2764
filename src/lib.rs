// Loan Servicing - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod calculator;     // Loan math: payment, maturity, LTV/LTC, schedule
pub mod config;
pub mod db;
pub mod entities;
pub mod logging;
pub mod schema;         // Input validation before writes

// Re-export commonly used types
pub use calculator::{
    amortization_schedule, loan_to_cost, loan_to_value, maturity_date, monthly_payment,
    next_payment_date, remaining_balance, split_payment, total_interest, PaymentSplit, ScheduleRow,
    MAX_TERM_MONTHS,
};
pub use config::Config;
pub use db::{
    Event, open_database, setup_database, insert_event, get_events_for_entity,
    load_loans_csv, record_payment, count_rows,
};
pub use entities::{
    Borrower, BorrowerType,
    Lender, LenderType,
    Property, PropertyType,
    Loan, LoanStatus, LoanSummary,
    Draw, DrawStatus,
    Payment, PaymentMethod,
};
pub use schema::{SchemaValidator, ValidationError, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
