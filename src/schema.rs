// 📐 Shape Layer - Schema Validation
// Validates entity records before they are written.
//
// The calculator never fails on bad input; it clamps. This layer is where
// bad input is actually rejected, with every problem reported at once.

use crate::calculator::MAX_TERM_MONTHS;
use crate::entities::{Borrower, Draw, Lender, Loan, Payment, Property};

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    /// Entity being validated ("Loan", "Draw", ...)
    pub context: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Collects errors for one entity
struct Checker {
    context: &'static str,
    errors: Vec<ValidationError>,
}

impl Checker {
    fn new(context: &'static str) -> Self {
        Checker {
            context,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: self.context.to_string(),
        });
    }

    fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "Required field is empty");
        }
    }

    fn email(&mut self, field: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.push(field, "Required field is empty");
        } else if !value.contains('@') || value.starts_with('@') || value.ends_with('@') {
            self.push(field, format!("Not a valid email address: {}", value));
        }
    }

    fn non_negative(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value < 0.0 {
            self.push(field, format!("Must be zero or greater, got {}", value));
        }
    }

    fn positive(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value <= 0.0 {
            self.push(field, format!("Must be greater than zero, got {}", value));
        }
    }

    fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

/// Tolerance for cent-level rounding when comparing money
const CENT: f64 = 0.01;

#[derive(Debug, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator
    }

    pub fn validate_borrower(&self, borrower: &Borrower) -> ValidationResult {
        let mut c = Checker::new("Borrower");

        c.required("full_name", &borrower.full_name);
        c.email("email", &borrower.email);

        if let Some(score) = borrower.credit_score {
            if !(300..=850).contains(&score) {
                c.push("credit_score", format!("Must be between 300 and 850, got {}", score));
            }
        }

        c.finish()
    }

    pub fn validate_lender(&self, lender: &Lender) -> ValidationResult {
        let mut c = Checker::new("Lender");

        c.required("name", &lender.name);
        c.email("email", &lender.email);
        c.non_negative("capital_committed", lender.capital_committed);

        c.finish()
    }

    pub fn validate_property(&self, property: &Property) -> ValidationResult {
        let mut c = Checker::new("Property");

        c.required("address", &property.address);
        c.required("city", &property.city);
        c.required("state", &property.state);
        c.required("zip", &property.zip);
        c.non_negative("property_value", property.property_value);
        c.non_negative("purchase_price", property.purchase_price);
        c.non_negative("rehab_budget", property.rehab_budget);

        c.finish()
    }

    pub fn validate_loan(&self, loan: &Loan) -> ValidationResult {
        let mut c = Checker::new("Loan");

        c.required("loan_number", &loan.loan_number);
        c.required("borrower_id", &loan.borrower_id);
        c.required("lender_id", &loan.lender_id);
        c.required("property_id", &loan.property_id);
        c.positive("principal", loan.principal);

        if !loan.interest_rate.is_finite() || !(0.0..=100.0).contains(&loan.interest_rate) {
            c.push(
                "interest_rate",
                format!("Must be between 0 and 100, got {}", loan.interest_rate),
            );
        }

        if loan.term_months <= 0 {
            c.push("term_months", format!("Must be at least 1 month, got {}", loan.term_months));
        } else if loan.term_months > MAX_TERM_MONTHS {
            c.push(
                "term_months",
                format!("Must be at most {} months, got {}", MAX_TERM_MONTHS, loan.term_months),
            );
        }

        c.non_negative("principal_paid", loan.principal_paid);

        c.finish()
    }

    pub fn validate_draw(&self, draw: &Draw) -> ValidationResult {
        let mut c = Checker::new("Draw");

        c.required("loan_id", &draw.loan_id);
        c.required("description", &draw.description);
        c.positive("amount", draw.amount);

        c.finish()
    }

    /// A draw may not push total disbursements past the loan principal
    pub fn validate_draw_against_loan(&self, draw: &Draw, loan: &Loan, funded_total: f64) -> ValidationResult {
        self.validate_draw(draw)?;

        let mut c = Checker::new("Draw");

        if draw.loan_id != loan.id {
            c.push("loan_id", format!("Draw belongs to {}, not {}", draw.loan_id, loan.id));
        }

        let available = (loan.principal - funded_total).max(0.0);
        if draw.amount > available + CENT {
            c.push(
                "amount",
                format!(
                    "Exceeds undisbursed loan amount: requested {:.2}, available {:.2}",
                    draw.amount, available
                ),
            );
        }

        c.finish()
    }

    pub fn validate_payment(&self, payment: &Payment) -> ValidationResult {
        let mut c = Checker::new("Payment");

        c.required("loan_id", &payment.loan_id);
        c.positive("amount", payment.amount);
        c.non_negative("principal_portion", payment.principal_portion);
        c.non_negative("interest_portion", payment.interest_portion);

        let applied = payment.principal_portion + payment.interest_portion;
        if applied > payment.amount + CENT {
            c.push(
                "principal_portion",
                format!(
                    "Principal + interest ({:.2}) exceeds payment amount ({:.2})",
                    applied, payment.amount
                ),
            );
        }

        c.finish()
    }
}

/// Flatten errors into one message, e.g. for CLI output
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// TESTS
// ============================================================================
