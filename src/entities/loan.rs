// 📄 Loan Entity
// Terms + payment progress. All derived figures go through `calculator`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Payment, Property};
use crate::calculator::{self, ScheduleRow};

// ============================================================================
// LOAN STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Approved, not yet funded
    Pending,
    Active,
    PaidOff,
    Defaulted,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "Pending",
            LoanStatus::Active => "Active",
            LoanStatus::PaidOff => "Paid Off",
            LoanStatus::Defaulted => "Defaulted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "pending" => Some(LoanStatus::Pending),
            "active" => Some(LoanStatus::Active),
            "paidoff" => Some(LoanStatus::PaidOff),
            "defaulted" | "default" => Some(LoanStatus::Defaulted),
            _ => None,
        }
    }

    /// Still collecting payments
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::Active)
    }
}

// ============================================================================
// LOAN ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,

    /// Human-facing reference, e.g. "LN-2024-0042"
    pub loan_number: String,

    // Parties & collateral
    pub borrower_id: String,
    pub lender_id: String,
    pub property_id: String,

    // Terms
    pub principal: f64,
    /// Annual rate in percent (12.5 = 12.5%)
    pub interest_rate: f64,
    pub term_months: i32,
    pub origination_date: NaiveDate,

    pub status: LoanStatus,

    // Payment progress
    pub principal_paid: f64,
    pub last_payment_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a loan detail screen shows, computed in one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub loan_id: String,
    pub loan_number: String,
    pub status: LoanStatus,
    pub principal: f64,
    pub monthly_payment: f64,
    pub total_interest: f64,
    pub maturity_date: NaiveDate,
    pub remaining_balance: f64,
    pub next_payment_date: Option<NaiveDate>,
    pub ltv: Option<f64>,
    pub ltc: Option<f64>,
}

impl Loan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        loan_number: String,
        borrower_id: String,
        lender_id: String,
        property_id: String,
        principal: f64,
        interest_rate: f64,
        term_months: i32,
        origination_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();

        Loan {
            id: super::new_id(),
            loan_number,
            borrower_id,
            lender_id,
            property_id,
            principal,
            interest_rate,
            term_months,
            origination_date,
            status: LoanStatus::Pending,
            principal_paid: 0.0,
            last_payment_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ========================================================================
    // DERIVED FIGURES
    // ========================================================================

    pub fn monthly_payment(&self) -> f64 {
        calculator::monthly_payment(self.principal, self.interest_rate, self.term_months)
    }

    pub fn maturity_date(&self) -> NaiveDate {
        calculator::maturity_date(self.origination_date, self.term_months)
    }

    pub fn total_interest(&self) -> f64 {
        calculator::total_interest(self.principal, self.monthly_payment(), self.term_months)
    }

    pub fn remaining_balance(&self) -> f64 {
        calculator::remaining_balance(self.principal, self.principal_paid)
    }

    pub fn next_payment_date_from(&self, today: NaiveDate) -> NaiveDate {
        calculator::next_payment_date_from(self.last_payment_date, today)
    }

    pub fn schedule(&self) -> Vec<ScheduleRow> {
        calculator::amortization_schedule(
            self.principal,
            self.interest_rate,
            self.term_months,
            self.origination_date,
        )
    }

    /// Derived figures for display; LTV/LTC only when the property is known.
    /// Closed loans have no next payment date.
    pub fn summary(&self, property: Option<&Property>, today: NaiveDate) -> LoanSummary {
        LoanSummary {
            loan_id: self.id.clone(),
            loan_number: self.loan_number.clone(),
            status: self.status,
            principal: self.principal,
            monthly_payment: self.monthly_payment(),
            total_interest: self.total_interest(),
            maturity_date: self.maturity_date(),
            remaining_balance: self.remaining_balance(),
            next_payment_date: self
                .status
                .is_open()
                .then(|| self.next_payment_date_from(today)),
            ltv: property.map(|p| p.ltv(self.principal)),
            ltc: property.map(|p| p.ltc(self.principal)),
        }
    }

    // ========================================================================
    // PAYMENT PROGRESS
    // ========================================================================

    /// Apply a received payment to the running totals.
    ///
    /// A pending loan becomes active on its first payment, and any loan whose
    /// balance reaches 0 is marked paid off.
    pub fn apply_payment(&mut self, payment: &Payment) {
        self.principal_paid += payment.principal_portion;

        self.last_payment_date = match self.last_payment_date {
            Some(last) if last >= payment.payment_date => Some(last),
            _ => Some(payment.payment_date),
        };

        if self.status == LoanStatus::Pending {
            self.status = LoanStatus::Active;
        }
        if self.remaining_balance() <= 0.0 {
            self.status = LoanStatus::PaidOff;
        }

        self.touch();
    }
}

// ============================================================================
// TESTS
// ============================================================================
