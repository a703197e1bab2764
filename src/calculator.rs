// 🧮 Loan Amortization Calculator
// Pure functions over loan terms. No state, no I/O, no errors.
//
// Every function is total: degenerate inputs (zero/negative amounts or terms)
// degrade to 0 instead of failing, so display code never has to handle errors.
// Validation of user input happens upstream in `schema`.
//
// Calendar months: adding N months clamps to the last valid day of the
// target month (Jan 31 + 1 month = Feb 28/29).

use chrono::{Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

// ============================================================================
// ROUNDING & RATES
// ============================================================================

/// Round to cents: `round(value * 100) / 100`
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Longest supported loan term (100 years)
pub const MAX_TERM_MONTHS: i32 = 1200;

/// Annual percentage rate → periodic monthly rate (6.0 → 0.005)
pub fn monthly_rate(annual_rate: f64) -> f64 {
    annual_rate / 100.0 / 12.0
}

// ============================================================================
// PAYMENT & INTEREST
// ============================================================================

/// Fixed monthly payment for a fully amortizing loan, rounded to cents.
///
/// - `principal <= 0` or `term_months <= 0` → 0
/// - `annual_rate == 0` → straight-line `principal / term_months`
/// - otherwise `P·i·(1+i)^N / ((1+i)^N − 1)` with `i = R/100/12`
///
/// Evaluated as `P·i / (1 − (1+i)^−N)` through `ln_1p`/`exp_m1` so that tiny
/// rates converge to the straight-line payment instead of dividing by zero.
pub fn monthly_payment(principal: f64, annual_rate: f64, term_months: i32) -> f64 {
    if principal <= 0.0 || term_months <= 0 {
        return 0.0;
    }

    if annual_rate == 0.0 {
        return principal / term_months as f64;
    }

    let i = monthly_rate(annual_rate);
    let discount = -(-(term_months as f64) * i.ln_1p()).exp_m1();
    if discount == 0.0 || !discount.is_finite() {
        return principal / term_months as f64;
    }

    round_cents(principal * i / discount)
}

/// Total interest over the life of the loan, floored at 0
pub fn total_interest(principal: f64, monthly_payment: f64, term_months: i32) -> f64 {
    (monthly_payment * term_months as f64 - principal).max(0.0)
}

/// Outstanding principal, never negative
pub fn remaining_balance(original_amount: f64, principal_paid: f64) -> f64 {
    (original_amount - principal_paid).max(0.0)
}

// ============================================================================
// RATIOS
// ============================================================================

/// Loan-to-value as a percentage. 0 when the property has no value.
pub fn loan_to_value(loan_amount: f64, property_value: f64) -> f64 {
    if property_value <= 0.0 {
        return 0.0;
    }
    loan_amount / property_value * 100.0
}

/// Loan-to-cost as a percentage of purchase + rehab. 0 when total cost is 0.
pub fn loan_to_cost(loan_amount: f64, purchase_price: f64, rehab_budget: Option<f64>) -> f64 {
    let total_cost = purchase_price + rehab_budget.unwrap_or(0.0);
    if total_cost <= 0.0 {
        return 0.0;
    }
    loan_amount / total_cost * 100.0
}

// ============================================================================
// DATES
// ============================================================================

/// Shift a date by a signed number of calendar months.
///
/// Falls back to the input date if the result is outside chrono's range.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(date)
}

/// Date of the final scheduled payment
pub fn maturity_date(origination_date: NaiveDate, term_months: i32) -> NaiveDate {
    add_months(origination_date, term_months)
}

/// Next due date: one month after the last payment, or one month from today
pub fn next_payment_date(last_payment_date: Option<NaiveDate>) -> NaiveDate {
    next_payment_date_from(last_payment_date, Local::now().date_naive())
}

/// Same as `next_payment_date` with an explicit "today"
pub fn next_payment_date_from(last_payment_date: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    add_months(last_payment_date.unwrap_or(today), 1)
}

// ============================================================================
// PAYMENT SPLIT
// ============================================================================

/// How a received payment is applied against a loan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PaymentSplit {
    pub interest: f64,
    pub principal: f64,
    /// Amount received beyond accrued interest + outstanding balance
    pub overpayment: f64,
}

/// Apply a payment: one month of interest first, then principal.
pub fn split_payment(balance: f64, annual_rate: f64, amount: f64) -> PaymentSplit {
    if amount <= 0.0 {
        return PaymentSplit::default();
    }

    let balance = balance.max(0.0);
    let accrued = round_cents(balance * monthly_rate(annual_rate.max(0.0)));
    let interest = accrued.min(amount);
    let principal = round_cents((amount - interest).min(balance));
    let overpayment = round_cents((amount - interest - principal).max(0.0));

    PaymentSplit {
        interest,
        principal,
        overpayment,
    }
}

// ============================================================================
// AMORTIZATION SCHEDULE
// ============================================================================

/// One period of an amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub period: i32,
    pub due_date: NaiveDate,
    pub payment: f64,
    pub interest: f64,
    pub principal: f64,
    pub balance: f64,
}

/// Full payment schedule, one row per month.
///
/// The last row absorbs rounding drift so the loan ends at exactly 0.
/// Terms beyond `MAX_TERM_MONTHS` produce no rows.
pub fn amortization_schedule(
    principal: f64,
    annual_rate: f64,
    term_months: i32,
    origination_date: NaiveDate,
) -> Vec<ScheduleRow> {
    if principal <= 0.0 || term_months <= 0 || term_months > MAX_TERM_MONTHS {
        return Vec::new();
    }

    let payment = round_cents(monthly_payment(principal, annual_rate, term_months));
    let i = monthly_rate(annual_rate);

    let mut rows = Vec::with_capacity(term_months as usize);
    let mut balance = principal;

    for period in 1..=term_months {
        let interest = round_cents(balance * i);
        let principal_part = if period == term_months {
            balance
        } else {
            round_cents((payment - interest).min(balance).max(0.0))
        };
        let row_payment = round_cents(principal_part + interest);

        balance = round_cents(balance - principal_part).max(0.0);

        rows.push(ScheduleRow {
            period,
            due_date: maturity_date(origination_date, period),
            payment: row_payment,
            interest,
            principal: round_cents(principal_part),
            balance,
        });
    }

    rows
}

// ============================================================================
// TESTS
// ============================================================================
