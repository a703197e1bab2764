// 💵 Payment Entity
// A received payment, already split into interest and principal.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Loan;
use crate::calculator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Ach,
    Wire,
    Check,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Ach => "ACH",
            PaymentMethod::Wire => "Wire",
            PaymentMethod::Check => "Check",
            PaymentMethod::Card => "Card",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "ach" => Some(PaymentMethod::Ach),
            "wire" => Some(PaymentMethod::Wire),
            "check" | "cheque" => Some(PaymentMethod::Check),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub loan_id: String,
    pub amount: f64,
    pub principal_portion: f64,
    pub interest_portion: f64,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,

    /// Bank/processor reference, when the payment came through one
    pub reference: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Build a payment against a loan, splitting the amount into
    /// one month of interest on the remaining balance, then principal.
    pub fn for_loan(loan: &Loan, amount: f64, payment_date: NaiveDate, method: PaymentMethod) -> Self {
        let split = calculator::split_payment(loan.remaining_balance(), loan.interest_rate, amount);

        Payment {
            id: super::new_id(),
            loan_id: loan.id.clone(),
            amount,
            principal_portion: split.principal,
            interest_portion: split.interest,
            payment_date,
            method,
            reference: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Anything not applied to interest or principal
    pub fn unapplied(&self) -> f64 {
        calculator::round_cents((self.amount - self.principal_portion - self.interest_portion).max(0.0))
    }

    /// Hash for duplicate detection.
    ///
    /// Identity is `id`; this only says "same money, same day, same loan".
    pub fn idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{:.2}|{}",
            self.loan_id,
            self.payment_date,
            self.amount,
            self.reference.as_deref().unwrap_or("")
        ));
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan() -> Loan {
        Loan::new(
            "LN-1".to_string(),
            "b".to_string(),
            "l".to_string(),
            "p".to_string(),
            200_000.0,
            12.0,
            12,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
    }

    #[test]
    fn test_for_loan_splits_interest_first() {
        let payment = Payment::for_loan(
            &loan(),
            5_000.0,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            PaymentMethod::Ach,
        );

        // 1% monthly on 200k
        assert!((payment.interest_portion - 2_000.0).abs() < 1e-9);
        assert!((payment.principal_portion - 3_000.0).abs() < 1e-9);
        assert_eq!(payment.unapplied(), 0.0);
    }

    #[test]
    fn test_idempotency_hash() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let loan = loan();
        let a = Payment::for_loan(&loan, 5_000.0, date, PaymentMethod::Ach).with_reference("TRX-1");
        let b = Payment::for_loan(&loan, 5_000.0, date, PaymentMethod::Ach).with_reference("TRX-1");
        let c = Payment::for_loan(&loan, 5_000.0, date, PaymentMethod::Ach).with_reference("TRX-2");

        // Different ids, same money → same hash
        assert_ne!(a.id, b.id);
        assert_eq!(a.idempotency_hash(), b.idempotency_hash());
        assert_ne!(a.idempotency_hash(), c.idempotency_hash());
        assert_eq!(a.idempotency_hash().len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("ach"), Some(PaymentMethod::Ach));
        assert_eq!(PaymentMethod::parse("Cheque"), Some(PaymentMethod::Check));
        assert_eq!(PaymentMethod::parse("crypto"), None);
    }
}
