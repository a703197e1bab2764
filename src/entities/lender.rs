// 🏦 Lender Entity
// Capital source behind a loan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LenderType {
    Individual,
    Fund,
    Bank,
    PrivateEquity,
}

impl LenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LenderType::Individual => "Individual",
            LenderType::Fund => "Fund",
            LenderType::Bank => "Bank",
            LenderType::PrivateEquity => "Private Equity",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "individual" => Some(LenderType::Individual),
            "fund" => Some(LenderType::Fund),
            "bank" => Some(LenderType::Bank),
            "private equity" | "privateequity" | "pe" => Some(LenderType::PrivateEquity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lender {
    pub id: String,
    pub name: String,
    pub email: String,
    pub lender_type: LenderType,

    /// Total capital the lender has committed to the platform
    pub capital_committed: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lender {
    pub fn new(name: String, email: String, lender_type: LenderType, capital_committed: f64) -> Self {
        let now = Utc::now();

        Lender {
            id: super::new_id(),
            name,
            email,
            lender_type,
            capital_committed,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Capital not yet deployed, given the principal of the lender's loans
    pub fn available_capital(&self, deployed: f64) -> f64 {
        (self.capital_committed - deployed).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lender_creation() {
        let lender = Lender::new(
            "Ridge Capital".to_string(),
            "desk@ridge.capital".to_string(),
            LenderType::Fund,
            5_000_000.0,
        );

        assert!(!lender.id.is_empty());
        assert_eq!(lender.lender_type, LenderType::Fund);
        assert_eq!(lender.capital_committed, 5_000_000.0);
    }

    #[test]
    fn test_available_capital_never_negative() {
        let lender = Lender::new(
            "Solo".to_string(),
            "solo@example.com".to_string(),
            LenderType::Individual,
            250_000.0,
        );

        assert_eq!(lender.available_capital(100_000.0), 150_000.0);
        assert_eq!(lender.available_capital(300_000.0), 0.0);
    }

    #[test]
    fn test_lender_type_parse() {
        assert_eq!(LenderType::parse("Private Equity"), Some(LenderType::PrivateEquity));
        assert_eq!(LenderType::parse("private_equity"), Some(LenderType::PrivateEquity));
        assert_eq!(LenderType::parse("BANK"), Some(LenderType::Bank));
        assert_eq!(LenderType::parse("credit union"), None);
    }
}
