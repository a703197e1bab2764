// 👤 Borrower Entity
// The person or company a loan is made to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// BORROWER TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowerType {
    /// Natural person
    Individual,

    /// Limited liability company (most fix-and-flip borrowers)
    Llc,

    Corporation,

    Trust,
}

impl BorrowerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowerType::Individual => "Individual",
            BorrowerType::Llc => "LLC",
            BorrowerType::Corporation => "Corporation",
            BorrowerType::Trust => "Trust",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "individual" => Some(BorrowerType::Individual),
            "llc" => Some(BorrowerType::Llc),
            "corporation" | "corp" => Some(BorrowerType::Corporation),
            "trust" => Some(BorrowerType::Trust),
            _ => None,
        }
    }
}

// ============================================================================
// BORROWER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borrower {
    /// Stable identity (UUID)
    pub id: String,

    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub borrower_type: BorrowerType,

    /// FICO score, 300-850 when known
    pub credit_score: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Borrower {
    pub fn new(full_name: String, email: String, borrower_type: BorrowerType) -> Self {
        let now = Utc::now();

        Borrower {
            id: super::new_id(),
            full_name,
            email,
            phone: None,
            borrower_type,
            credit_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stamp an edit
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Business entities sign through a guarantor; individuals sign personally
    pub fn is_entity(&self) -> bool {
        self.borrower_type != BorrowerType::Individual
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrower_creation() {
        let borrower = Borrower::new(
            "Maria Lopez".to_string(),
            "maria@example.com".to_string(),
            BorrowerType::Individual,
        );

        assert!(!borrower.id.is_empty());
        assert_eq!(borrower.full_name, "Maria Lopez");
        assert!(borrower.phone.is_none());
        assert!(!borrower.is_entity());
        assert_eq!(borrower.created_at, borrower.updated_at);
    }

    #[test]
    fn test_borrower_type_parse() {
        assert_eq!(BorrowerType::parse("LLC"), Some(BorrowerType::Llc));
        assert_eq!(BorrowerType::parse(" individual "), Some(BorrowerType::Individual));
        assert_eq!(BorrowerType::parse("corp"), Some(BorrowerType::Corporation));
        assert_eq!(BorrowerType::parse("partnership"), None);

        for t in [
            BorrowerType::Individual,
            BorrowerType::Llc,
            BorrowerType::Corporation,
            BorrowerType::Trust,
        ] {
            assert_eq!(BorrowerType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn test_touch_moves_updated_at() {
        let mut borrower = Borrower::new(
            "Oak Street Holdings".to_string(),
            "ops@oakstreet.com".to_string(),
            BorrowerType::Llc,
        );
        let before = borrower.updated_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        borrower.touch();

        assert!(borrower.updated_at > before);
        assert!(borrower.is_entity());
    }
}
