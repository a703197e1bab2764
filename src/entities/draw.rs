// 🏗️ Draw Entity
// Construction draw: a tranche of the loan released as rehab work completes.
//
// Lifecycle:
//   Requested → Approved → Funded
//   Requested → Rejected

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawStatus {
    Requested,
    Approved,
    Funded,
    Rejected,
}

impl DrawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawStatus::Requested => "Requested",
            DrawStatus::Approved => "Approved",
            DrawStatus::Funded => "Funded",
            DrawStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "requested" => Some(DrawStatus::Requested),
            "approved" => Some(DrawStatus::Approved),
            "funded" => Some(DrawStatus::Funded),
            "rejected" => Some(DrawStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    pub id: String,
    pub loan_id: String,
    pub amount: f64,

    /// Work covered, e.g. "Roof + framing"
    pub description: String,

    pub status: DrawStatus,
    pub requested_date: NaiveDate,
    pub funded_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draw {
    pub fn new(loan_id: String, amount: f64, description: String, requested_date: NaiveDate) -> Self {
        let now = Utc::now();

        Draw {
            id: super::new_id(),
            loan_id,
            amount,
            description,
            status: DrawStatus::Requested,
            requested_date,
            funded_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn approve(&mut self) -> Result<()> {
        self.transition(DrawStatus::Requested, DrawStatus::Approved)
    }

    pub fn reject(&mut self) -> Result<()> {
        self.transition(DrawStatus::Requested, DrawStatus::Rejected)
    }

    /// Release funds. Only approved draws can be funded.
    pub fn fund(&mut self, funded_date: NaiveDate) -> Result<()> {
        self.transition(DrawStatus::Approved, DrawStatus::Funded)?;
        self.funded_date = Some(funded_date);
        Ok(())
    }

    fn transition(&mut self, from: DrawStatus, to: DrawStatus) -> Result<()> {
        if self.status != from {
            return Err(anyhow!(
                "Draw {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                to.as_str()
            ));
        }

        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw() -> Draw {
        Draw::new(
            "loan-1".to_string(),
            25_000.0,
            "Foundation".to_string(),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        )
    }

    #[test]
    fn test_draw_happy_path() {
        let mut d = draw();
        assert_eq!(d.status, DrawStatus::Requested);

        d.approve().unwrap();
        assert_eq!(d.status, DrawStatus::Approved);

        let funded_on = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();
        d.fund(funded_on).unwrap();
        assert_eq!(d.status, DrawStatus::Funded);
        assert_eq!(d.funded_date, Some(funded_on));
    }

    #[test]
    fn test_cannot_fund_unapproved_draw() {
        let mut d = draw();
        let result = d.fund(NaiveDate::from_ymd_opt(2024, 4, 5).unwrap());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot move from Requested to Funded"));
        assert!(d.funded_date.is_none());
    }

    #[test]
    fn test_rejected_draw_is_final() {
        let mut d = draw();
        d.reject().unwrap();

        assert!(d.approve().is_err());
        assert!(d.reject().is_err());
        assert_eq!(d.status, DrawStatus::Rejected);
    }
}
