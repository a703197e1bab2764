// 🏠 Property Entity
// Collateral securing a loan, with the valuation inputs LTV/LTC need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calculator;

// ============================================================================
// PROPERTY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    SingleFamily,
    MultiFamily,
    Condo,
    Townhouse,
    Commercial,
    Land,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::SingleFamily => "Single Family",
            PropertyType::MultiFamily => "Multi Family",
            PropertyType::Condo => "Condo",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::Commercial => "Commercial",
            PropertyType::Land => "Land",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "singlefamily" | "sfr" => Some(PropertyType::SingleFamily),
            "multifamily" => Some(PropertyType::MultiFamily),
            "condo" => Some(PropertyType::Condo),
            "townhouse" => Some(PropertyType::Townhouse),
            "commercial" => Some(PropertyType::Commercial),
            "land" => Some(PropertyType::Land),
            _ => None,
        }
    }
}

// ============================================================================
// PROPERTY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,

    // Location
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,

    pub property_type: PropertyType,

    // Valuation inputs
    /// Current appraised (or after-repair) value
    pub property_value: f64,
    pub purchase_price: f64,
    pub rehab_budget: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn new(
        address: String,
        city: String,
        state: String,
        zip: String,
        property_type: PropertyType,
    ) -> Self {
        let now = Utc::now();

        Property {
            id: super::new_id(),
            address,
            city,
            state,
            zip,
            property_type,
            property_value: 0.0,
            purchase_price: 0.0,
            rehab_budget: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style setter for the three valuation inputs
    pub fn with_valuation(mut self, property_value: f64, purchase_price: f64, rehab_budget: f64) -> Self {
        self.property_value = property_value;
        self.purchase_price = purchase_price;
        self.rehab_budget = rehab_budget;
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Acquisition + rehabilitation
    pub fn total_cost(&self) -> f64 {
        self.purchase_price + self.rehab_budget
    }

    /// One-line mailing address
    pub fn full_address(&self) -> String {
        format!("{}, {}, {} {}", self.address, self.city, self.state, self.zip)
    }

    pub fn ltv(&self, loan_amount: f64) -> f64 {
        calculator::loan_to_value(loan_amount, self.property_value)
    }

    pub fn ltc(&self, loan_amount: f64) -> f64 {
        calculator::loan_to_cost(loan_amount, self.purchase_price, Some(self.rehab_budget))
    }
}
