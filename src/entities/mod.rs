// Entity Models - borrowers, lenders, properties, loans, draws, payments
//
// Each entity has:
// - Stable identity (UUID string) assigned at creation
// - Plain value fields that serialize straight to JSON and SQLite
// - created_at / updated_at timestamps
//
// Derived financial figures (payment, maturity, LTV...) are computed on demand
// through `crate::calculator`; nothing derived is stored.

pub mod borrower;
pub mod lender;
pub mod property;
pub mod loan;
pub mod draw;
pub mod payment;

pub use borrower::{Borrower, BorrowerType};
pub use lender::{Lender, LenderType};
pub use property::{Property, PropertyType};
pub use loan::{Loan, LoanStatus, LoanSummary};
pub use draw::{Draw, DrawStatus};
pub use payment::{Payment, PaymentMethod};

/// Fresh UUID for a new entity
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
