//! Directory records and the side-effect records a lifecycle produces
use chrono::Utc;

use crate::types::TimeStamp;

/// Contact details shared by every directory entry.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    #[n(0)]
    pub full_name: String,
    #[n(1)]
    pub email: String,
    #[n(2)]
    pub phone_number: String,
    #[n(3)]
    pub id_number: String, // national identity number
}

impl Profile {
    pub fn new(full_name: &str, email: &str, phone_number: &str, id_number: &str) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            phone_number: phone_number.into(),
            id_number: id_number.into(),
        }
    }
}

/// Approvers and field officers.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Employee {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub profile: Profile,
    #[n(2)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Lender {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub profile: Profile,
    #[n(2)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Borrower {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub profile: Profile,
    #[n(2)]
    pub created_at: TimeStamp<Utc>,
}

/// One lender's contribution to one loan. Never updated once written.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Investment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub loan_id: String,
    #[n(2)]
    pub lender_id: String,
    #[n(3)]
    pub amount: f64,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
}

/// Survey reports and agreement letters, referenced from the loan by id.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Document {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub loan_id: String,
    #[n(2)]
    pub file_name: String,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

/// Running total of a loan's investment records.
pub fn total_invested(investments: &[Investment]) -> f64 {
    investments.iter().map(|investment| investment.amount).sum()
}
