//! The loan aggregate and its append-only audit trail
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::error::{LoanError, StoreError};
use crate::types::TimeStamp;

/// Actor recorded on the origination entry of every audit trail.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[n(0)]
    Proposed,
    #[n(1)]
    Approved,
    #[n(2)]
    Invested,
    #[n(3)]
    Disbursed,
    #[n(4)]
    Rejected,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Proposed,
        Status::Approved,
        Status::Invested,
        Status::Disbursed,
        Status::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Proposed => "proposed",
            Status::Approved => "approved",
            Status::Invested => "invested",
            Status::Disbursed => "disbursed",
            Status::Rejected => "rejected",
        }
    }

    /// Absorbing states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Disbursed | Status::Rejected)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LoanError::UnknownStatus(s.to_owned()))
    }
}

/// One immutable entry of the audit trail.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct StatusTransition {
    #[n(0)]
    pub from: Option<Status>, // None only on the origination entry
    #[n(1)]
    pub to: Status,
    #[n(2)]
    pub date: TimeStamp<Utc>,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub performed_by: String,
}

impl StatusTransition {
    pub fn new(
        from: Option<Status>,
        to: Status,
        date: TimeStamp<Utc>,
        description: impl Into<String>,
        performed_by: impl Into<String>,
    ) -> Self {
        Self {
            from,
            to,
            date,
            description: description.into(),
            performed_by: performed_by.into(),
        }
    }
    /// CBOR encoding of the record together with its sha256 digest, which keys it in the audit
    /// tree.
    pub fn digest(&self) -> Result<(String, Vec<u8>), StoreError> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// Financial terms fixed at origination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTerms {
    pub amount: f64,
    pub rate: f64,
    pub roi: f64,
}

impl LoanTerms {
    pub fn new(amount: f64, rate: f64, roi: f64) -> Self {
        Self { amount, rate, roi }
    }

    /// Principal must be positive and both rates within [0, 100). ROI must sit strictly below the
    /// borrower rate, except that a loan may be originated with both rates at zero; such a loan
    /// can never be disbursed.
    pub fn validate(&self) -> Result<(), LoanError> {
        if !(self.amount > 0.0) || !self.amount.is_finite() {
            return Err(LoanError::InvalidTerms("amount must be greater than 0".into()));
        }
        if !(0.0..100.0).contains(&self.rate) {
            return Err(LoanError::InvalidTerms("rate must be between 0 and 100".into()));
        }
        if !(0.0..100.0).contains(&self.roi) {
            return Err(LoanError::InvalidTerms("roi must be between 0 and 100".into()));
        }
        let both_unset = self.rate == 0.0 && self.roi == 0.0;
        if !both_unset && self.roi >= self.rate {
            return Err(LoanError::InvalidTerms("roi must be less than rate".into()));
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Loan {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub borrower_id: String,
    #[n(2)]
    pub amount: f64,
    #[n(3)]
    pub rate: f64,
    #[n(4)]
    pub roi: f64,
    #[n(5)]
    status: Status,
    #[n(6)]
    transitions: Vec<StatusTransition>,
    #[n(7)]
    pub approval_date: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub approved_by: Option<String>,
    #[n(9)]
    pub survey_document_id: Option<String>,
    #[n(10)]
    pub investment_date: Option<TimeStamp<Utc>>, // only once fully funded
    #[n(11)]
    pub disbursement_date: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub disbursed_by: Option<String>,
    #[n(13)]
    pub agreement_document_id: Option<String>,
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
    #[n(15)]
    pub updated_at: TimeStamp<Utc>,
}

impl Loan {
    /// A freshly originated loan: `Proposed`, with the single origination entry in its trail.
    pub fn new(id: String, borrower_id: String, terms: LoanTerms) -> Self {
        let now = TimeStamp::now();
        Self {
            id,
            borrower_id,
            amount: terms.amount,
            rate: terms.rate,
            roi: terms.roi,
            status: Status::Proposed,
            transitions: vec![StatusTransition::new(
                None,
                Status::Proposed,
                now.clone(),
                "Loan created",
                SYSTEM_ACTOR,
            )],
            approval_date: None,
            approved_by: None,
            survey_document_id: None,
            investment_date: None,
            disbursement_date: None,
            disbursed_by: None,
            agreement_document_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn transitions(&self) -> &[StatusTransition] {
        &self.transitions
    }

    pub fn last_transition(&self) -> Option<&StatusTransition> {
        self.transitions.last()
    }

    /// The only way status changes: the new status and its audit entry land together.
    pub(crate) fn advance(
        &mut self,
        to: Status,
        at: TimeStamp<Utc>,
        description: &str,
        performed_by: &str,
    ) {
        self.transitions.push(StatusTransition::new(
            Some(self.status),
            to,
            at.clone(),
            description,
            performed_by,
        ));
        self.status = to;
        self.updated_at = at;
    }

    /// True when the status matches the trail's last entry and the trail opens with origination.
    pub fn is_consistent(&self) -> bool {
        let opens_with_origination = self
            .transitions
            .first()
            .is_some_and(|first| first.from.is_none() && first.to == Status::Proposed);

        opens_with_origination
            && self
                .last_transition()
                .is_some_and(|last| last.to == self.status)
    }
}
