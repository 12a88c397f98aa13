//! Structural and business validation of status transitions
use crate::error::LoanError;
use crate::loan::{Loan, Status};

/// Answers whether `from -> to` is legal for a loan. Performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusValidator;

impl StatusValidator {
    pub fn new() -> Self {
        Self
    }

    /// Adjacency table of legal transitions. Absorbing states map to nothing.
    pub fn allowed(from: Status) -> &'static [Status] {
        match from {
            Status::Proposed => &[Status::Approved, Status::Rejected],
            Status::Approved => &[Status::Invested],
            Status::Invested => &[Status::Disbursed],
            Status::Disbursed | Status::Rejected => &[],
        }
    }

    pub fn is_valid_transition(from: Status, to: Status) -> bool {
        Self::allowed(from).contains(&to)
    }

    /// Table check first, then the precondition layered on that particular transition.
    pub fn validate(&self, loan: &Loan, from: Status, to: Status) -> Result<(), LoanError> {
        if !Self::is_valid_transition(from, to) {
            return Err(LoanError::InvalidTransition { from, to });
        }

        match (from, to) {
            (Status::Proposed, Status::Approved) => self.validate_approval(loan),
            (Status::Invested, Status::Disbursed) => self.validate_disbursement(loan),
            _ => Ok(()),
        }
    }

    fn validate_approval(&self, loan: &Loan) -> Result<(), LoanError> {
        if loan.approved_by.is_some() || loan.approval_date.is_some() {
            return Err(LoanError::Precondition(
                "loan approval has already been recorded".into(),
            ));
        }
        Ok(())
    }

    fn validate_disbursement(&self, loan: &Loan) -> Result<(), LoanError> {
        if loan.investment_date.is_none() {
            return Err(LoanError::Precondition(
                "loan has not been fully invested".into(),
            ));
        }
        Ok(())
    }
}
