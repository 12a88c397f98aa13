//! Guard-then-mutate hooks bound to each lifecycle event
//!
//! A *before* hook only reads: it validates arguments, consults the [`StatusValidator`] and looks
//! up the parties involved. An *after* hook performs the mutation and every external side effect
//! (documents, investment records, the final save). Side effects already performed when an after
//! hook fails are not undone; a survey document created just before a failed save stays behind.
mod approve;
mod disburse;
mod invest;

use std::sync::Arc;

use chrono::Utc;

pub use disburse::{borrower_repayment, investor_payout};

use crate::engine::{Command, Outcome};
use crate::error::LoanError;
use crate::loan::{Loan, Status};
use crate::party::total_invested;
use crate::store::{DocumentStore, EmployeeLookup, InvestmentStore, LenderLookup, LoanStore};
use crate::types::TimeStamp;
use crate::validator::StatusValidator;

/// Source and declared destination of the transition being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub src: Status,
    pub dst: Status,
}

pub struct CallbackProvider {
    pub(crate) employees: Arc<dyn EmployeeLookup>,
    pub(crate) lenders: Arc<dyn LenderLookup>,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) investments: Arc<dyn InvestmentStore>,
    pub(crate) loans: Arc<dyn LoanStore>,
    pub(crate) validator: StatusValidator,
}

impl CallbackProvider {
    pub fn new(
        employees: Arc<dyn EmployeeLookup>,
        lenders: Arc<dyn LenderLookup>,
        documents: Arc<dyn DocumentStore>,
        investments: Arc<dyn InvestmentStore>,
        loans: Arc<dyn LoanStore>,
    ) -> Self {
        Self {
            employees,
            lenders,
            documents,
            investments,
            loans,
            validator: StatusValidator::new(),
        }
    }

    /// Every collaborator served by one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: EmployeeLookup + LenderLookup + DocumentStore + InvestmentStore + LoanStore + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
        )
    }

    pub fn before(
        &self,
        loan: &Loan,
        command: &Command,
        transition: Transition,
    ) -> Result<(), LoanError> {
        match command {
            Command::Approve {
                approver_id,
                document_filename,
            } => self.before_approve(loan, approver_id, document_filename, transition),
            Command::Invest { lender_id, amount } => {
                self.before_invest(loan, lender_id, *amount, transition)
            }
            Command::Disburse {
                field_officer_id,
                agreement_filename,
            } => self.before_disburse(loan, field_officer_id, agreement_filename, transition),
            Command::Reject { rejected_by, .. } => {
                self.before_reject(loan, rejected_by, transition)
            }
        }
    }

    pub fn after(
        &self,
        loan: &mut Loan,
        command: &Command,
        transition: Transition,
    ) -> Result<Outcome, LoanError> {
        match command {
            Command::Approve {
                approver_id,
                document_filename,
            } => self
                .after_approve(loan, approver_id, document_filename, transition)
                .map(|()| Outcome::Approved),
            Command::Invest { lender_id, amount } => self
                .after_invest(loan, lender_id, *amount, transition)
                .map(Outcome::Invested),
            Command::Disburse {
                field_officer_id,
                agreement_filename,
            } => self
                .after_disburse(loan, field_officer_id, agreement_filename, transition)
                .map(Outcome::Disbursed),
            Command::Reject {
                rejected_by,
                reason,
            } => self
                .after_reject(loan, rejected_by, reason, transition)
                .map(|()| Outcome::Rejected),
        }
    }

    /// Rejection carries no business side effects beyond the status change itself.
    pub fn before_reject(
        &self,
        loan: &Loan,
        rejected_by: &str,
        transition: Transition,
    ) -> Result<(), LoanError> {
        require(rejected_by, "rejected by is required")?;
        self.validator.validate(loan, transition.src, transition.dst)
    }

    pub fn after_reject(
        &self,
        loan: &mut Loan,
        rejected_by: &str,
        reason: &str,
        transition: Transition,
    ) -> Result<(), LoanError> {
        let description = if reason.is_empty() {
            "Loan rejected".to_owned()
        } else {
            format!("Loan rejected: {reason}")
        };
        loan.advance(transition.dst, TimeStamp::<Utc>::now(), &description, rejected_by);
        self.persist(loan)
    }

    /// Sum of every investment record currently stored for the loan.
    fn current_investment(&self, loan_id: &str) -> Result<f64, LoanError> {
        let investments = self.investments.investments_for_loan(loan_id).map_err(|err| {
            LoanError::PersistenceFailed(format!("error fetching investments: {err}"))
        })?;
        Ok(total_invested(&investments))
    }

    fn ensure_employee(&self, id: &str, role: &'static str) -> Result<(), LoanError> {
        match self.employees.employee(id) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(LoanError::NotFound(role)),
            Err(err) => Err(LoanError::PersistenceFailed(format!(
                "error looking up {role}: {err}"
            ))),
        }
    }

    fn persist(&self, loan: &Loan) -> Result<(), LoanError> {
        self.loans.save_loan(loan).map_err(|err| {
            LoanError::PersistenceFailed(format!("error updating loan status: {err}"))
        })
    }
}

fn require(value: &str, message: &'static str) -> Result<(), LoanError> {
    if value.is_empty() {
        return Err(LoanError::MissingField(message));
    }
    Ok(())
}
