use chrono::Utc;

use super::{CallbackProvider, Transition, require};
use crate::engine::DisbursementResult;
use crate::error::LoanError;
use crate::loan::Loan;
use crate::types::TimeStamp;

/// What the investors are owed in total: everything invested plus the loan's ROI on it.
pub fn investor_payout(total_invested: f64, roi: f64) -> f64 {
    total_invested + total_invested * (roi / 100.0)
}

/// What the borrower repays: principal plus interest at the borrower rate.
pub fn borrower_repayment(principal: f64, rate: f64) -> f64 {
    principal + principal * (rate / 100.0)
}

impl CallbackProvider {
    pub fn before_disburse(
        &self,
        loan: &Loan,
        field_officer_id: &str,
        agreement_filename: &str,
        transition: Transition,
    ) -> Result<(), LoanError> {
        require(agreement_filename, "loan agreement document is required")?;
        require(field_officer_id, "field officer ID is required")?;

        self.validator
            .validate(loan, transition.src, transition.dst)?;

        self.ensure_employee(field_officer_id, "field officer")?;

        let investments = self
            .investments
            .investments_for_loan(&loan.id)
            .map_err(|err| {
                LoanError::PersistenceFailed(format!("error fetching investments: {err}"))
            })?;
        if investments.is_empty() {
            return Err(LoanError::Precondition(
                "loan must have at least one investor before disbursement".into(),
            ));
        }

        if !(loan.roi > 0.0) {
            return Err(LoanError::Precondition(
                "loan interest rate must be set before disbursement".into(),
            ));
        }
        if !(loan.rate > 0.0) {
            return Err(LoanError::Precondition(
                "loan rate must be set before disbursement".into(),
            ));
        }
        Ok(())
    }

    pub fn after_disburse(
        &self,
        loan: &mut Loan,
        field_officer_id: &str,
        agreement_filename: &str,
        transition: Transition,
    ) -> Result<DisbursementResult, LoanError> {
        let agreement = self
            .documents
            .create_document(&loan.id, agreement_filename)
            .map_err(|err| {
                LoanError::DocumentCreationFailed(format!(
                    "error saving loan agreement document: {err}"
                ))
            })?;

        let investor_roi = investor_payout(self.current_investment(&loan.id)?, loan.roi);
        let repayment = borrower_repayment(loan.amount, loan.rate);

        let now = TimeStamp::<Utc>::now();
        loan.disbursement_date = Some(now.clone());
        loan.disbursed_by = Some(field_officer_id.to_owned());
        loan.agreement_document_id = Some(agreement.id);
        loan.advance(transition.dst, now.clone(), "Loan disbursed", field_officer_id);

        self.persist(loan)?;

        Ok(DisbursementResult {
            disbursement_date: now,
            disbursed_by: field_officer_id.to_owned(),
            agreement_document: agreement.file_name,
            borrower_repayment: repayment,
            investor_roi,
        })
    }
}
