use chrono::Utc;

use super::{CallbackProvider, Transition, require};
use crate::error::LoanError;
use crate::loan::Loan;
use crate::types::TimeStamp;

impl CallbackProvider {
    pub fn before_approve(
        &self,
        loan: &Loan,
        approver_id: &str,
        document_filename: &str,
        transition: Transition,
    ) -> Result<(), LoanError> {
        require(document_filename, "document is required")?;
        require(approver_id, "approved by is required")?;

        self.validator
            .validate(loan, transition.src, transition.dst)?;

        self.ensure_employee(approver_id, "employee")
    }

    pub fn after_approve(
        &self,
        loan: &mut Loan,
        approver_id: &str,
        document_filename: &str,
        transition: Transition,
    ) -> Result<(), LoanError> {
        let survey = self
            .documents
            .create_document(&loan.id, document_filename)
            .map_err(|err| {
                LoanError::DocumentCreationFailed(format!("error creating document: {err}"))
            })?;

        let now = TimeStamp::<Utc>::now();
        loan.approval_date = Some(now.clone());
        loan.approved_by = Some(approver_id.to_owned());
        loan.survey_document_id = Some(survey.id);
        loan.advance(transition.dst, now, "Loan approved", approver_id);

        // the survey document stays behind if this fails
        self.persist(loan)
    }
}
