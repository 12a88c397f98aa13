use chrono::Utc;
use tracing::debug;

use super::{CallbackProvider, Transition};
use crate::engine::InvestmentResult;
use crate::error::LoanError;
use crate::loan::Loan;
use crate::types::TimeStamp;

impl CallbackProvider {
    /// Guards one contribution. The table-level `Approved -> Invested` check runs even though this
    /// contribution may leave the loan only partially funded.
    pub fn before_invest(
        &self,
        loan: &Loan,
        lender_id: &str,
        amount: f64,
        transition: Transition,
    ) -> Result<(), LoanError> {
        // negated so NaN is refused as well
        if !(amount > 0.0) {
            return Err(LoanError::Precondition(
                "investment amount must be positive".into(),
            ));
        }

        match self.lenders.lender(lender_id) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(LoanError::NotFound("lender")),
            Err(err) => {
                return Err(LoanError::PersistenceFailed(format!(
                    "error looking up lender: {err}"
                )));
            }
        }

        let current_investment = self.current_investment(&loan.id)?;
        if amount > loan.amount - current_investment {
            return Err(LoanError::ExceedsPrincipal);
        }

        self.validator
            .validate(loan, transition.src, transition.dst)
    }

    /// Records the contribution and advances the loan only when it is now exactly fully funded.
    pub fn after_invest(
        &self,
        loan: &mut Loan,
        lender_id: &str,
        amount: f64,
        transition: Transition,
    ) -> Result<InvestmentResult, LoanError> {
        // re-read, other contributions may have landed since the guard ran
        let current_investment = self.current_investment(&loan.id)?;

        let investment = self
            .investments
            .create_investment(&loan.id, lender_id, amount)
            .map_err(|err| {
                LoanError::PersistenceFailed(format!("error creating investment record: {err}"))
            })?;

        let invested_amount = current_investment + amount;
        // exact equality: contributions must sum precisely to the principal
        let fully_funded = invested_amount == loan.amount;

        let mut agreement_document = None;
        if fully_funded {
            let invested_at = TimeStamp::<Utc>::now();
            loan.investment_date = Some(invested_at.clone());
            loan.advance(transition.dst, invested_at, "Loan fully invested", lender_id);

            let file_name = format!("agreement_{}.pdf", loan.id);
            let agreement = self
                .documents
                .create_document(&loan.id, &file_name)
                .map_err(|err| {
                    LoanError::DocumentCreationFailed(format!(
                        "error creating agreement document: {err}"
                    ))
                })?;
            loan.agreement_document_id = Some(agreement.id);
            agreement_document = Some(agreement.file_name);

            self.persist(loan)?;
        } else {
            debug!(
                investment_id = %investment.id,
                invested_amount,
                principal = loan.amount,
                "loan partially funded"
            );
        }

        Ok(InvestmentResult {
            remaining_amount: loan.amount - invested_amount,
            invested_amount,
            agreement_document,
        })
    }
}
