//! Hook-level tests: guards called directly, and after hooks run against stores that fail on
//! demand.

use std::sync::Arc;

use loan_lifecycle::callbacks::{CallbackProvider, Transition};
use loan_lifecycle::loan::Loan;
use loan_lifecycle::party::{Document, Investment, Profile};
use loan_lifecycle::store::{DocumentStore, InvestmentStore, LoanStore, SledStore};
use loan_lifecycle::types::{self, TimeStamp};
use loan_lifecycle::{LoanError, LoanLifecycle, LoanTerms, Status, StoreError};
use sled::open;
use tempfile::{TempDir, tempdir};

fn sled_store(dir: &TempDir, name: &str) -> anyhow::Result<Arc<SledStore>> {
    let db = open(dir.path().join(format!("{name}.db")))?;
    Ok(Arc::new(SledStore::open(Arc::new(db))?))
}

fn unsupported(what: &str) -> StoreError {
    StoreError::Sled(sled::Error::Unsupported(format!("{what} disabled for this test")))
}

/// Delegates reads to sled; saves always fail.
struct ReadOnlyLoans(Arc<SledStore>);

impl LoanStore for ReadOnlyLoans {
    fn get_loan(&self, id: &str) -> Result<Option<Loan>, StoreError> {
        self.0.get_loan(id)
    }

    fn save_loan(&self, _loan: &Loan) -> Result<(), StoreError> {
        Err(unsupported("saving"))
    }

    fn list_loans(&self) -> Result<Vec<Loan>, StoreError> {
        self.0.list_loans()
    }
}

struct NoDocuments;

impl DocumentStore for NoDocuments {
    fn create_document(&self, _loan_id: &str, _file_name: &str) -> Result<Document, StoreError> {
        Err(unsupported("documents"))
    }

    fn documents_for_loan(&self, _loan_id: &str) -> Result<Vec<Document>, StoreError> {
        Ok(Vec::new())
    }
}

struct NoInvestments;

impl InvestmentStore for NoInvestments {
    fn create_investment(
        &self,
        _loan_id: &str,
        _lender_id: &str,
        _amount: f64,
    ) -> Result<Investment, StoreError> {
        Err(unsupported("investments"))
    }

    fn investments_for_loan(&self, _loan_id: &str) -> Result<Vec<Investment>, StoreError> {
        Err(unsupported("investments"))
    }

    fn investments_for_lender(&self, _lender_id: &str) -> Result<Vec<Investment>, StoreError> {
        Err(unsupported("investments"))
    }
}

/// Reads investments from sled; recording a new one always fails.
struct FrozenInvestments(Arc<SledStore>);

impl InvestmentStore for FrozenInvestments {
    fn create_investment(
        &self,
        _loan_id: &str,
        _lender_id: &str,
        _amount: f64,
    ) -> Result<Investment, StoreError> {
        Err(unsupported("recording investments"))
    }

    fn investments_for_loan(&self, loan_id: &str) -> Result<Vec<Investment>, StoreError> {
        self.0.investments_for_loan(loan_id)
    }

    fn investments_for_lender(&self, lender_id: &str) -> Result<Vec<Investment>, StoreError> {
        self.0.investments_for_lender(lender_id)
    }
}

fn proposed_loan(store: &SledStore, terms: LoanTerms) -> anyhow::Result<Loan> {
    let loan = Loan::new(types::new_id(types::LOAN_PREFIX)?, "borrower_hook".into(), terms);
    store.save_loan(&loan)?;
    Ok(loan)
}

#[test]
fn failed_save_leaves_the_survey_document_behind() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "failed_save")?;
    let officer = store.insert_employee(Profile::default())?;
    let mut loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;

    let lifecycle = LoanLifecycle::new(CallbackProvider::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(ReadOnlyLoans(store.clone())),
    ));

    let err = lifecycle
        .approve(&mut loan, &officer.id, "survey.pdf")
        .unwrap_err();

    assert!(matches!(err, LoanError::PersistenceFailed(_)));
    assert!(err.to_string().starts_with("error updating loan status"));
    // no rollback of the side effect, but neither copy of the loan moved
    assert_eq!(store.documents_for_loan(&loan.id)?.len(), 1);
    assert_eq!(loan.status(), Status::Proposed);
    assert_eq!(loan.approved_by, None);
    assert_eq!(store.get_loan(&loan.id)?.map(|l| l.status()), Some(Status::Proposed));
    Ok(())
}

#[test]
fn document_failure_stops_approval_before_the_save() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "document_failure")?;
    let officer = store.insert_employee(Profile::default())?;
    let mut loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;

    let lifecycle = LoanLifecycle::new(CallbackProvider::new(
        store.clone(),
        store.clone(),
        Arc::new(NoDocuments),
        store.clone(),
        store.clone(),
    ));

    let err = lifecycle
        .approve(&mut loan, &officer.id, "survey.pdf")
        .unwrap_err();

    assert!(matches!(err, LoanError::DocumentCreationFailed(_)));
    assert!(err.to_string().starts_with("error creating document"));
    assert_eq!(store.get_loan(&loan.id)?.map(|l| l.status()), Some(Status::Proposed));
    Ok(())
}

#[test]
fn unreadable_investments_surface_as_persistence_failures() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "unreadable_investments")?;
    let lender = store.insert_lender(Profile::default())?;
    let loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;

    let callbacks = CallbackProvider::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(NoInvestments),
        store.clone(),
    );
    let err = callbacks
        .before_invest(
            &loan,
            &lender.id,
            100.0,
            Transition {
                src: Status::Approved,
                dst: Status::Invested,
            },
        )
        .unwrap_err();

    assert!(err.to_string().starts_with("error fetching investments"));
    Ok(())
}

#[test]
fn disbursement_needs_at_least_one_investor() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "no_investors")?;
    let officer = store.insert_employee(Profile::default())?;
    let mut loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;
    loan.investment_date = Some(TimeStamp::now());

    let callbacks = CallbackProvider::from_store(store);
    let err = callbacks
        .before_disburse(
            &loan,
            &officer.id,
            "signed.pdf",
            Transition {
                src: Status::Invested,
                dst: Status::Disbursed,
            },
        )
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "loan must have at least one investor before disbursement"
    );
    Ok(())
}

#[test]
fn disbursement_needs_a_borrower_rate() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "no_rate")?;
    let officer = store.insert_employee(Profile::default())?;
    let mut loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;
    // terms that could not be originated, forced onto the row
    loan.rate = 0.0;
    loan.investment_date = Some(TimeStamp::now());
    store.create_investment(&loan.id, "lender_hook", 1_000.0)?;

    let callbacks = CallbackProvider::from_store(store);
    let err = callbacks
        .before_disburse(
            &loan,
            &officer.id,
            "signed.pdf",
            Transition {
                src: Status::Invested,
                dst: Status::Disbursed,
            },
        )
        .unwrap_err();

    assert_eq!(err.to_string(), "loan rate must be set before disbursement");
    Ok(())
}

#[test]
fn disbursement_validator_requires_full_funding() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "not_funded")?;
    let officer = store.insert_employee(Profile::default())?;
    let loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;

    let callbacks = CallbackProvider::from_store(store);
    let err = callbacks
        .before_disburse(
            &loan,
            &officer.id,
            "signed.pdf",
            Transition {
                src: Status::Invested,
                dst: Status::Disbursed,
            },
        )
        .unwrap_err();

    assert_eq!(err.to_string(), "loan has not been fully invested");
    Ok(())
}

#[test]
fn guards_reject_transitions_outside_the_table() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "outside_table")?;
    let officer = store.insert_employee(Profile::default())?;
    let loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;

    let callbacks = CallbackProvider::from_store(store);
    let err = callbacks
        .before_approve(
            &loan,
            &officer.id,
            "survey.pdf",
            Transition {
                src: Status::Approved,
                dst: Status::Approved,
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        LoanError::InvalidTransition {
            from: Status::Approved,
            to: Status::Approved
        }
    );
    assert_eq!(err.to_string(), "invalid transition from approved to approved");
    Ok(())
}

#[test]
fn partial_investment_is_recorded_without_touching_the_loan() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "partial_investment")?;
    let lender = store.insert_lender(Profile::default())?;
    let mut loan = proposed_loan(&store, LoanTerms::new(1_000.0, 10.0, 8.0))?;
    let before = loan.clone();

    let callbacks = CallbackProvider::from_store(store.clone());
    let result = callbacks.after_invest(
        &mut loan,
        &lender.id,
        400.0,
        Transition {
            src: Status::Approved,
            dst: Status::Invested,
        },
    )?;

    assert_eq!(result.invested_amount, 400.0);
    assert_eq!(result.remaining_amount, 600.0);
    assert_eq!(result.agreement_document, None);
    assert_eq!(loan, before);
    assert_eq!(store.investments_for_lender(&lender.id)?.len(), 1);
    assert!(store.documents_for_loan(&loan.id)?.is_empty());
    Ok(())
}

fn approved_loan(store: &Arc<SledStore>, amount: f64) -> anyhow::Result<Loan> {
    let officer = store.insert_employee(Profile::default())?;
    let mut loan = proposed_loan(store, LoanTerms::new(amount, 10.0, 8.0))?;
    LoanLifecycle::new(CallbackProvider::from_store(store.clone())).approve(
        &mut loan,
        &officer.id,
        "survey.pdf",
    )?;
    Ok(loan)
}

#[test]
fn failed_investment_record_changes_nothing() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "frozen_investments")?;
    let lender = store.insert_lender(Profile::default())?;
    let mut loan = approved_loan(&store, 1_000.0)?;

    let lifecycle = LoanLifecycle::new(CallbackProvider::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FrozenInvestments(store.clone())),
        store.clone(),
    ));
    let err = lifecycle.invest(&mut loan, &lender.id, 1_000.0).unwrap_err();

    assert!(matches!(err, LoanError::PersistenceFailed(_)));
    assert!(err.to_string().starts_with("error creating investment record"));
    assert!(store.investments_for_loan(&loan.id)?.is_empty());
    assert_eq!(loan.status(), Status::Approved);
    assert_eq!(store.get_loan(&loan.id)?, Some(loan));
    Ok(())
}

#[test]
fn failed_agreement_keeps_the_completing_investment() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = sled_store(&dir, "agreement_failure")?;
    let lender = store.insert_lender(Profile::default())?;
    let mut loan = approved_loan(&store, 1_000.0)?;

    let lifecycle = LoanLifecycle::new(CallbackProvider::new(
        store.clone(),
        store.clone(),
        Arc::new(NoDocuments),
        store.clone(),
        store.clone(),
    ));
    let err = lifecycle.invest(&mut loan, &lender.id, 1_000.0).unwrap_err();

    assert!(matches!(err, LoanError::DocumentCreationFailed(_)));
    assert!(err.to_string().starts_with("error creating agreement document"));

    // the record stays, while the loan never left approved
    let investments = store.investments_for_loan(&loan.id)?;
    assert_eq!(investments.len(), 1);
    assert_eq!(investments[0].amount, loan.amount);
    assert_eq!(loan.status(), Status::Approved);
    assert_eq!(loan.investment_date, None);

    let persisted = store.get_loan(&loan.id)?.expect("loan is persisted");
    assert_eq!(persisted.status(), Status::Approved);
    assert!(persisted.is_consistent());

    // fully funded yet still approved, so any further contribution exceeds the principal
    let err = LoanLifecycle::new(CallbackProvider::from_store(store.clone()))
        .invest(&mut loan, &lender.id, 1.0)
        .unwrap_err();
    assert_eq!(err, LoanError::ExceedsPrincipal);
    Ok(())
}
