//! Service layer API: origination, queries, and lifecycle operations addressed by loan id
use std::sync::Arc;

use tracing::info;

use crate::callbacks::CallbackProvider;
use crate::engine::{DisbursementResult, InvestmentResult, LoanLifecycle};
use crate::error::LoanError;
use crate::loan::{Loan, LoanTerms, Status};
use crate::party::{Borrower, Employee, Investment, Lender, Profile, total_invested};
use crate::store::{InvestmentStore, LoanStore, SledStore};
use crate::types::{self, LOAN_PREFIX};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Criteria for [`LoanService::list`]. Zero `page` or `page_size` fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanFilter {
    pub status: Option<Status>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub page: usize,
    pub page_size: usize,
}

impl LoanFilter {
    pub fn with_defaults(mut self) -> Self {
        if self.page == 0 {
            self.page = DEFAULT_PAGE;
        }
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        self.status.is_none_or(|status| loan.status() == status)
            && self.min_amount.is_none_or(|min| loan.amount >= min)
            && self.max_amount.is_none_or(|max| loan.amount <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationInfo {
    pub current_page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PaginationInfo,
}

pub struct LoanService {
    store: Arc<SledStore>,
    lifecycle: LoanLifecycle,
}

impl LoanService {
    pub fn new(store: Arc<SledStore>) -> Self {
        let lifecycle = LoanLifecycle::new(CallbackProvider::from_store(store.clone()));
        Self { store, lifecycle }
    }

    pub fn lifecycle(&self) -> &LoanLifecycle {
        &self.lifecycle
    }

    pub fn store(&self) -> &SledStore {
        &self.store
    }

    pub fn register_employee(&self, profile: Profile) -> Result<Employee, LoanError> {
        Ok(self.store.insert_employee(profile)?)
    }

    pub fn register_lender(&self, profile: Profile) -> Result<Lender, LoanError> {
        Ok(self.store.insert_lender(profile)?)
    }

    pub fn register_borrower(&self, profile: Profile) -> Result<Borrower, LoanError> {
        Ok(self.store.insert_borrower(profile)?)
    }

    /// Originate a loan in `Proposed` for an existing borrower.
    pub fn create_loan(&self, borrower_id: &str, terms: LoanTerms) -> Result<Loan, LoanError> {
        if self.store.borrower(borrower_id)?.is_none() {
            return Err(LoanError::NotFound("borrower"));
        }
        terms.validate()?;

        let loan = Loan::new(types::new_id(LOAN_PREFIX)?, borrower_id.to_owned(), terms);
        self.store.save_loan(&loan)?;

        info!(loan_id = %loan.id, amount = terms.amount, "loan originated");
        Ok(loan)
    }

    pub fn get(&self, loan_id: &str) -> Result<Loan, LoanError> {
        self.store
            .get_loan(loan_id)?
            .ok_or_else(|| LoanError::LoanNotFound(loan_id.to_owned()))
    }

    /// Matching loans, oldest first, one page at a time.
    pub fn list(&self, filter: LoanFilter) -> Result<Page<Loan>, LoanError> {
        let filter = filter.with_defaults();

        let mut loans: Vec<Loan> = self
            .store
            .list_loans()?
            .into_iter()
            .filter(|loan| filter.matches(loan))
            .collect();
        loans.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total_items = loans.len();
        let data = loans
            .into_iter()
            .skip((filter.page - 1).saturating_mul(filter.page_size))
            .take(filter.page_size)
            .collect();

        Ok(Page {
            data,
            pagination: PaginationInfo {
                current_page: filter.page,
                page_size: filter.page_size,
                total_items,
                total_pages: total_items.div_ceil(filter.page_size),
            },
        })
    }

    pub fn approve_loan(
        &self,
        loan_id: &str,
        approver_id: &str,
        document_filename: &str,
    ) -> Result<Loan, LoanError> {
        let mut loan = self.get(loan_id)?;
        self.lifecycle
            .approve(&mut loan, approver_id, document_filename)?;
        Ok(loan)
    }

    pub fn invest_loan(
        &self,
        loan_id: &str,
        lender_id: &str,
        amount: f64,
    ) -> Result<InvestmentResult, LoanError> {
        let mut loan = self.get(loan_id)?;
        self.lifecycle.invest(&mut loan, lender_id, amount)
    }

    pub fn disburse_loan(
        &self,
        loan_id: &str,
        field_officer_id: &str,
        agreement_filename: &str,
    ) -> Result<DisbursementResult, LoanError> {
        let mut loan = self.get(loan_id)?;
        self.lifecycle
            .disburse(&mut loan, field_officer_id, agreement_filename)
    }

    pub fn reject_loan(
        &self,
        loan_id: &str,
        rejected_by: &str,
        reason: &str,
    ) -> Result<Loan, LoanError> {
        let mut loan = self.get(loan_id)?;
        self.lifecycle.reject(&mut loan, rejected_by, reason)?;
        Ok(loan)
    }

    /// Every contribution a lender has made, across all loans.
    pub fn investments_for_lender(&self, lender_id: &str) -> Result<Vec<Investment>, LoanError> {
        Ok(self.store.investments_for_lender(lender_id)?)
    }

    pub fn total_investment_for_loan(&self, loan_id: &str) -> Result<f64, LoanError> {
        Ok(total_invested(&self.store.investments_for_loan(loan_id)?))
    }
}
