//! Loan lifecycle: a guarded state machine taking a loan from proposal to disbursement.
//!
//! Loans move `Proposed -> Approved -> Invested -> Disbursed` (or `Proposed -> Rejected`) only
//! through [`engine::LoanLifecycle`], which runs each event's before and after hooks from
//! [`callbacks::CallbackProvider`] and records every status change in the loan's audit trail.

pub mod callbacks;
pub mod config;
pub mod engine;
pub mod error;
pub mod loan;
pub mod party;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod validator;

pub use engine::{
    Command, DisbursementResult, Event, InvestmentResult, LoanLifecycle, Outcome,
    is_valid_event_name,
};
pub use error::{LoanError, StoreError};
pub use loan::{Loan, LoanTerms, Status, StatusTransition};
pub use service::LoanService;
