//! The loan lifecycle state machine
//!
//! [`LoanLifecycle`] owns the event table and dispatches one event at a time per loan: it resolves
//! the destination status for the loan's current status, runs the event's before hook, then its
//! after hook, and hands back a typed result. Dispatches against the same loan id are serialised
//! and always start from the persisted copy of the loan, so two concurrent investments can no
//! longer both pass the principal check against a stale running total.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{info, info_span, warn};

use crate::callbacks::{CallbackProvider, Transition};
use crate::error::LoanError;
use crate::loan::{Loan, Status};
use crate::types::TimeStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Approve,
    Invest,
    Disburse,
    Reject,
}

impl Event {
    pub const ALL: [Event; 4] = [Event::Approve, Event::Invest, Event::Disburse, Event::Reject];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Approve => "approve",
            Event::Invest => "invest",
            Event::Disburse => "disburse",
            Event::Reject => "reject",
        }
    }

    /// The declared destination of this event from `from`, or `None` when the event is not legal
    /// there.
    pub fn destination(&self, from: Status) -> Option<Status> {
        match (self, from) {
            (Event::Approve, Status::Proposed) => Some(Status::Approved),
            (Event::Reject, Status::Proposed) => Some(Status::Rejected),
            (Event::Invest, Status::Approved) => Some(Status::Invested),
            (Event::Disburse, Status::Invested) => Some(Status::Disbursed),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Event {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| LoanError::UnknownEvent(s.to_owned()))
    }
}

/// For upstream input validation of event names.
pub fn is_valid_event_name(name: &str) -> bool {
    name.parse::<Event>().is_ok()
}

/// One lifecycle event together with the arguments it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Approve {
        approver_id: String,
        document_filename: String,
    },
    Invest {
        lender_id: String,
        amount: f64,
    },
    Disburse {
        field_officer_id: String,
        agreement_filename: String,
    },
    Reject {
        rejected_by: String,
        reason: String,
    },
}

impl Command {
    pub fn event(&self) -> Event {
        match self {
            Command::Approve { .. } => Event::Approve,
            Command::Invest { .. } => Event::Invest,
            Command::Disburse { .. } => Event::Disburse,
            Command::Reject { .. } => Event::Reject,
        }
    }
}

/// Reported for every accepted contribution, whether or not it completed funding.
#[derive(Debug, Clone, PartialEq)]
pub struct InvestmentResult {
    pub remaining_amount: f64,
    pub invested_amount: f64,
    pub agreement_document: Option<String>, // only when this contribution completed funding
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisbursementResult {
    pub disbursement_date: TimeStamp<Utc>,
    pub disbursed_by: String,
    pub agreement_document: String,
    pub borrower_repayment: f64,
    pub investor_roi: f64, // total owed to investors, principal included
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Approved,
    Invested(InvestmentResult),
    Disbursed(DisbursementResult),
    Rejected,
}

/// One mutex per loan id with a dispatch in flight. Entries are dropped once no dispatch holds
/// or awaits them.
#[derive(Default)]
struct LoanLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LoanLocks {
    fn acquire(&self, loan_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(loan_id.to_owned()).or_default().clone()
    }

    fn release(&self, loan_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // clones are only taken under the map lock, so two owners are the map and this caller
        if Arc::strong_count(&lock) == 2 {
            locks.remove(loan_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct LoanLifecycle {
    callbacks: CallbackProvider,
    locks: LoanLocks,
}

impl LoanLifecycle {
    pub fn new(callbacks: CallbackProvider) -> Self {
        Self {
            callbacks,
            locks: LoanLocks::default(),
        }
    }

    pub fn callbacks(&self) -> &CallbackProvider {
        &self.callbacks
    }

    /// Dispatch any event. The typed helpers below are usually more convenient.
    pub fn fire(&self, loan: &mut Loan, command: Command) -> Result<Outcome, LoanError> {
        self.dispatch(
            loan,
            command.event(),
            |callbacks, loan, transition| callbacks.before(loan, &command, transition),
            |callbacks, loan, transition| callbacks.after(loan, &command, transition),
        )
    }

    pub fn approve(
        &self,
        loan: &mut Loan,
        approver_id: &str,
        document_filename: &str,
    ) -> Result<(), LoanError> {
        self.dispatch(
            loan,
            Event::Approve,
            |callbacks, loan, transition| {
                callbacks.before_approve(loan, approver_id, document_filename, transition)
            },
            |callbacks, loan, transition| {
                callbacks.after_approve(loan, approver_id, document_filename, transition)
            },
        )
    }

    pub fn invest(
        &self,
        loan: &mut Loan,
        lender_id: &str,
        amount: f64,
    ) -> Result<InvestmentResult, LoanError> {
        self.dispatch(
            loan,
            Event::Invest,
            |callbacks, loan, transition| {
                callbacks.before_invest(loan, lender_id, amount, transition)
            },
            |callbacks, loan, transition| {
                callbacks.after_invest(loan, lender_id, amount, transition)
            },
        )
    }

    pub fn disburse(
        &self,
        loan: &mut Loan,
        field_officer_id: &str,
        agreement_filename: &str,
    ) -> Result<DisbursementResult, LoanError> {
        self.dispatch(
            loan,
            Event::Disburse,
            |callbacks, loan, transition| {
                callbacks.before_disburse(loan, field_officer_id, agreement_filename, transition)
            },
            |callbacks, loan, transition| {
                callbacks.after_disburse(loan, field_officer_id, agreement_filename, transition)
            },
        )
    }

    pub fn reject(
        &self,
        loan: &mut Loan,
        rejected_by: &str,
        reason: &str,
    ) -> Result<(), LoanError> {
        self.dispatch(
            loan,
            Event::Reject,
            |callbacks, loan, transition| callbacks.before_reject(loan, rejected_by, transition),
            |callbacks, loan, transition| {
                callbacks.after_reject(loan, rejected_by, reason, transition)
            },
        )
    }

    fn dispatch<T, B, A>(
        &self,
        loan: &mut Loan,
        event: Event,
        before: B,
        after: A,
    ) -> Result<T, LoanError>
    where
        B: FnOnce(&CallbackProvider, &Loan, Transition) -> Result<(), LoanError>,
        A: FnOnce(&CallbackProvider, &mut Loan, Transition) -> Result<T, LoanError>,
    {
        let span = info_span!("dispatch", loan_id = %loan.id, %event);
        let _entered = span.enter();

        let loan_id = loan.id.clone();
        let lock = self.locks.acquire(&loan_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.dispatch_locked(loan, event, before, after)
        };
        self.locks.release(&loan_id, lock);

        result
    }

    fn dispatch_locked<T, B, A>(
        &self,
        loan: &mut Loan,
        event: Event,
        before: B,
        after: A,
    ) -> Result<T, LoanError>
    where
        B: FnOnce(&CallbackProvider, &Loan, Transition) -> Result<(), LoanError>,
        A: FnOnce(&CallbackProvider, &mut Loan, Transition) -> Result<T, LoanError>,
    {
        self.refresh(loan)?;

        let src = loan.status();
        let Some(dst) = event.destination(src) else {
            warn!(status = %src, "no transition declared for event");
            return Err(LoanError::NoTransition { event });
        };
        let transition = Transition { src, dst };

        if let Err(err) = before(&self.callbacks, &*loan, transition) {
            warn!(error = %err, "dispatch cancelled by before hook");
            return Err(err);
        }

        // the caller's copy only changes once the after hook has completed
        let mut working = loan.clone();
        match after(&self.callbacks, &mut working, transition) {
            Ok(result) => {
                info!(from = %src, to = %working.status(), "dispatch completed");
                *loan = working;
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, "dispatch cancelled by after hook");
                Err(err)
            }
        }
    }

    /// Replace the caller's copy with the persisted one, when there is one.
    fn refresh(&self, loan: &mut Loan) -> Result<(), LoanError> {
        let persisted = self
            .callbacks
            .loans
            .get_loan(&loan.id)
            .map_err(|err| LoanError::PersistenceFailed(format!("error loading loan: {err}")))?;
        if let Some(persisted) = persisted {
            *loan = persisted;
        }
        Ok(())
    }
}
