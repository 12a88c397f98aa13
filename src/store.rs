//! Storage contracts the lifecycle depends on, and their sled-backed implementation
use std::sync::Arc;

use sled::{Batch, Db, IVec, Tree};

use crate::error::StoreError;
use crate::loan::{Loan, StatusTransition};
use crate::party::{Borrower, Document, Employee, Investment, Lender, Profile};
use crate::types::{self, TimeStamp};

pub trait EmployeeLookup: Send + Sync {
    fn employee(&self, id: &str) -> Result<Option<Employee>, StoreError>;
}

pub trait LenderLookup: Send + Sync {
    fn lender(&self, id: &str) -> Result<Option<Lender>, StoreError>;
}

pub trait DocumentStore: Send + Sync {
    fn create_document(&self, loan_id: &str, file_name: &str) -> Result<Document, StoreError>;
    /// Insertion order.
    fn documents_for_loan(&self, loan_id: &str) -> Result<Vec<Document>, StoreError>;
}

pub trait InvestmentStore: Send + Sync {
    fn create_investment(
        &self,
        loan_id: &str,
        lender_id: &str,
        amount: f64,
    ) -> Result<Investment, StoreError>;
    /// Insertion order.
    fn investments_for_loan(&self, loan_id: &str) -> Result<Vec<Investment>, StoreError>;
    fn investments_for_lender(&self, lender_id: &str) -> Result<Vec<Investment>, StoreError>;
}

pub trait LoanStore: Send + Sync {
    fn get_loan(&self, id: &str) -> Result<Option<Loan>, StoreError>;
    /// Full-row upsert, never a partial patch.
    fn save_loan(&self, loan: &Loan) -> Result<(), StoreError>;
    fn list_loans(&self) -> Result<Vec<Loan>, StoreError>;
}

const LOAN_ROW: &str = "loan";
const AUDIT_ROW: &str = "audit";
const BY_LOAN: &str = "loan";
const BY_LENDER: &str = "lender";

/// Every collaborator contract over a single sled instance, one tree per entity.
pub struct SledStore {
    instance: Arc<Db>,
    loans: Tree, // loan rows and their content-addressed audit entries
    investments: Tree, // keyed by loan and by lender
    documents: Tree,
    employees: Tree,
    lenders: Tree,
    borrowers: Tree,
}

impl SledStore {
    pub fn open(instance: Arc<Db>) -> Result<Self, StoreError> {
        Ok(Self {
            loans: instance.open_tree("loans")?,
            investments: instance.open_tree("investments")?,
            documents: instance.open_tree("documents")?,
            employees: instance.open_tree("employees")?,
            lenders: instance.open_tree("lenders")?,
            borrowers: instance.open_tree("borrowers")?,
            instance,
        })
    }

    pub fn insert_employee(&self, profile: Profile) -> Result<Employee, StoreError> {
        let employee = Employee {
            id: types::new_id(types::EMPLOYEE_PREFIX)?,
            profile,
            created_at: TimeStamp::now(),
        };
        self.employees.insert(employee.id.as_bytes(), encode(&employee)?)?;
        Ok(employee)
    }

    pub fn insert_lender(&self, profile: Profile) -> Result<Lender, StoreError> {
        let lender = Lender {
            id: types::new_id(types::LENDER_PREFIX)?,
            profile,
            created_at: TimeStamp::now(),
        };
        self.lenders.insert(lender.id.as_bytes(), encode(&lender)?)?;
        Ok(lender)
    }

    pub fn insert_borrower(&self, profile: Profile) -> Result<Borrower, StoreError> {
        let borrower = Borrower {
            id: types::new_id(types::BORROWER_PREFIX)?,
            profile,
            created_at: TimeStamp::now(),
        };
        self.borrowers.insert(borrower.id.as_bytes(), encode(&borrower)?)?;
        Ok(borrower)
    }

    pub fn borrower(&self, id: &str) -> Result<Option<Borrower>, StoreError> {
        get_decoded(&self.borrowers, id.as_bytes())
    }

    /// Look up one audit entry by the digest it was stored under.
    pub fn audit_record(&self, digest: &str) -> Result<Option<StatusTransition>, StoreError> {
        get_decoded(&self.loans, row_key(AUDIT_ROW, digest).as_bytes())
    }

    fn next_key(&self, family: &str, owner: &str) -> Result<Vec<u8>, StoreError> {
        let seq = self.instance.generate_id()?;
        let mut key = owner_prefix(family, owner);
        key.extend_from_slice(&seq.to_be_bytes());
        Ok(key)
    }
}

impl EmployeeLookup for SledStore {
    fn employee(&self, id: &str) -> Result<Option<Employee>, StoreError> {
        get_decoded(&self.employees, id.as_bytes())
    }
}

impl LenderLookup for SledStore {
    fn lender(&self, id: &str) -> Result<Option<Lender>, StoreError> {
        get_decoded(&self.lenders, id.as_bytes())
    }
}

impl DocumentStore for SledStore {
    fn create_document(&self, loan_id: &str, file_name: &str) -> Result<Document, StoreError> {
        let document = Document {
            id: types::new_id(types::DOCUMENT_PREFIX)?,
            loan_id: loan_id.to_owned(),
            file_name: file_name.to_owned(),
            created_at: TimeStamp::now(),
        };
        let key = self.next_key(BY_LOAN, loan_id)?;
        self.documents.insert(key, encode(&document)?)?;
        Ok(document)
    }

    fn documents_for_loan(&self, loan_id: &str) -> Result<Vec<Document>, StoreError> {
        scan_decoded(&self.documents, &owner_prefix(BY_LOAN, loan_id))
    }
}

impl InvestmentStore for SledStore {
    fn create_investment(
        &self,
        loan_id: &str,
        lender_id: &str,
        amount: f64,
    ) -> Result<Investment, StoreError> {
        let investment = Investment {
            id: types::new_id(types::INVESTMENT_PREFIX)?,
            loan_id: loan_id.to_owned(),
            lender_id: lender_id.to_owned(),
            amount,
            created_at: TimeStamp::now(),
        };
        let cbor = encode(&investment)?;

        // both views of the record land together or not at all
        let mut batch = Batch::default();
        batch.insert(self.next_key(BY_LOAN, loan_id)?, cbor.clone());
        batch.insert(self.next_key(BY_LENDER, lender_id)?, cbor);
        self.investments.apply_batch(batch)?;

        Ok(investment)
    }

    fn investments_for_loan(&self, loan_id: &str) -> Result<Vec<Investment>, StoreError> {
        scan_decoded(&self.investments, &owner_prefix(BY_LOAN, loan_id))
    }

    fn investments_for_lender(&self, lender_id: &str) -> Result<Vec<Investment>, StoreError> {
        scan_decoded(&self.investments, &owner_prefix(BY_LENDER, lender_id))
    }
}

impl LoanStore for SledStore {
    fn get_loan(&self, id: &str) -> Result<Option<Loan>, StoreError> {
        get_decoded(&self.loans, row_key(LOAN_ROW, id).as_bytes())
    }

    fn save_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        let mut batch = Batch::default();
        batch.insert(row_key(LOAN_ROW, &loan.id).as_bytes(), encode(loan)?);
        // content-addressed, so rewriting entries already present is a no-op
        for transition in loan.transitions() {
            let (digest, cbor) = transition.digest()?;
            batch.insert(row_key(AUDIT_ROW, &digest).as_bytes(), cbor);
        }
        self.loans.apply_batch(batch)?;
        Ok(())
    }

    fn list_loans(&self) -> Result<Vec<Loan>, StoreError> {
        scan_decoded(&self.loans, format!("{LOAN_ROW}/").as_bytes())
    }
}

fn row_key(family: &str, id: &str) -> String {
    format!("{family}/{id}")
}

fn owner_prefix(family: &str, owner: &str) -> Vec<u8> {
    format!("{family}/{owner}/").into_bytes()
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(minicbor::to_vec(value)?)
}

fn decode<T>(bytes: &IVec) -> Result<T, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

fn get_decoded<T>(tree: &Tree, key: &[u8]) -> Result<Option<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.get(key)?.as_ref().map(decode::<T>).transpose()
}

fn scan_decoded<T>(tree: &Tree, prefix: &[u8]) -> Result<Vec<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.scan_prefix(prefix)
        .map(|entry| {
            let (_, value) = entry?;
            decode(&value)
        })
        .collect()
}
