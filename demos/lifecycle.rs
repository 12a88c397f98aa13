//! Walks one loan from proposal to disbursement against a fresh database.
//!
//! Usage: cargo run --example lifecycle [config.yaml]
use std::path::Path;

use anyhow::Context;
use loan_lifecycle::config::LoanServiceConfig;
use loan_lifecycle::party::Profile;
use loan_lifecycle::{LoanService, LoanTerms, telemetry};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => LoanServiceConfig::load(Path::new(&path))?,
        None => LoanServiceConfig::default(),
    };
    config.apply_overrides(|name| std::env::var(name).ok());
    telemetry::init_tracing(&config.logging.filter);

    let service = LoanService::new(config.open_store()?);

    let borrower = service.register_borrower(Profile::new(
        "Budi Santoso",
        "budi@example.com",
        "+62-811-000-001",
        "3171000000000001",
    ))?;
    let officer = service.register_employee(Profile::new(
        "Sari Dewi",
        "sari@example.com",
        "+62-811-000-002",
        "3171000000000002",
    ))?;
    let first = service.register_lender(Profile::new("Andi", "andi@example.com", "", ""))?;
    let second = service.register_lender(Profile::new("Rina", "rina@example.com", "", ""))?;

    let loan = service.create_loan(&borrower.id, LoanTerms::new(200_000.0, 10.0, 8.0))?;
    info!(loan_id = %loan.id, "created");

    service
        .approve_loan(&loan.id, &officer.id, "survey.pdf")
        .context("approval failed")?;

    let partial = service.invest_loan(&loan.id, &first.id, 100_000.0)?;
    info!(remaining = partial.remaining_amount, "first investment recorded");
    let full = service.invest_loan(&loan.id, &second.id, 100_000.0)?;
    info!(agreement = ?full.agreement_document, "loan fully funded");

    let disbursed = service
        .disburse_loan(&loan.id, &officer.id, "signed_agreement.pdf")
        .context("disbursement failed")?;
    info!(
        borrower_repayment = disbursed.borrower_repayment,
        investor_roi = disbursed.investor_roi,
        "loan disbursed"
    );

    for transition in service.get(&loan.id)?.transitions() {
        let from = transition.from.map(|s| s.as_str()).unwrap_or("-");
        println!(
            "{} {:>9} -> {:<9} {} ({})",
            transition.date, from, transition.to, transition.description, transition.performed_by
        );
    }

    Ok(())
}
