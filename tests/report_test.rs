mod common;

use anyhow::Result;
use common::{StandardLedger, test_service};
use storno::application::{ReversalRequest, WizardOutcome};
use storno::domain::AuditKind;

#[tokio::test]
async fn test_report_twice_is_identical_and_changes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 100000).await?;
    StandardLedger::pay(&service, "BNK1", 70000, &["INV/0001"]).await?;
    StandardLedger::pay(&service, "BNK1", 30000, &["INV/0001"]).await?;
    let before = service.ledger_stats().await?;

    let request = ReversalRequest::new(vec![invoice.id]);
    let first = service.report(&request).await?;
    let second = service.report(&request).await?;
    assert_eq!(first.outcome, WizardOutcome::Close);
    assert_eq!(second.outcome, WizardOutcome::Close);

    let after = service.ledger_stats().await?;
    assert_eq!(after.move_count, before.move_count);
    assert_eq!(after.line_count, before.line_count);
    assert_eq!(after.partial_count, before.partial_count);
    assert_eq!(after.payment_count, before.payment_count);
    assert_eq!(after.open_amount, before.open_amount);
    assert_eq!(after.message_count, before.message_count + 2);

    let log = service.activity_log("INV/0001").await?;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].body, log[1].body);
    assert!(log[0].sequence < log[1].sequence);
    assert_eq!(log[0].subject, "Credit note and payment reversal report");

    let body = &log[0].body;
    assert!(body.contains("Payments currently applied to the invoice:"));
    assert!(body.contains("Inbound payment PAY/0001"));
    assert!(body.contains("Inbound payment PAY/0002"));
    assert!(body.contains("(no credit notes found)"));
    assert!(body.contains("(no reversals created)"));

    Ok(())
}

#[tokio::test]
async fn test_report_after_reversal_lists_credit_notes_and_refunds() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 100000).await?;
    StandardLedger::pay(&service, "BNK1", 70000, &["INV/0001"]).await?;
    StandardLedger::pay(&service, "BNK1", 30000, &["INV/0001"]).await?;

    let request = ReversalRequest::new(vec![invoice.id]);
    service.reverse(&request).await?;
    let before = service.ledger_stats().await?;

    let summary = service.report(&request).await?;
    let entry = &summary.invoices[0].entry;
    assert_eq!(entry.kind, AuditKind::Report);
    assert_eq!(entry.credit_notes, vec!["CN/0001".to_string()]);
    assert!(entry.allocations.is_empty());
    assert_eq!(entry.reversals.len(), 2);
    let mut originals: Vec<_> = entry
        .reversals
        .iter()
        .map(|r| r.original_payment.as_str())
        .collect();
    originals.sort();
    assert_eq!(originals, vec!["PAY/0001", "PAY/0002"]);

    // Logged on the invoice and its credit note, nothing else touched
    let after = service.ledger_stats().await?;
    assert_eq!(after.message_count, before.message_count + 2);
    assert_eq!(after.payment_count, before.payment_count);
    assert_eq!(after.partial_count, before.partial_count);

    let credit_note_log = service.activity_log("CN/0001").await?;
    assert_eq!(credit_note_log.len(), 2);
    assert_eq!(credit_note_log[1].entry()?, *entry);

    Ok(())
}
