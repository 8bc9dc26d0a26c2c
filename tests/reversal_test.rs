mod common;

use anyhow::Result;
use common::{StandardLedger, parse_date, test_service, test_service_with};
use storno::application::{
    AppError, ReversalAction, ReversalRequest, WizardConfig, WizardOutcome,
};
use storno::domain::{AuditKind, MoveState, MoveType, PaymentType};
use uuid::Uuid;

#[tokio::test]
async fn test_reverse_invoice_paid_by_two_payments() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 100000).await?;
    assert_eq!(invoice.name, "INV/0001");
    let p1 = StandardLedger::pay(&service, "BNK1", 70000, &["INV/0001"]).await?;
    let p2 = StandardLedger::pay(&service, "BNK1", 30000, &["INV/0001"]).await?;
    assert_eq!(service.allocations("INV/0001").await?.len(), 2);

    let request = ReversalRequest::new(vec![invoice.id])
        .with_date(parse_date("2024-02-01"))
        .with_reason("wrong customer");
    let summary = service.reverse(&request).await?;

    // One credit note, posted and linked back to the invoice
    let credit_notes = service.list_moves(Some(MoveType::OutRefund)).await?;
    assert_eq!(credit_notes.len(), 1);
    let credit_note = &credit_notes[0];
    assert_eq!(credit_note.name, "CN/0001");
    assert_eq!(credit_note.state, MoveState::Posted);
    assert_eq!(credit_note.reversed_entry_id, Some(invoice.id));
    assert_eq!(credit_note.date, parse_date("2024-02-01"));
    assert_eq!(
        credit_note.reference.as_deref(),
        Some("Reversal of: INV/0001, wrong customer")
    );
    assert_eq!(summary.outcome, WizardOutcome::OpenCreditNotes(vec![credit_note.id]));

    // The invoice is settled by the credit note alone
    let doc = service.get_document("INV/0001").await?;
    let receivable: Vec<_> = doc.lines.iter().filter(|l| l.is_receivable()).collect();
    assert!(receivable.iter().all(|l| l.reconciled && l.residual == 0));
    assert_eq!(doc.partials.len(), 1);
    assert_eq!(doc.partials[0].amount, 100000);
    assert!(service.allocations("INV/0001").await?.is_empty());

    // Two refunds offsetting the original payments
    let payments = service.list_payments().await?;
    let refunds: Vec<_> = payments
        .iter()
        .filter(|p| p.payment_type == PaymentType::Outbound)
        .collect();
    assert_eq!(refunds.len(), 2);
    let refund_p1 = refunds
        .iter()
        .find(|r| r.reverses == Some(p1.payment.id))
        .expect("refund for first payment");
    let refund_p2 = refunds
        .iter()
        .find(|r| r.reverses == Some(p2.payment.id))
        .expect("refund for second payment");
    assert_eq!(refund_p1.amount, 70000);
    assert_eq!(refund_p2.amount, 30000);
    assert_eq!(refund_p1.source_invoice_id, Some(invoice.id));
    assert_eq!(refund_p1.journal_id, p1.payment.journal_id);
    assert_eq!(refund_p1.partner_id, p1.payment.partner_id);
    assert_eq!(refund_p1.date, parse_date("2024-02-01"));
    assert!(
        refund_p1
            .reference
            .as_deref()
            .is_some_and(|r| r.contains("CN/0001") && r.contains("INV/0001"))
    );

    // Original payments are closed again against their refunds
    for original in [&p1.entry.name, &p2.entry.name] {
        let doc = service.get_document(original).await?;
        let receivable = doc.lines.iter().find(|l| l.is_receivable()).unwrap();
        assert_eq!(receivable.residual, 0);
        assert!(receivable.reconciled);
    }

    // Identical audit entries on the invoice and the credit note
    let invoice_log = service.activity_log("INV/0001").await?;
    let credit_note_log = service.activity_log("CN/0001").await?;
    assert_eq!(invoice_log.len(), 1);
    assert_eq!(credit_note_log.len(), 1);
    assert_eq!(invoice_log[0].body, credit_note_log[0].body);
    assert_eq!(invoice_log[0].subject, "Credit note and payment reversal executed");

    let body = &invoice_log[0].body;
    assert!(body.contains("Source invoice: INV/0001"));
    assert!(body.contains("  - CN/0001"));
    assert!(body.contains("Inbound payment PAY/0001"));
    assert!(body.contains("Inbound payment PAY/0002"));
    assert!(body.contains("Applied 700.00 EUR"));
    assert!(body.contains("Applied 300.00 EUR"));
    assert!(body.contains("Offsets PAY/0001 | Amount 700.00 EUR | Journal Bank"));
    assert!(body.contains("Offsets PAY/0002 | Amount 300.00 EUR | Journal Bank"));

    let entry = invoice_log[0].entry()?;
    assert_eq!(entry.kind, AuditKind::Executed);
    assert_eq!(entry.allocations.len(), 2);
    assert_eq!(entry.reversals.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_missing_outbound_method_rolls_back_everything() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 50000).await?;
    StandardLedger::pay(&service, "CSH1", 50000, &["INV/0001"]).await?;
    let before = service.ledger_stats().await?;

    let result = service.reverse(&ReversalRequest::new(vec![invoice.id])).await;
    match result {
        Err(AppError::MissingOutboundMethod {
            payment, journal, ..
        }) => {
            assert_eq!(payment, "PAY/0001");
            assert_eq!(journal, "Cash");
        }
        other => panic!("expected MissingOutboundMethod, got {:?}", other.map(|_| ())),
    }

    // No credit note, no unlink, no payment, no message
    assert_eq!(service.ledger_stats().await?, before);
    assert!(service.list_moves(Some(MoveType::OutRefund)).await?.is_empty());
    assert_eq!(service.allocations("INV/0001").await?.len(), 1);
    assert!(service.activity_log("INV/0001").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unlink_is_scoped_to_selected_invoice() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let first = StandardLedger::invoice(&service, 50000).await?;
    StandardLedger::invoice(&service, 50000).await?;
    let payment = StandardLedger::pay(&service, "BNK1", 100000, &["INV/0001", "INV/0002"]).await?;
    assert_eq!(payment.partials.len(), 2);

    let summary = service.reverse(&ReversalRequest::new(vec![first.id])).await?;
    assert_eq!(summary.refund_count(), 1);
    assert_eq!(summary.invoices[0].refunds[0].refund.amount, 50000);

    // The other invoice keeps its match
    let remaining = service.allocations("INV/0002").await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].amount, 50000);
    assert_eq!(remaining[0].payment.id, payment.payment.id);

    // The payment line is closed by the remaining match plus the refund
    let doc = service.get_document(&payment.entry.name).await?;
    let receivable = doc.lines.iter().find(|l| l.is_receivable()).unwrap();
    assert_eq!(receivable.residual, 0);
    assert_eq!(doc.partials.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_installments_are_refunded_as_one_sum() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice =
        StandardLedger::invoice_with_installments(&service, 100000, vec![40000, 60000]).await?;
    let payment = StandardLedger::pay(&service, "BNK1", 100000, &["INV/0001"]).await?;
    assert_eq!(payment.partials.len(), 2);

    let summary = service.reverse(&ReversalRequest::new(vec![invoice.id])).await?;
    let reversal = &summary.invoices[0];
    assert_eq!(reversal.allocations.len(), 2);
    assert_eq!(reversal.refunds.len(), 1);
    assert_eq!(reversal.refunds[0].refund.amount, 100000);
    assert_eq!(reversal.entry.allocations.len(), 2);
    assert_eq!(reversal.entry.reversals.len(), 1);

    // Both installments are settled by the credit note
    let doc = service.get_document("INV/0001").await?;
    assert!(
        doc.lines
            .iter()
            .filter(|l| l.is_receivable())
            .all(|l| l.residual == 0)
    );

    Ok(())
}

#[tokio::test]
async fn test_invoice_without_payments_only_gets_credit_note() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 25000).await?;
    let summary = service.reverse(&ReversalRequest::new(vec![invoice.id])).await?;

    assert_eq!(summary.credit_note_ids().len(), 1);
    assert_eq!(summary.refund_count(), 0);
    assert!(service.list_payments().await?.is_empty());

    let log = service.activity_log("INV/0001").await?;
    assert_eq!(log.len(), 1);
    assert!(log[0].body.contains("(no customer payments found)"));
    assert!(log[0].body.contains("(no reversals created)"));
    assert!(log[0].body.contains("  - CN/0001"));

    Ok(())
}

#[tokio::test]
async fn test_validation_errors() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let result = service.reverse(&ReversalRequest::new(Vec::new())).await;
    assert!(matches!(result, Err(AppError::NoInvoiceSelected)));

    let result = service.reverse(&ReversalRequest::new(vec![Uuid::new_v4()])).await;
    assert!(matches!(result, Err(AppError::MoveNotFound(_))));

    let invoice = StandardLedger::invoice(&service, 10000).await?;
    let payment = StandardLedger::pay(&service, "BNK1", 10000, &["INV/0001"]).await?;

    // A payment entry is not a customer invoice
    let result = service
        .reverse(&ReversalRequest::new(vec![payment.entry.id]))
        .await;
    assert!(matches!(result, Err(AppError::NotPostedCustomerInvoice(name)) if name == "PAY/0001"));

    // Nor is a credit note
    service.reverse(&ReversalRequest::new(vec![invoice.id])).await?;
    let credit_note = service.get_move("CN/0001").await?;
    let result = service
        .reverse(&ReversalRequest::new(vec![credit_note.id]))
        .await;
    assert!(matches!(result, Err(AppError::NotPostedCustomerInvoice(_))));

    // A rejected selection as a whole leaves the valid invoice alone
    let second = StandardLedger::invoice(&service, 10000).await?;
    let before = service.ledger_stats().await?;
    let result = service
        .reverse(&ReversalRequest::new(vec![second.id, credit_note.id]))
        .await;
    assert!(result.is_err());
    assert_eq!(service.ledger_stats().await?, before);

    Ok(())
}

#[tokio::test]
async fn test_reverse_moves_action_posts_draft_credit_notes() -> Result<()> {
    let config = WizardConfig::default().with_reversal_action(ReversalAction::ReverseMoves);
    let (service, _temp) = test_service_with(config).await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 40000).await?;
    StandardLedger::pay(&service, "BNK1", 40000, &["INV/0001"]).await?;

    let summary = service.reverse(&ReversalRequest::new(vec![invoice.id])).await?;
    assert_eq!(summary.refund_count(), 1);

    let credit_note = service.get_move("CN/0001").await?;
    assert_eq!(credit_note.state, MoveState::Posted);

    let doc = service.get_document("CN/0001").await?;
    let receivable = doc.lines.iter().find(|l| l.is_receivable()).unwrap();
    assert_eq!(receivable.residual, 0);

    Ok(())
}

#[tokio::test]
async fn test_second_reversal_ignores_existing_credit_notes() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 30000).await?;
    StandardLedger::pay(&service, "BNK1", 30000, &["INV/0001"]).await?;

    service.reverse(&ReversalRequest::new(vec![invoice.id])).await?;
    let summary = service.reverse(&ReversalRequest::new(vec![invoice.id])).await?;

    // Only the new credit note is reported, and the settled invoice has no
    // payments left to refund
    let second = service.get_move("CN/0002").await?;
    assert_eq!(summary.outcome, WizardOutcome::OpenCreditNotes(vec![second.id]));
    assert_eq!(summary.refund_count(), 0);
    assert_eq!(summary.invoices[0].entry.credit_notes, vec!["CN/0002".to_string()]);

    let refunds = service
        .list_payments()
        .await?
        .into_iter()
        .filter(|p| p.is_reversal())
        .count();
    assert_eq!(refunds, 1);

    Ok(())
}
