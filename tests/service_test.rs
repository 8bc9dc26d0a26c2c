mod common;

use anyhow::Result;
use common::{StandardLedger, parse_date, test_service};
use storno::application::{AppError, InvoiceItem, NewInvoice, NewPayment};
use storno::domain::{MoveState, MoveType, PaymentType};

fn invoice_input(items: Vec<InvoiceItem>, installments: Vec<i64>) -> NewInvoice {
    NewInvoice {
        partner: "Acme".into(),
        journal: "INV".into(),
        receivable_account: "1100".into(),
        date: parse_date("2024-01-10"),
        items,
        installments,
        reference: Some("PO-42".into()),
    }
}

#[tokio::test]
async fn test_invoices_are_posted_with_sequential_names() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let (first, lines) = service
        .create_invoice(invoice_input(
            vec![InvoiceItem::new("Design", 30000), InvoiceItem::new("Build", 70000)],
            vec![40000, 60000],
        ))
        .await?;
    let (second, _) = service
        .create_invoice(invoice_input(vec![InvoiceItem::new("Support", 5000)], Vec::new()))
        .await?;

    assert_eq!(first.name, "INV/0001");
    assert_eq!(second.name, "INV/0002");
    assert_eq!(first.move_type, MoveType::OutInvoice);
    assert_eq!(first.state, MoveState::Posted);
    assert_eq!(first.currency, "EUR");
    assert_eq!(first.reference.as_deref(), Some("PO-42"));

    let receivable: Vec<_> = lines.iter().filter(|l| l.is_receivable()).collect();
    assert_eq!(receivable.len(), 2);
    assert_eq!(receivable[0].label, "Installment 1/2");
    assert_eq!(receivable[1].residual, 60000);

    let stored = service.get_document("INV/0001").await?;
    assert_eq!(stored.lines.len(), 4);
    assert!(stored.partials.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_invoice_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let result = service
        .create_invoice(invoice_input(vec![InvoiceItem::new("Design", 30000)], vec![10000, 10000]))
        .await;
    assert!(matches!(
        result,
        Err(AppError::UnbalancedMove {
            debit: 20000,
            credit: 30000
        })
    ));

    let result = service.create_invoice(invoice_input(Vec::new(), Vec::new())).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));

    let mut input = invoice_input(vec![InvoiceItem::new("Design", 30000)], Vec::new());
    input.receivable_account = "4000".into();
    let result = service.create_invoice(input).await;
    assert!(matches!(result, Err(AppError::AccountNotFound(_))));

    // Nothing was written, so the next invoice still gets the first name
    let (invoice, _) = service
        .create_invoice(invoice_input(vec![InvoiceItem::new("Design", 30000)], Vec::new()))
        .await?;
    assert_eq!(invoice.name, "INV/0001");

    Ok(())
}

#[tokio::test]
async fn test_payment_registration() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;
    StandardLedger::invoice(&service, 50000).await?;

    let result = StandardLedger::pay(&service, "BNK1", 20000, &["INV/0001"]).await?;
    assert_eq!(result.payment.name, "PAY/0001");
    assert_eq!(result.entry.name, "PAY/0001");
    assert_eq!(result.entry.payment_id, Some(result.payment.id));
    assert_eq!(result.payment.move_id, Some(result.entry.id));
    assert_eq!(result.partials.len(), 1);
    assert_eq!(result.partials[0].amount, 20000);

    let stored = service.get_payment("PAY/0001").await?;
    assert_eq!(stored.payment_type, PaymentType::Inbound);
    assert!(stored.payment_method_line_id.is_some());

    let invoice = service.get_document("INV/0001").await?;
    let receivable = invoice.lines.iter().find(|l| l.is_receivable()).unwrap();
    assert_eq!(receivable.residual, 30000);

    Ok(())
}

#[tokio::test]
async fn test_payment_errors() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;
    StandardLedger::invoice(&service, 50000).await?;

    let input = NewPayment::customer_inbound("Acme", "INV", 10000, parse_date("2024-01-20"))
        .applied_to("INV/0001");
    let result = service.register_payment(input).await;
    assert!(matches!(result, Err(AppError::JournalRejectsPayments(_))));

    service.create_payment_method("check", "Checks").await?;
    let input = NewPayment::customer_inbound("Acme", "BNK1", 10000, parse_date("2024-01-20"))
        .with_method("Checks")
        .applied_to("INV/0001");
    let result = service.register_payment(input).await;
    assert!(matches!(result, Err(AppError::PaymentMethodNotFound(_))));

    let input = NewPayment::customer_inbound("Nobody", "BNK1", 10000, parse_date("2024-01-20"));
    let result = service.register_payment(input).await;
    assert!(matches!(result, Err(AppError::PartnerNotFound(_))));

    let result = service.create_partner("Acme").await;
    assert!(matches!(result, Err(AppError::PartnerAlreadyExists(_))));

    assert!(service.list_payments().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_open_amount_counts_receivables_only() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    StandardLedger::invoice(&service, 50000).await?;
    assert_eq!(service.ledger_stats().await?.open_amount, 50000);

    StandardLedger::pay(&service, "BNK1", 20000, &["INV/0001"]).await?;
    assert_eq!(service.ledger_stats().await?.open_amount, 30000);

    Ok(())
}
