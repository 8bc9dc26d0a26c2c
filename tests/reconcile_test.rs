mod common;

use anyhow::Result;
use common::{StandardLedger, parse_date, test_service};
use storno::application::{AppError, EntryLine, NewPayment, ReversalRequest};

fn line(account: &str, debit: i64, credit: i64) -> EntryLine {
    EntryLine {
        account: account.into(),
        label: "Adjustment".into(),
        debit,
        credit,
    }
}

#[tokio::test]
async fn test_reconciliation_is_scoped_to_one_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    StandardLedger::invoice(&service, 50000).await?;

    // Credits on both receivable accounts; only 1100 meets the invoice
    let (entry, _) = service
        .create_entry(
            "BNK1",
            Some("Acme"),
            parse_date("2024-01-15"),
            &[
                line("1000", 50000, 0),
                line("1100", 0, 30000),
                line("1200", 0, 20000),
            ],
        )
        .await?;

    let partials = service.reconcile_documents("INV/0001", &entry.name).await?;
    assert_eq!(partials.len(), 1);
    assert_eq!(partials[0].amount, 30000);

    let invoice = service.get_document("INV/0001").await?;
    let receivable = invoice.lines.iter().find(|l| l.is_receivable()).unwrap();
    assert_eq!(receivable.residual, 20000);
    assert!(!receivable.reconciled);

    let doc = service.get_document(&entry.name).await?;
    let other = doc
        .lines
        .iter()
        .find(|l| l.credit == 20000)
        .expect("line on the second receivable account");
    assert_eq!(other.residual, -20000);
    assert!(!other.reconciled);

    Ok(())
}

#[tokio::test]
async fn test_payment_on_other_account_is_not_matched() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    StandardLedger::invoice(&service, 50000).await?;
    let mut input = NewPayment::customer_inbound("Acme", "BNK1", 50000, parse_date("2024-01-20"))
        .applied_to("INV/0001");
    input.account = Some("1200".into());
    let result = service.register_payment(input).await?;

    assert!(result.partials.is_empty());
    assert!(service.allocations("INV/0001").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unbalanced_entry_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let result = service
        .create_entry(
            "BNK1",
            None,
            parse_date("2024-01-15"),
            &[line("1000", 10000, 0), line("1100", 0, 9000)],
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::UnbalancedMove {
            debit: 10000,
            credit: 9000
        })
    ));

    Ok(())
}

#[tokio::test]
async fn test_income_lines_are_never_reconciled() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardLedger::create(&service).await?;

    let invoice = StandardLedger::invoice(&service, 100000).await?;
    let summary = service.reverse(&ReversalRequest::new(vec![invoice.id])).await?;
    assert_eq!(summary.credit_note_ids().len(), 1);

    // Receivables were matched by the reversal; only the Sales lines are still open
    let partials = service.reconcile_documents("INV/0001", "CN/0001").await?;
    assert!(partials.is_empty());

    for name in ["INV/0001", "CN/0001"] {
        let doc = service.get_document(name).await?;
        let income = doc
            .lines
            .iter()
            .find(|l| !l.is_receivable())
            .expect("sales line");
        assert_eq!(income.residual.abs(), 100000);
        assert!(!income.reconciled);
    }

    Ok(())
}
