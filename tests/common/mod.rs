// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use storno::application::{
    InvoiceItem, LedgerService, NewInvoice, NewPayment, PaymentResult, WizardConfig,
};
use storno::domain::{AccountType, JournalType, Move, PaymentType};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with(WizardConfig::default()).await
}

pub async fn test_service_with(config: WizardConfig) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap(), config).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: a small chart of accounts with a sales journal, a bank
/// journal refunding by the manual method, and a cash journal that can only
/// receive.
pub struct StandardLedger;

impl StandardLedger {
    pub async fn create(service: &LedgerService) -> Result<()> {
        service
            .create_account("1100", "Receivable", AccountType::AssetReceivable)
            .await?;
        service
            .create_account("1200", "Receivable (export)", AccountType::AssetReceivable)
            .await?;
        service
            .create_account("1000", "Bank", AccountType::AssetCash)
            .await?;
        service
            .create_account("1010", "Cash", AccountType::AssetCash)
            .await?;
        service
            .create_account("4000", "Sales", AccountType::Income)
            .await?;

        service
            .create_journal("INV", "Customer Invoices", JournalType::Sale, "4000")
            .await?;
        service
            .create_journal("BNK1", "Bank", JournalType::Bank, "1000")
            .await?;
        service
            .create_journal("CSH1", "Cash", JournalType::Cash, "1010")
            .await?;

        service.create_payment_method("manual", "Manual").await?;
        service
            .add_payment_method_line("BNK1", "Manual", PaymentType::Inbound)
            .await?;
        service
            .add_payment_method_line("BNK1", "Manual", PaymentType::Outbound)
            .await?;
        service
            .add_payment_method_line("CSH1", "Manual", PaymentType::Inbound)
            .await?;

        service.create_partner("Acme").await?;
        service.create_partner("Globex").await?;
        Ok(())
    }

    /// Posted invoice for Acme on account 1100.
    pub async fn invoice(service: &LedgerService, amount: i64) -> Result<Move> {
        Self::invoice_with_installments(service, amount, Vec::new()).await
    }

    pub async fn invoice_with_installments(
        service: &LedgerService,
        amount: i64,
        installments: Vec<i64>,
    ) -> Result<Move> {
        let (invoice, _) = service
            .create_invoice(NewInvoice {
                partner: "Acme".into(),
                journal: "INV".into(),
                receivable_account: "1100".into(),
                date: parse_date("2024-01-10"),
                items: vec![InvoiceItem::new("Consulting", amount)],
                installments,
                reference: None,
            })
            .await?;
        Ok(invoice)
    }

    /// Inbound customer payment from Acme, applied to `invoices` in order.
    pub async fn pay(
        service: &LedgerService,
        journal: &str,
        amount: i64,
        invoices: &[&str],
    ) -> Result<PaymentResult> {
        let mut input = NewPayment::customer_inbound("Acme", journal, amount, parse_date("2024-01-20"))
            .with_method("Manual");
        for invoice in invoices {
            input = input.applied_to(*invoice);
        }
        Ok(service.register_payment(input).await?)
    }
}
