use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::LedgerService;
use crate::domain::{Account, Journal, LogMessage, Move, MoveId, Partner, Payment, PartnerId};

/// Database snapshot for a full JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub partners: Vec<Partner>,
    pub accounts: Vec<Account>,
    pub journals: Vec<Journal>,
    pub moves: Vec<Move>,
    pub payments: Vec<Payment>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export moves (invoices, credit notes, entries) to CSV format
    pub async fn export_moves_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let moves = self.service.list_moves(None).await?;
        let partners = self.partner_names().await?;
        let names: HashMap<MoveId, String> =
            moves.iter().map(|m| (m.id, m.name.clone())).collect();
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "name",
            "type",
            "state",
            "date",
            "partner",
            "currency",
            "reversed_entry",
            "reference",
        ])?;

        let mut count = 0;
        for entry in &moves {
            csv_writer.write_record([
                entry.name.clone(),
                entry.move_type.as_str().to_string(),
                entry.state.as_str().to_string(),
                entry.date.to_string(),
                entry
                    .partner_id
                    .and_then(|id| partners.get(&id).cloned())
                    .unwrap_or_default(),
                entry.currency.clone(),
                entry
                    .reversed_entry_id
                    .and_then(|id| names.get(&id).cloned())
                    .unwrap_or_default(),
                entry.reference.clone().unwrap_or_default(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export payments to CSV format. Refunds name the payment they reverse.
    pub async fn export_payments_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let payments = self.service.list_payments().await?;
        let partners = self.partner_names().await?;
        let names: HashMap<_, String> = payments.iter().map(|p| (p.id, p.name.clone())).collect();
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "name",
            "type",
            "partner_type",
            "partner",
            "date",
            "amount_cents",
            "currency",
            "state",
            "reverses",
            "reference",
        ])?;

        let mut count = 0;
        for payment in &payments {
            csv_writer.write_record([
                payment.name.clone(),
                payment.payment_type.as_str().to_string(),
                payment.partner_type.as_str().to_string(),
                partners.get(&payment.partner_id).cloned().unwrap_or_default(),
                payment.date.to_string(),
                payment.amount.to_string(),
                payment.currency.clone(),
                payment.state.as_str().to_string(),
                payment
                    .reverses
                    .and_then(|id| names.get(&id).cloned())
                    .unwrap_or_default(),
                payment.reference.clone().unwrap_or_default(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the payments currently applied to an invoice to CSV format
    pub async fn export_allocations_csv<W: Write>(&self, invoice: &str, writer: W) -> Result<usize> {
        let allocations = self.service.allocations(invoice).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["invoice", "payment", "payment_move", "journal", "amount_cents"])?;

        for allocation in &allocations {
            csv_writer.write_record([
                invoice,
                &allocation.payment.name,
                &allocation.payment_move_name,
                &allocation.journal_name,
                &allocation.amount.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(allocations.len())
    }

    /// Export the activity log of a document as JSON
    pub async fn export_activity_log_json<W: Write>(
        &self,
        document: &str,
        mut writer: W,
    ) -> Result<Vec<LogMessage>> {
        let messages = self.service.activity_log(document).await?;
        let json = serde_json::to_string_pretty(&messages)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;
        Ok(messages)
    }

    /// Export the whole ledger as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            partners: self.service.list_partners().await?,
            accounts: self.service.list_accounts().await?,
            journals: self.service.list_journals().await?,
            moves: self.service.list_moves(None).await?,
            payments: self.service.list_payments().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }

    async fn partner_names(&self) -> Result<HashMap<PartnerId, String>> {
        Ok(self
            .service
            .list_partners()
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect())
    }
}
