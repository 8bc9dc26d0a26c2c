use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::domain::{
    Allocation, AllocationEntry, AuditEntry, AuditKind, LogMessage, Move, MoveId, MoveState,
    Payment, RefundGroup, ReversalEntry, group_by_payment,
};
use crate::storage::Repository;

use super::allocations::collect_allocations;
use super::generator::generate_credit_notes;
use super::reconcile::{reconcile_by_account, reconcile_lines};
use super::{AppError, WizardConfig};

/// Invoices to reverse, with the date and reason handed to the credit notes.
#[derive(Debug, Clone, Default)]
pub struct ReversalRequest {
    pub invoice_ids: Vec<MoveId>,
    /// Accounting date of credit notes and refunds; today when unset
    pub date: Option<NaiveDate>,
    pub reason: Option<String>,
}

impl ReversalRequest {
    pub fn new(invoice_ids: Vec<MoveId>) -> Self {
        Self {
            invoice_ids,
            date: None,
            reason: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalMode {
    /// Unlink, credit, refund and log
    Execute,
    /// Log what is currently in place without touching the ledger
    ReportOnly,
}

/// What the caller should show once the wizard is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    /// Open the credit notes that were just created
    OpenCreditNotes(Vec<MoveId>),
    /// Nothing new to show
    Close,
}

/// One outbound payment giving money back against an original payment.
#[derive(Debug, Clone)]
pub struct RefundRecord {
    pub refund: Payment,
    pub refund_move_name: String,
    pub original: Payment,
    pub journal_name: String,
}

/// Everything the wizard found or did for one invoice.
#[derive(Debug, Clone)]
pub struct InvoiceReversal {
    pub invoice: Move,
    pub allocations: Vec<Allocation>,
    pub credit_notes: Vec<Move>,
    pub refunds: Vec<RefundRecord>,
    pub entry: AuditEntry,
}

#[derive(Debug, Clone)]
pub struct ReversalSummary {
    pub mode: ReversalMode,
    pub outcome: WizardOutcome,
    pub invoices: Vec<InvoiceReversal>,
}

impl ReversalSummary {
    pub fn credit_note_ids(&self) -> Vec<MoveId> {
        self.invoices
            .iter()
            .flat_map(|r| r.credit_notes.iter().map(|m| m.id))
            .collect()
    }

    pub fn refund_count(&self) -> usize {
        self.invoices.iter().map(|r| r.refunds.len()).sum()
    }
}

struct InvoiceRun {
    invoice: Move,
    allocations: Vec<Allocation>,
    credit_notes: Vec<Move>,
    refunds: Vec<RefundRecord>,
}

/// Reverses customer invoices together with the payments applied to them.
///
/// A run executes on a single transaction: every step either lands with the
/// others or the ledger is left exactly as it was.
pub struct ReversalWizard<'a> {
    repo: &'a Repository,
    config: &'a WizardConfig,
}

impl<'a> ReversalWizard<'a> {
    pub fn new(repo: &'a Repository, config: &'a WizardConfig) -> Self {
        Self { repo, config }
    }

    pub async fn run(
        &self,
        request: &ReversalRequest,
        mode: ReversalMode,
    ) -> Result<ReversalSummary, AppError> {
        let mut tx = self.repo.begin().await?;

        let invoices = self.validate(&mut tx, request).await?;
        info!(invoices = invoices.len(), mode = ?mode, "reversal wizard started");

        let mut runs = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            let allocations = collect_allocations(self.repo, &mut tx, &invoice).await?;
            runs.push(InvoiceRun {
                invoice,
                allocations,
                credit_notes: Vec::new(),
                refunds: Vec::new(),
            });
        }

        let kind = match mode {
            ReversalMode::Execute => {
                let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
                self.unlink(&mut tx, &runs).await?;
                self.generate(&mut tx, &mut runs, date, request.reason.as_deref())
                    .await?;
                self.post_and_reconcile(&mut tx, &mut runs).await?;
                self.refund(&mut tx, &mut runs, date).await?;
                AuditKind::Executed
            }
            ReversalMode::ReportOnly => {
                self.load_existing(&mut tx, &mut runs).await?;
                AuditKind::Report
            }
        };

        let invoices = self.log(&mut tx, kind, runs).await?;
        Repository::commit(tx).await?;

        let outcome = match mode {
            ReversalMode::Execute => WizardOutcome::OpenCreditNotes(
                invoices
                    .iter()
                    .flat_map(|r| r.credit_notes.iter().map(|m| m.id))
                    .collect(),
            ),
            ReversalMode::ReportOnly => WizardOutcome::Close,
        };
        info!(invoices = invoices.len(), mode = ?mode, "reversal wizard finished");

        Ok(ReversalSummary {
            mode,
            outcome,
            invoices,
        })
    }

    async fn validate(
        &self,
        conn: &mut SqliteConnection,
        request: &ReversalRequest,
    ) -> Result<Vec<Move>, AppError> {
        if request.invoice_ids.is_empty() {
            return Err(AppError::NoInvoiceSelected);
        }

        let mut seen = HashSet::new();
        let mut invoices = Vec::with_capacity(request.invoice_ids.len());
        for id in &request.invoice_ids {
            if !seen.insert(*id) {
                continue;
            }
            let invoice = self
                .repo
                .get_move(conn, *id)
                .await?
                .ok_or_else(|| AppError::MoveNotFound(id.to_string()))?;
            if !invoice.is_posted_customer_invoice() {
                return Err(AppError::NotPostedCustomerInvoice(invoice.name));
            }
            invoices.push(invoice);
        }
        Ok(invoices)
    }

    async fn unlink(&self, conn: &mut SqliteConnection, runs: &[InvoiceRun]) -> Result<(), AppError> {
        for run in runs {
            for allocation in &run.allocations {
                self.repo.delete_partial(conn, allocation.partial_id).await?;
                debug!(
                    invoice = %run.invoice.name,
                    payment = %allocation.payment.name,
                    amount = allocation.amount,
                    "unlinked payment"
                );
            }
        }
        Ok(())
    }

    /// Credit notes are discovered through their back-reference rather than
    /// taken from the generator, so notes that existed before this run are
    /// excluded explicitly.
    async fn generate(
        &self,
        conn: &mut SqliteConnection,
        runs: &mut [InvoiceRun],
        date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<(), AppError> {
        let invoice_ids: Vec<MoveId> = runs.iter().map(|r| r.invoice.id).collect();
        let existing: HashSet<MoveId> = self
            .repo
            .moves_reversing(conn, &invoice_ids)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        let invoices: Vec<Move> = runs.iter().map(|r| r.invoice.clone()).collect();
        generate_credit_notes(
            self.repo,
            conn,
            &invoices,
            self.config.reversal_action,
            date,
            reason,
        )
        .await?;

        let created: Vec<Move> = self
            .repo
            .moves_reversing(conn, &invoice_ids)
            .await?
            .into_iter()
            .filter(|m| !existing.contains(&m.id))
            .collect();

        for run in runs.iter_mut() {
            run.credit_notes = created
                .iter()
                .filter(|m| m.reversed_entry_id == Some(run.invoice.id))
                .cloned()
                .collect();
            if run.credit_notes.is_empty() {
                warn!(invoice = %run.invoice.name, "no credit note found after generation");
            }
        }
        Ok(())
    }

    async fn post_and_reconcile(
        &self,
        conn: &mut SqliteConnection,
        runs: &mut [InvoiceRun],
    ) -> Result<(), AppError> {
        for run in runs.iter_mut() {
            for credit_note in run.credit_notes.iter_mut() {
                if !credit_note.is_posted() {
                    self.repo.post_move(conn, credit_note.id).await?;
                    credit_note.state = MoveState::Posted;
                    debug!(credit_note = %credit_note.name, "posted credit note");
                }

                let mut lines = self.repo.receivable_lines(conn, run.invoice.id).await?;
                lines.extend(self.repo.receivable_lines(conn, credit_note.id).await?);
                let partials = reconcile_by_account(self.repo, conn, &lines).await?;
                info!(
                    invoice = %run.invoice.name,
                    credit_note = %credit_note.name,
                    partials = partials.len(),
                    "reconciled credit note with invoice"
                );
            }
        }
        Ok(())
    }

    async fn refund(
        &self,
        conn: &mut SqliteConnection,
        runs: &mut [InvoiceRun],
        date: NaiveDate,
    ) -> Result<(), AppError> {
        for run in runs.iter_mut() {
            if run.allocations.is_empty() {
                continue;
            }
            let credit_note_names = run
                .credit_notes
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            for group in group_by_payment(&run.allocations) {
                let record = self
                    .refund_group(conn, &run.invoice, &group, &credit_note_names, date)
                    .await?;
                run.refunds.push(record);
            }
        }
        Ok(())
    }

    async fn refund_group(
        &self,
        conn: &mut SqliteConnection,
        invoice: &Move,
        group: &RefundGroup,
        credit_note_names: &str,
        date: NaiveDate,
    ) -> Result<RefundRecord, AppError> {
        let original = &group.payment;
        let method_line = match self.repo.outbound_method_line_for(conn, original).await? {
            Some(line) => line,
            None => {
                let method = self.inbound_method_name(conn, original).await?;
                return Err(AppError::MissingOutboundMethod {
                    payment: original.name.clone(),
                    journal: group.journal_name.clone(),
                    method,
                });
            }
        };

        let account = self
            .repo
            .get_account(conn, group.account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(group.account_id.to_string()))?;
        let original_move_id = original
            .move_id
            .ok_or_else(|| AppError::MoveNotFound(format!("entry of payment {}", original.name)))?;

        let mut refund = original
            .create_refund(group.amount, method_line.id, date, invoice.id)
            .with_reference(format!(
                "Reversal {} / CN {} / Invoice {}",
                original.name, credit_note_names, invoice.name
            ));
        let refund_move = self.repo.create_payment(conn, &mut refund, &account).await?;

        let mut lines = self
            .repo
            .open_lines_on_account(conn, original_move_id, account.id)
            .await?;
        lines.extend(
            self.repo
                .open_lines_on_account(conn, refund_move.id, account.id)
                .await?,
        );
        reconcile_lines(self.repo, conn, &lines).await?;

        info!(
            invoice = %invoice.name,
            original = %original.name,
            refund = %refund.name,
            amount = group.amount,
            "refunded payment"
        );

        Ok(RefundRecord {
            refund,
            refund_move_name: refund_move.name,
            original: original.clone(),
            journal_name: group.journal_name.clone(),
        })
    }

    async fn inbound_method_name(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
    ) -> Result<String, AppError> {
        let Some(line_id) = payment.payment_method_line_id else {
            return Ok("no payment method".into());
        };
        let Some(line) = self.repo.get_payment_method_line(conn, line_id).await? else {
            return Ok("no payment method".into());
        };
        Ok(self
            .repo
            .get_payment_method(conn, line.payment_method_id)
            .await?
            .map(|m| m.name)
            .unwrap_or(line.name))
    }

    /// Report mode: pick up the credit notes and refunds earlier runs created.
    async fn load_existing(
        &self,
        conn: &mut SqliteConnection,
        runs: &mut [InvoiceRun],
    ) -> Result<(), AppError> {
        let invoice_ids: Vec<MoveId> = runs.iter().map(|r| r.invoice.id).collect();
        let credit_notes = self.repo.moves_reversing(conn, &invoice_ids).await?;

        for run in runs.iter_mut() {
            run.credit_notes = credit_notes
                .iter()
                .filter(|m| m.reversed_entry_id == Some(run.invoice.id))
                .cloned()
                .collect();

            for refund in self.repo.reversals_for_invoice(conn, run.invoice.id).await? {
                let Some(original_id) = refund.reverses else {
                    continue;
                };
                let original = self
                    .repo
                    .get_payment(conn, original_id)
                    .await?
                    .ok_or_else(|| AppError::PaymentNotFound(original_id.to_string()))?;
                let refund_move_name = match refund.move_id {
                    Some(id) => self
                        .repo
                        .get_move(conn, id)
                        .await?
                        .map(|m| m.name)
                        .unwrap_or_default(),
                    None => String::new(),
                };
                let journal_name = self
                    .repo
                    .get_journal(conn, refund.journal_id)
                    .await?
                    .map(|j| j.name)
                    .unwrap_or_default();
                run.refunds.push(RefundRecord {
                    refund,
                    refund_move_name,
                    original,
                    journal_name,
                });
            }
        }
        Ok(())
    }

    /// Append the same entry to the invoice and to each of its credit notes.
    async fn log(
        &self,
        conn: &mut SqliteConnection,
        kind: AuditKind,
        runs: Vec<InvoiceRun>,
    ) -> Result<Vec<InvoiceReversal>, AppError> {
        let mut reversals = Vec::with_capacity(runs.len());
        for run in runs {
            let entry = audit_entry(kind, &run);

            let mut message = LogMessage::from_entry(run.invoice.id, &entry)?;
            self.repo.append_message(conn, &mut message).await?;
            for credit_note in &run.credit_notes {
                let mut message = LogMessage::from_entry(credit_note.id, &entry)?;
                self.repo.append_message(conn, &mut message).await?;
            }

            reversals.push(InvoiceReversal {
                invoice: run.invoice,
                allocations: run.allocations,
                credit_notes: run.credit_notes,
                refunds: run.refunds,
                entry,
            });
        }
        Ok(reversals)
    }
}

fn audit_entry(kind: AuditKind, run: &InvoiceRun) -> AuditEntry {
    let mut entry = AuditEntry::new(kind, run.invoice.name.clone(), run.invoice.currency.clone());
    entry.credit_notes = run.credit_notes.iter().map(|m| m.name.clone()).collect();
    entry.allocations = run
        .allocations
        .iter()
        .map(|a| AllocationEntry {
            payment: a.payment.name.clone(),
            payment_move: a.payment_move_name.clone(),
            journal: a.journal_name.clone(),
            amount: a.amount,
            partial_id: a.partial_id,
        })
        .collect();
    entry.reversals = run
        .refunds
        .iter()
        .map(|r| ReversalEntry {
            refund_payment: r.refund.name.clone(),
            refund_move: r.refund_move_name.clone(),
            original_payment: r.original.name.clone(),
            amount: r.refund.amount,
            journal: r.journal_name.clone(),
        })
        .collect();
    entry
}
