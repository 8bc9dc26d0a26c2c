use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, MoveId, PartialId, format_amount};

pub type MessageId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// The wizard unlinked, refunded and reconciled
    Executed,
    /// Read-only summary of the current state
    Report,
}

impl AuditKind {
    pub fn subject(&self) -> &'static str {
        match self {
            AuditKind::Executed => "Credit note and payment reversal executed",
            AuditKind::Report => "Credit note and payment reversal report",
        }
    }
}

/// A payment that was matched against the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub payment: String,
    pub payment_move: String,
    pub journal: String,
    pub amount: Cents,
    pub partial_id: PartialId,
}

/// An outbound payment offsetting an inbound one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalEntry {
    pub refund_payment: String,
    pub refund_move: String,
    pub original_payment: String,
    pub amount: Cents,
    pub journal: String,
}

/// What gets written to the activity log of an invoice and its credit notes.
/// Rendering is deterministic: the same entry always gives the same body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub invoice: String,
    pub currency: String,
    pub credit_notes: Vec<String>,
    pub allocations: Vec<AllocationEntry>,
    pub reversals: Vec<ReversalEntry>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, invoice: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            kind,
            invoice: invoice.into(),
            currency: currency.into(),
            credit_notes: Vec::new(),
            allocations: Vec::new(),
            reversals: Vec::new(),
        }
    }

    pub fn subject(&self) -> &'static str {
        self.kind.subject()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(self.subject());
        out.push('\n');
        out.push_str(&format!("Source invoice: {}\n", self.invoice));

        out.push_str("Credit notes:\n");
        if self.credit_notes.is_empty() {
            out.push_str("  - (no credit notes found)\n");
        }
        for name in &self.credit_notes {
            out.push_str(&format!("  - {}\n", name));
        }

        match self.kind {
            AuditKind::Executed => out.push_str(
                "Payments unlinked from the invoice (partial reconciliations removed):\n",
            ),
            AuditKind::Report => out.push_str("Payments currently applied to the invoice:\n"),
        }
        if self.allocations.is_empty() {
            out.push_str("  - (no customer payments found)\n");
        }
        for a in &self.allocations {
            out.push_str(&format!(
                "  - Inbound payment {} | Entry {} | Journal {} | Applied {} | Partial {}\n",
                a.payment,
                a.payment_move,
                a.journal,
                format_amount(a.amount, &self.currency),
                a.partial_id
            ));
        }

        out.push_str("Reversals reconciled against the original payment:\n");
        if self.reversals.is_empty() {
            out.push_str("  - (no reversals created)\n");
        }
        for r in &self.reversals {
            out.push_str(&format!(
                "  - Outbound payment {} | Entry {} | Offsets {} | Amount {} | Journal {}\n",
                r.refund_payment,
                r.refund_move,
                r.original_payment,
                format_amount(r.amount, &self.currency),
                r.journal
            ));
        }

        out
    }
}

/// A note in the activity log of a move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub id: MessageId,
    /// Monotonically increasing, assigned by the repository
    pub sequence: i64,
    pub move_id: MoveId,
    pub subject: String,
    pub body: String,
    /// The structured entry the body was rendered from, as JSON
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl LogMessage {
    pub fn from_entry(move_id: MoveId, entry: &AuditEntry) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            sequence: 0,
            move_id,
            subject: entry.subject().to_string(),
            body: entry.render(),
            payload: serde_json::to_string(entry)?,
            created_at: Utc::now(),
        })
    }

    pub fn entry(&self) -> Result<AuditEntry, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}
