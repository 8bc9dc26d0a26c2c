use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, AccountType, Cents, JournalId, PartnerId, PaymentId};

pub type MoveId = Uuid;
pub type LineId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Plain journal entry (payments, manual entries, statement lines)
    Entry,
    /// Customer invoice
    OutInvoice,
    /// Customer credit note
    OutRefund,
}

impl MoveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveType::Entry => "entry",
            MoveType::OutInvoice => "out_invoice",
            MoveType::OutRefund => "out_refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(MoveType::Entry),
            "out_invoice" => Some(MoveType::OutInvoice),
            "out_refund" => Some(MoveType::OutRefund),
            _ => None,
        }
    }
}

impl std::fmt::Display for MoveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveState {
    Draft,
    Posted,
    Cancel,
}

impl MoveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveState::Draft => "draft",
            MoveState::Posted => "posted",
            MoveState::Cancel => "cancel",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(MoveState::Draft),
            "posted" => Some(MoveState::Posted),
            "cancel" => Some(MoveState::Cancel),
            _ => None,
        }
    }
}

impl std::fmt::Display for MoveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A journal entry: an invoice, a credit note, or the entry behind a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Move {
    pub id: MoveId,
    pub name: String,
    pub move_type: MoveType,
    pub state: MoveState,
    pub partner_id: Option<PartnerId>,
    pub journal_id: JournalId,
    pub date: NaiveDate,
    pub currency: String,
    /// Set on credit notes: the invoice this document reverses
    pub reversed_entry_id: Option<MoveId>,
    /// Set on entries created by a payment
    pub payment_id: Option<PaymentId>,
    pub reference: Option<String>,
}

impl Move {
    /// Create a draft move. The name is assigned by the repository.
    pub fn new(
        move_type: MoveType,
        journal_id: JournalId,
        date: NaiveDate,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            move_type,
            state: MoveState::Draft,
            partner_id: None,
            journal_id,
            date,
            currency: currency.into(),
            reversed_entry_id: None,
            payment_id: None,
            reference: None,
        }
    }

    pub fn with_partner(mut self, partner_id: PartnerId) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn is_posted(&self) -> bool {
        self.state == MoveState::Posted
    }

    /// Posted customer invoices are the only documents the reversal wizard accepts.
    pub fn is_posted_customer_invoice(&self) -> bool {
        self.move_type == MoveType::OutInvoice && self.is_posted()
    }

    /// Build the draft credit note reversing this move. Lines come from
    /// [`MoveLine::reversed_for`].
    pub fn create_credit_note(&self, date: NaiveDate, reason: Option<&str>) -> Self {
        let reference = match reason {
            Some(reason) => format!("Reversal of: {}, {}", self.name, reason),
            None => format!("Reversal of: {}", self.name),
        };
        let mut credit_note = Move::new(
            MoveType::OutRefund,
            self.journal_id,
            date,
            self.currency.clone(),
        )
        .with_reference(reference);
        credit_note.partner_id = self.partner_id;
        credit_note.reversed_entry_id = Some(self.id);
        credit_note
    }
}

/// An atomic debit or credit on one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveLine {
    pub id: LineId,
    pub move_id: MoveId,
    pub account_id: AccountId,
    /// Classification of `account_id`, denormalized when lines are loaded
    pub account_type: AccountType,
    pub partner_id: Option<PartnerId>,
    pub label: String,
    pub debit: Cents,
    pub credit: Cents,
    /// Signed open amount: positive on debit lines, negative on credit lines
    pub residual: Cents,
    pub reconciled: bool,
}

impl MoveLine {
    fn new(
        move_id: MoveId,
        account_id: AccountId,
        account_type: AccountType,
        label: impl Into<String>,
        debit: Cents,
        credit: Cents,
    ) -> Self {
        assert!(debit >= 0 && credit >= 0, "Line amounts must not be negative");
        Self {
            id: Uuid::new_v4(),
            move_id,
            account_id,
            account_type,
            partner_id: None,
            label: label.into(),
            debit,
            credit,
            residual: debit - credit,
            reconciled: false,
        }
    }

    pub fn debit(
        move_id: MoveId,
        account_id: AccountId,
        account_type: AccountType,
        label: impl Into<String>,
        amount: Cents,
    ) -> Self {
        Self::new(move_id, account_id, account_type, label, amount, 0)
    }

    pub fn credit(
        move_id: MoveId,
        account_id: AccountId,
        account_type: AccountType,
        label: impl Into<String>,
        amount: Cents,
    ) -> Self {
        Self::new(move_id, account_id, account_type, label, 0, amount)
    }

    pub fn with_partner(mut self, partner_id: Option<PartnerId>) -> Self {
        self.partner_id = partner_id;
        self
    }

    pub fn is_receivable(&self) -> bool {
        self.account_type.is_receivable()
    }

    pub fn is_reconcilable(&self) -> bool {
        self.account_type.is_reconcilable()
    }

    /// A line can take part in a new reconciliation while it still has an open amount.
    pub fn is_open(&self) -> bool {
        !self.reconciled && self.residual != 0
    }

    /// Same account and amount with debit and credit swapped, for a credit note.
    pub fn reversed_for(&self, move_id: MoveId) -> Self {
        Self::new(
            move_id,
            self.account_id,
            self.account_type,
            self.label.clone(),
            self.credit,
            self.debit,
        )
        .with_partner(self.partner_id)
    }
}

/// Total debit and total credit of a set of lines.
pub fn totals(lines: &[MoveLine]) -> (Cents, Cents) {
    lines
        .iter()
        .fold((0, 0), |(d, c), line| (d + line.debit, c + line.credit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_credit_note_points_back_to_invoice() {
        let journal = Uuid::new_v4();
        let partner = Uuid::new_v4();
        let mut invoice =
            Move::new(MoveType::OutInvoice, journal, date(), "EUR").with_partner(partner);
        invoice.name = "INV/0001".into();

        let credit_note = invoice.create_credit_note(date(), Some("damaged goods"));

        assert_eq!(credit_note.move_type, MoveType::OutRefund);
        assert_eq!(credit_note.state, MoveState::Draft);
        assert_eq!(credit_note.reversed_entry_id, Some(invoice.id));
        assert_eq!(credit_note.partner_id, Some(partner));
        assert_eq!(
            credit_note.reference.as_deref(),
            Some("Reversal of: INV/0001, damaged goods")
        );
    }

    #[test]
    fn test_reversed_line_swaps_sides() {
        let receivable = Uuid::new_v4();
        let line = MoveLine::debit(
            Uuid::new_v4(),
            receivable,
            AccountType::AssetReceivable,
            "INV/0001",
            100000,
        );
        let reversed = line.reversed_for(Uuid::new_v4());

        assert_eq!(reversed.debit, 0);
        assert_eq!(reversed.credit, 100000);
        assert_eq!(reversed.residual, -100000);
        assert_eq!(reversed.account_id, receivable);
    }

    #[test]
    fn test_receivable_lines_filters_by_account_type() {
        let move_id = Uuid::new_v4();
        let lines = vec![
            MoveLine::debit(move_id, Uuid::new_v4(), AccountType::AssetReceivable, "due 1", 50000),
            MoveLine::debit(move_id, Uuid::new_v4(), AccountType::AssetReceivable, "due 2", 50000),
            MoveLine::credit(move_id, Uuid::new_v4(), AccountType::Income, "sale", 100000),
        ];

        assert_eq!(lines.iter().filter(|l| l.is_receivable()).count(), 2);
        assert_eq!(totals(&lines), (100000, 100000));
    }

    #[test]
    fn test_posted_customer_invoice_check() {
        let mut invoice = Move::new(MoveType::OutInvoice, Uuid::new_v4(), date(), "EUR");
        assert!(!invoice.is_posted_customer_invoice());
        invoice.state = MoveState::Posted;
        assert!(invoice.is_posted_customer_invoice());

        let mut entry = Move::new(MoveType::Entry, Uuid::new_v4(), date(), "EUR");
        entry.state = MoveState::Posted;
        assert!(!entry.is_posted_customer_invoice());
    }
}
