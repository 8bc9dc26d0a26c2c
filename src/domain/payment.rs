use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Account, Cents, JournalId, MoveId, MoveLine, PartnerId, PaymentMethodLineId};

pub type PaymentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Money received from the partner
    Inbound,
    /// Money paid to the partner
    Outbound,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Inbound => "inbound",
            PaymentType::Outbound => "outbound",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inbound" | "in" => Some(PaymentType::Inbound),
            "outbound" | "out" => Some(PaymentType::Outbound),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerType {
    Customer,
    Supplier,
}

impl PartnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerType::Customer => "customer",
            PartnerType::Supplier => "supplier",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(PartnerType::Customer),
            "supplier" => Some(PartnerType::Supplier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Draft,
    Posted,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Draft => "draft",
            PaymentState::Posted => "posted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PaymentState::Draft),
            "posted" => Some(PaymentState::Posted),
            _ => None,
        }
    }
}

/// A directional movement of money with a partner, backed by a journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// Assigned by the repository
    pub name: String,
    pub payment_type: PaymentType,
    pub partner_type: PartnerType,
    pub partner_id: PartnerId,
    pub journal_id: JournalId,
    pub payment_method_line_id: Option<PaymentMethodLineId>,
    pub date: NaiveDate,
    /// Always positive; the direction is carried by `payment_type`
    pub amount: Cents,
    pub currency: String,
    pub reference: Option<String>,
    pub state: PaymentState,
    /// Journal entry created when the payment is stored
    pub move_id: Option<MoveId>,
    /// If this payment refunds another one, points to the original payment
    pub reverses: Option<PaymentId>,
    /// Invoice whose credit note triggered this refund
    pub source_invoice_id: Option<MoveId>,
}

impl Payment {
    pub fn new(
        payment_type: PaymentType,
        partner_type: PartnerType,
        partner_id: PartnerId,
        journal_id: JournalId,
        amount: Cents,
        date: NaiveDate,
        currency: impl Into<String>,
    ) -> Self {
        assert!(amount > 0, "Payment amount must be positive");
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            payment_type,
            partner_type,
            partner_id,
            journal_id,
            payment_method_line_id: None,
            date,
            amount,
            currency: currency.into(),
            reference: None,
            state: PaymentState::Draft,
            move_id: None,
            reverses: None,
            source_invoice_id: None,
        }
    }

    pub fn with_method_line(mut self, method_line_id: PaymentMethodLineId) -> Self {
        self.payment_method_line_id = Some(method_line_id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Customer payments received are the only ones the wizard unwinds.
    pub fn is_customer_inbound(&self) -> bool {
        self.partner_type == PartnerType::Customer && self.payment_type == PaymentType::Inbound
    }

    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }

    /// Create the outbound payment giving back `amount` of this inbound payment.
    /// Partner, journal and currency are inherited; the method line must be an
    /// outbound line on the same journal.
    pub fn create_refund(
        &self,
        amount: Cents,
        method_line_id: PaymentMethodLineId,
        date: NaiveDate,
        source_invoice_id: MoveId,
    ) -> Self {
        assert!(
            amount > 0 && amount <= self.amount,
            "Refund amount must be between 0 and the original amount"
        );
        let mut refund = Payment::new(
            PaymentType::Outbound,
            self.partner_type,
            self.partner_id,
            self.journal_id,
            amount,
            date,
            self.currency.clone(),
        )
        .with_method_line(method_line_id);
        refund.reverses = Some(self.id);
        refund.source_invoice_id = Some(source_invoice_id);
        refund
    }

    /// Lines of the journal entry backing this payment. Money received debits
    /// the liquidity account and credits the partner's counterpart account;
    /// money paid does the opposite.
    pub fn entry_lines(
        &self,
        move_id: MoveId,
        counterpart: &Account,
        liquidity: &Account,
    ) -> Vec<MoveLine> {
        let label = self
            .reference
            .clone()
            .unwrap_or_else(|| self.name.clone());
        let (liquidity_line, counterpart_line) = match self.payment_type {
            PaymentType::Inbound => (
                MoveLine::debit(
                    move_id,
                    liquidity.id,
                    liquidity.account_type,
                    label.clone(),
                    self.amount,
                ),
                MoveLine::credit(
                    move_id,
                    counterpart.id,
                    counterpart.account_type,
                    label,
                    self.amount,
                ),
            ),
            PaymentType::Outbound => (
                MoveLine::credit(
                    move_id,
                    liquidity.id,
                    liquidity.account_type,
                    label.clone(),
                    self.amount,
                ),
                MoveLine::debit(
                    move_id,
                    counterpart.id,
                    counterpart.account_type,
                    label,
                    self.amount,
                ),
            ),
        };
        vec![
            liquidity_line.with_partner(Some(self.partner_id)),
            counterpart_line.with_partner(Some(self.partner_id)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountType;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn inbound(amount: Cents) -> Payment {
        Payment::new(
            PaymentType::Inbound,
            PartnerType::Customer,
            Uuid::new_v4(),
            Uuid::new_v4(),
            amount,
            date(),
            "EUR",
        )
    }

    #[test]
    fn test_customer_inbound_filter() {
        assert!(inbound(1000).is_customer_inbound());

        let mut supplier = inbound(1000);
        supplier.partner_type = PartnerType::Supplier;
        assert!(!supplier.is_customer_inbound());

        let mut outbound = inbound(1000);
        outbound.payment_type = PaymentType::Outbound;
        assert!(!outbound.is_customer_inbound());
    }

    #[test]
    fn test_create_refund() {
        let original = inbound(70000);
        let invoice = Uuid::new_v4();
        let method_line = Uuid::new_v4();

        let refund = original.create_refund(70000, method_line, date(), invoice);

        assert_eq!(refund.payment_type, PaymentType::Outbound);
        assert_eq!(refund.partner_type, PartnerType::Customer);
        assert_eq!(refund.partner_id, original.partner_id);
        assert_eq!(refund.journal_id, original.journal_id);
        assert_eq!(refund.currency, "EUR");
        assert_eq!(refund.payment_method_line_id, Some(method_line));
        assert_eq!(refund.reverses, Some(original.id));
        assert_eq!(refund.source_invoice_id, Some(invoice));
        assert!(refund.is_reversal());
    }

    #[test]
    fn test_entry_lines_follow_direction() {
        let receivable = Account::new("1200", "Receivable", AccountType::AssetReceivable);
        let bank = Account::new("1010", "Bank", AccountType::AssetCash);
        let original = inbound(70000);
        let move_id = Uuid::new_v4();

        let lines = original.entry_lines(move_id, &receivable, &bank);
        assert_eq!(lines[0].account_id, bank.id);
        assert_eq!(lines[0].debit, 70000);
        assert_eq!(lines[1].account_id, receivable.id);
        assert_eq!(lines[1].credit, 70000);
        assert_eq!(lines[1].residual, -70000);

        let refund = original.create_refund(70000, Uuid::new_v4(), date(), Uuid::new_v4());
        let lines = refund.entry_lines(move_id, &receivable, &bank);
        assert_eq!(lines[0].credit, 70000);
        assert_eq!(lines[1].account_id, receivable.id);
        assert_eq!(lines[1].debit, 70000);
    }

    #[test]
    fn test_partial_refund() {
        let original = inbound(100000);
        let refund = original.create_refund(40000, Uuid::new_v4(), date(), Uuid::new_v4());
        assert_eq!(refund.amount, 40000);
    }

    #[test]
    #[should_panic(expected = "Refund amount must be between 0 and the original amount")]
    fn test_refund_cannot_exceed_original() {
        let original = inbound(30000);
        original.create_refund(30001, Uuid::new_v4(), date(), Uuid::new_v4());
    }
}
