use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, PaymentType};

pub type JournalId = Uuid;
pub type PaymentMethodId = Uuid;
pub type PaymentMethodLineId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalType {
    /// Customer invoices and credit notes
    Sale,
    Bank,
    Cash,
}

impl JournalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalType::Sale => "sale",
            JournalType::Bank => "bank",
            JournalType::Cash => "cash",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sale" | "sales" => Some(JournalType::Sale),
            "bank" => Some(JournalType::Bank),
            "cash" => Some(JournalType::Cash),
            _ => None,
        }
    }

    /// Journals that payments can be registered on.
    pub fn accepts_payments(&self) -> bool {
        matches!(self, JournalType::Bank | JournalType::Cash)
    }
}

impl std::fmt::Display for JournalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub code: String,
    pub name: String,
    pub journal_type: JournalType,
    /// Income account for sale journals, liquidity account for bank/cash journals
    pub default_account_id: AccountId,
}

impl Journal {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        journal_type: JournalType,
        default_account_id: AccountId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            journal_type,
            default_account_id,
        }
    }
}

/// A way of moving money (manual, check, SEPA transfer, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    /// Technical code; may be empty for user-defined methods
    pub code: String,
    pub name: String,
}

impl PaymentMethod {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
        }
    }

    /// Two methods are equivalent when their codes match, or, for methods
    /// without a code, when their names match.
    pub fn is_equivalent(&self, other: &PaymentMethod) -> bool {
        if self.code.is_empty() {
            self.name == other.name
        } else {
            self.code == other.code
        }
    }
}

/// A payment method enabled on one journal for one direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodLine {
    pub id: PaymentMethodLineId,
    pub journal_id: JournalId,
    pub payment_method_id: PaymentMethodId,
    pub payment_type: PaymentType,
    pub name: String,
    pub sequence: i64,
}

impl PaymentMethodLine {
    pub fn new(
        journal_id: JournalId,
        payment_method_id: PaymentMethodId,
        payment_type: PaymentType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            journal_id,
            payment_method_id,
            payment_type,
            name: name.into(),
            sequence: 10,
        }
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }
}
