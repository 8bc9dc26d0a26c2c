use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AccountId = Uuid;
pub type PartnerId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Money owed by customers
    AssetReceivable,
    /// Money owed to suppliers
    LiabilityPayable,
    /// Bank and cash accounts
    AssetCash,
    Income,
    Expense,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::AssetReceivable => "asset_receivable",
            AccountType::LiabilityPayable => "liability_payable",
            AccountType::AssetCash => "asset_cash",
            AccountType::Income => "income",
            AccountType::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asset_receivable" | "receivable" => Some(AccountType::AssetReceivable),
            "liability_payable" | "payable" => Some(AccountType::LiabilityPayable),
            "asset_cash" | "cash" | "bank" => Some(AccountType::AssetCash),
            "income" => Some(AccountType::Income),
            "expense" => Some(AccountType::Expense),
            _ => None,
        }
    }

    pub fn is_receivable(&self) -> bool {
        matches!(self, AccountType::AssetReceivable)
    }

    /// Only receivable and payable balances are settled line against line.
    pub fn is_reconcilable(&self) -> bool {
        matches!(self, AccountType::AssetReceivable | AccountType::LiabilityPayable)
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            account_type,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.code, self.name)
    }
}

/// A counter-party: the customer being invoiced and refunded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
}

impl Partner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}
